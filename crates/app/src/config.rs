use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use smsledger_core::AccountMapping;
use smsledger_import::{IgnoreClassifier, Matcher, Template};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";
pub const DEFAULT_BNM_URL: &str = "https://www.bnm.md/en/official_exchange_rates";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to encode config: {0}")]
    Encode(#[from] toml::ser::Error),
    #[error("failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("ledger.{0} not configured")]
    Missing(&'static str),
    #[error("invalid template list: {0}")]
    Template(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub senders: Vec<String>,
    #[serde(default = "default_currency")]
    pub default_currency: String,
    #[serde(default = "default_data_file")]
    pub data_file_path: PathBuf,
    #[serde(default = "default_messages_path")]
    pub messages_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    /// Template names in priority order; every registered template when empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub templates: Vec<String>,
    /// Substrings ignored on top of the built-in list.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignore_patterns: Vec<String>,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub rates: RatesConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_id: Option<String>,
    /// Messages older than this day (UTC) are never pushed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default = "default_ledger_url")]
    pub base_url: String,
    #[serde(default = "default_ledger_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub accounts: Vec<AccountMapping>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatesConfig {
    #[serde(default = "default_rates_url")]
    pub base_url: String,
    #[serde(default = "default_rates_timeout")]
    pub timeout_secs: u64,
}

fn default_currency() -> String {
    "MDL".to_string()
}

fn default_data_file() -> PathBuf {
    PathBuf::from("smsledger_data.json")
}

fn default_messages_path() -> PathBuf {
    PathBuf::from("messages.txt")
}

fn default_ledger_url() -> String {
    smsledger_sync::DEFAULT_BASE_URL.to_string()
}

fn default_ledger_timeout() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_rates_url() -> String {
    DEFAULT_BNM_URL.to_string()
}

fn default_rates_timeout() -> u64 {
    10
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            budget_id: None,
            start_date: None,
            base_url: default_ledger_url(),
            timeout_secs: default_ledger_timeout(),
            max_attempts: default_max_attempts(),
            accounts: Vec::new(),
        }
    }
}

impl Default for RatesConfig {
    fn default() -> Self {
        Self {
            base_url: default_rates_url(),
            timeout_secs: default_rates_timeout(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            senders: Vec::new(),
            default_currency: default_currency(),
            data_file_path: default_data_file(),
            messages_path: default_messages_path(),
            workers: None,
            templates: Vec::new(),
            ignore_patterns: Vec::new(),
            ledger: LedgerConfig::default(),
            rates: RatesConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn matcher(&self) -> Result<Matcher, ConfigError> {
        let templates = if self.templates.is_empty() {
            Template::REGISTERED.to_vec()
        } else {
            self.templates
                .iter()
                .map(|name| name.parse::<Template>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(ConfigError::Template)?
        };
        let ignore = IgnoreClassifier::default().extend(self.ignore_patterns.iter().cloned());
        Ok(Matcher::new(templates, ignore))
    }

    /// Pool ceiling; the host's available parallelism when unset.
    pub fn worker_count(&self) -> usize {
        self.workers.filter(|n| *n > 0).unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}

impl LedgerConfig {
    pub fn start(&self) -> Result<DateTime<Utc>, ConfigError> {
        let date = self.start_date.ok_or(ConfigError::Missing("start_date"))?;
        Ok(date.and_time(chrono::NaiveTime::MIN).and_utc())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl RatesConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
