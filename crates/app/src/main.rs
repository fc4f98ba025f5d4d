use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use smsledger_storage::JournalStore;
use smsledger_sync::{HttpLedgerClient, HttpLedgerConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod pool;
mod rates;
mod source;

use commands::AppState;
use config::{Config, DEFAULT_CONFIG_PATH};
use rates::{BnmRateFetcher, CachedRateProvider};
use source::{ExportFileSource, MessageSource};

const API_KEY_VAR: &str = "YNAB_API_KEY";

#[derive(Parser)]
#[command(name = "smsledger", version, about = "Push bank SMS notifications into a budgeting ledger")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Overrides `data_file_path` from the configuration
    #[arg(long)]
    data_file: Option<PathBuf>,

    /// Debug-level logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    /// Parse, convert and push new transactions (default)
    Sync,
    /// List messages that no template recognises
    MissingTemplates,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = Config::load(&cli.config)?;
    if let Some(path) = cli.data_file {
        config.data_file_path = path;
    }

    let source = ExportFileSource::new(&config.messages_path, config.senders.clone());
    source.check_available().await?;

    let mut state = AppState::new(config, cli.config)?;

    match cli.command.unwrap_or(Command::Sync) {
        Command::Sync => run_sync(&mut state, &source).await,
        Command::MissingTemplates => commands::missing_templates(&state, &source).await,
    }
}

async fn run_sync(state: &mut AppState, source: &ExportFileSource) -> Result<()> {
    let api_key = std::env::var(API_KEY_VAR)
        .with_context(|| format!("{API_KEY_VAR} environment variable is not set"))?;

    let ledger = &state.config.ledger;
    let client = HttpLedgerClient::new(
        &api_key,
        HttpLedgerConfig {
            base_url: ledger.base_url.clone(),
            timeout: ledger.timeout(),
            max_attempts: ledger.max_attempts,
            ..HttpLedgerConfig::default()
        },
    )?;

    let journal = Arc::new(JournalStore::open(state.config.data_file_path.clone()).await?);
    info!(path = %journal.path().display(), "journal ready");
    let fetcher = BnmRateFetcher::new(&state.config.rates.base_url, state.config.rates.timeout())?;
    let rates = CachedRateProvider::new(
        Arc::clone(&journal),
        fetcher,
        &state.config.default_currency,
    );

    let report = commands::sync(state, source, &client, &rates, &journal).await?;
    commands::print_sync_report(&report);
    Ok(())
}
