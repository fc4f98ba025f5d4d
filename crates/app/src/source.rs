//! Message sources. The bundled one reads a plain-text conversation export
//! where every message starts with a `[YYYY-MM-DD HH:MM:SS] Sender: ` header.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use regex::Regex;
use smsledger_core::RawMessage;
use std::path::PathBuf;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("message export not accessible at {path}: {source}")]
    Unavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read message export {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Fails fast when the source cannot be reached.
    async fn check_available(&self) -> Result<(), SourceError>;

    async fn fetch_messages(&self) -> Result<Vec<RawMessage>, SourceError>;
}

fn header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\[(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2})\] ([^:]+): ?(.*)$").expect("invalid regex")
    })
}

/// Splits an export into messages. Lines that are not headers continue the
/// previous message; anything before the first header is dropped. An empty
/// `senders` list keeps every sender.
pub fn parse_export(text: &str, senders: &[String]) -> Vec<RawMessage> {
    let mut messages = Vec::new();
    let mut current: Option<RawMessage> = None;

    for line in text.lines() {
        let header = header_re().captures(line).and_then(|caps| {
            let ts = NaiveDateTime::parse_from_str(&caps[1], "%Y-%m-%d %H:%M:%S").ok()?;
            Some(RawMessage::new(ts.and_utc(), caps[2].trim(), &caps[3]))
        });

        if let Some(next) = header {
            messages.extend(current.replace(next));
        } else if let Some(msg) = current.as_mut() {
            msg.content.push('\n');
            msg.content.push_str(line);
        } else {
            debug!(line, "dropping line before first message");
        }
    }
    messages.extend(current);

    if senders.is_empty() {
        return messages;
    }
    messages
        .into_iter()
        .filter(|m| senders.iter().any(|s| s == &m.sender))
        .collect()
}

pub struct ExportFileSource {
    path: PathBuf,
    senders: Vec<String>,
}

impl ExportFileSource {
    pub fn new(path: impl Into<PathBuf>, senders: Vec<String>) -> Self {
        Self {
            path: path.into(),
            senders,
        }
    }
}

#[async_trait]
impl MessageSource for ExportFileSource {
    async fn check_available(&self) -> Result<(), SourceError> {
        tokio::fs::metadata(&self.path)
            .await
            .map(|_| ())
            .map_err(|source| SourceError::Unavailable {
                path: self.path.clone(),
                source,
            })
    }

    async fn fetch_messages(&self) -> Result<Vec<RawMessage>, SourceError> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| SourceError::Read {
                path: self.path.clone(),
                source,
            })?;
        let messages = parse_export(&text, &self.senders);
        info!(count = messages.len(), path = %self.path.display(), "loaded messages");
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    const EXPORT: &str = "\
exported by phone
[2024-04-08 09:27:01] EXIMBANK: Debitare cont Card 9..7890, Data 08.04.2024 09:27:01, Suma 9.65 MDL, Detalii SHOP, Disponibil 38400.60 MDL
[2024-04-08 10:00:00] 102: Op: Tovary i uslugi
Karta: *1234
Summa: 34 MDL
[2024-04-08 11:00:00] Me: thanks
";

    #[test]
    fn splits_headers_and_continuations() {
        let msgs = parse_export(EXPORT, &[]);
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[0].sender, "EXIMBANK");
        assert_eq!(
            msgs[0].timestamp,
            Utc.with_ymd_and_hms(2024, 4, 8, 9, 27, 1).unwrap()
        );
        assert_eq!(msgs[1].sender, "102");
        assert_eq!(msgs[1].content, "Op: Tovary i uslugi\nKarta: *1234\nSumma: 34 MDL");
        assert_eq!(msgs[2].content, "thanks");
    }

    #[test]
    fn filters_by_sender() {
        let msgs = parse_export(EXPORT, &["102".to_string()]);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].sender, "102");
    }

    #[test]
    fn text_without_headers_yields_nothing() {
        assert!(parse_export("just text\nmore", &[]).is_empty());
        assert!(parse_export("", &[]).is_empty());
    }

    #[tokio::test]
    async fn file_source_reads_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.txt");
        std::fs::write(&path, EXPORT).unwrap();

        let source = ExportFileSource::new(&path, vec!["EXIMBANK".into()]);
        source.check_available().await.unwrap();
        let msgs = source.fetch_messages().await.unwrap();
        assert_eq!(msgs.len(), 1);
    }

    #[tokio::test]
    async fn missing_file_fails_preflight() {
        let dir = tempfile::tempdir().unwrap();
        let source = ExportFileSource::new(dir.path().join("none.txt"), vec![]);
        assert!(matches!(
            source.check_available().await,
            Err(SourceError::Unavailable { .. })
        ));
    }
}
