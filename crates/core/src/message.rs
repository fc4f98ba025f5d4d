use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::transaction::Transaction;

/// One notification as harvested from the messaging store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMessage {
    pub timestamp: DateTime<Utc>,
    pub sender: String,
    pub content: String,
}

impl RawMessage {
    pub fn new(timestamp: DateTime<Utc>, sender: &str, content: &str) -> Self {
        RawMessage {
            timestamp,
            sender: sender.to_string(),
            content: content.to_string(),
        }
    }

    /// Calendar day of the timestamp in UTC; used for rate lookups and the
    /// ledger payload date.
    pub fn utc_day(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

impl fmt::Display for RawMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.sender,
            self.content
        )
    }
}

/// Exactly one per `RawMessage`, produced by the parallel parse phase.
#[derive(Debug, Clone)]
pub struct ParsedMessage {
    pub message: RawMessage,
    pub transaction: Option<Transaction>,
    pub has_template: bool,
    pub ignored: bool,
}

impl ParsedMessage {
    /// Whether this message should flow on to currency conversion and sync.
    pub fn is_syncable(&self) -> bool {
        self.has_template && !self.ignored && self.transaction.is_some()
    }
}
