use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::journal::JournalRecord;

/// Well-known top-level keys of the persisted document.
pub const RATES_SECTION: &str = "rates";
pub const SYNC_SECTION: &str = "ynab_synced_transactions";

/// Proof that a transaction was accepted by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRecord {
    pub import_id: String,
    pub synced_at: DateTime<Utc>,
}

impl SyncRecord {
    pub fn new(import_id: &str, synced_at: DateTime<Utc>) -> Self {
        SyncRecord {
            import_id: import_id.to_string(),
            synced_at,
        }
    }
}

impl JournalRecord for SyncRecord {
    const SECTION: &'static str = SYNC_SECTION;

    fn key(&self) -> String {
        self.import_id.clone()
    }
}

/// Cached exchange rate: home-currency units per one unit of `currency`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateRecord {
    pub date: NaiveDate,
    pub currency: String,
    pub value: f64,
}

impl RateRecord {
    pub fn new(date: NaiveDate, currency: &str, value: f64) -> Self {
        RateRecord {
            date,
            currency: currency.to_string(),
            value,
        }
    }

    pub fn key_for(date: NaiveDate, currency: &str) -> String {
        format!("{}:{currency}", date.format("%Y-%m-%d"))
    }
}

impl JournalRecord for RateRecord {
    const SECTION: &'static str = RATES_SECTION;

    fn key(&self) -> String {
        Self::key_for(self.date, &self.currency)
    }
}
