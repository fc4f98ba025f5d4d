pub mod journal;
pub mod records;

pub use journal::{JournalError, JournalRecord, JournalStore};
pub use records::{RateRecord, SyncRecord, RATES_SECTION, SYNC_SECTION};
