pub mod accounts;
pub mod client;
pub mod http;
pub mod import_id;
pub mod mapper;
pub mod syncer;

pub use accounts::{unique_last4s, AccountResolver, ResolveError};
pub use client::{
    Account, Budget, CreatedTransactions, LedgerClient, LedgerError, MockLedgerClient,
    NewAccount, TransactionPayload,
};
pub use http::{HttpLedgerClient, HttpLedgerConfig, DEFAULT_BASE_URL};
pub use import_id::{import_id, IMPORT_ID_PREFIX};
pub use mapper::{build_memo, is_debit, Mapper};
pub use syncer::{SyncAborted, SyncError, SyncResult, Synchronizer, BATCH_SIZE};
