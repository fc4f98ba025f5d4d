use chrono::{DateTime, Utc};
use smsledger_core::{RawMessage, Transaction};
use smsledger_storage::{JournalError, JournalStore, SyncRecord};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::client::{LedgerClient, LedgerError, TransactionPayload};
use crate::import_id::import_id;
use crate::mapper::Mapper;

/// Ledger API limit on transactions per request.
pub const BATCH_SIZE: usize = 100;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("messages and transactions length mismatch: {messages} vs {transactions}")]
    LengthMismatch { messages: usize, transactions: usize },
    #[error("sync journal unavailable: {0}")]
    Journal(#[from] JournalError),
    #[error("failed to push batch {batch}: {source}")]
    Ledger {
        batch: usize,
        #[source]
        source: LedgerError,
    },
}

/// Per-run accounting. Every input pair lands in exactly one of `synced` or
/// `skipped`; unmappable pairs are also itemised in `failed`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncResult {
    pub total: usize,
    pub synced: usize,
    pub skipped: usize,
    pub failed: Vec<String>,
}

/// A run that stopped early, with what it achieved before stopping.
#[derive(Debug, Error)]
#[error("sync aborted after {} synced transactions", .partial.synced)]
pub struct SyncAborted {
    pub partial: SyncResult,
    #[source]
    pub error: SyncError,
}

/// Orchestrates: date filter → dedup → map → batch push → journal.
pub struct Synchronizer<'a, C: LedgerClient + ?Sized> {
    journal: &'a JournalStore,
    client: &'a C,
    mapper: Mapper,
    budget_id: String,
    start: DateTime<Utc>,
}

impl<'a, C: LedgerClient + ?Sized> Synchronizer<'a, C> {
    pub fn new(
        journal: &'a JournalStore,
        client: &'a C,
        mapper: Mapper,
        budget_id: &str,
        start: DateTime<Utc>,
    ) -> Self {
        Self {
            journal,
            client,
            mapper,
            budget_id: budget_id.to_string(),
            start,
        }
    }

    /// Pushes every not-yet-journaled pair to the ledger, in input order.
    ///
    /// Batches already accepted stay journaled when a later batch fails; the
    /// error then carries the partial result.
    pub async fn sync(
        &self,
        messages: &[RawMessage],
        transactions: &[Transaction],
    ) -> Result<SyncResult, SyncAborted> {
        let mut result = SyncResult {
            total: transactions.len(),
            ..SyncResult::default()
        };

        if messages.len() != transactions.len() {
            return Err(SyncAborted {
                partial: result,
                error: SyncError::LengthMismatch {
                    messages: messages.len(),
                    transactions: transactions.len(),
                },
            });
        }

        let mut pending: Vec<TransactionPayload> = Vec::new();
        for (message, tx) in messages.iter().zip(transactions) {
            if message.timestamp < self.start {
                result.skipped += 1;
                continue;
            }

            let id = import_id(message, tx);
            match self.journal.contains::<SyncRecord>(&id).await {
                Ok(true) => {
                    debug!(import_id = %id, "already synced");
                    result.skipped += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    return Err(SyncAborted {
                        partial: result,
                        error: e.into(),
                    })
                }
            }

            match self.mapper.map(message, tx) {
                Ok(payload) => pending.push(payload),
                Err(e) => {
                    warn!(import_id = %id, error = %e, "transaction not mappable");
                    result.skipped += 1;
                    result.failed.push(format!("Failed to map: {e}"));
                }
            }
        }

        for (batch, chunk) in pending.chunks(BATCH_SIZE).enumerate() {
            if let Err(source) = self.client.create_transactions(&self.budget_id, chunk).await {
                return Err(SyncAborted {
                    partial: result,
                    error: SyncError::Ledger { batch, source },
                });
            }

            let now = Utc::now();
            let records: Vec<SyncRecord> = chunk
                .iter()
                .map(|p| SyncRecord::new(&p.import_id, now))
                .collect();
            if let Err(e) = self.journal.upsert_many(records).await {
                return Err(SyncAborted {
                    partial: result,
                    error: e.into(),
                });
            }

            result.synced += chunk.len();
            info!(batch, size = chunk.len(), "pushed batch to ledger");
        }

        Ok(result)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
