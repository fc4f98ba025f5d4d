use smsledger_core::{AccountIndex, AccountMapping, MappingError, RawMessage, Transaction};

use crate::client::TransactionPayload;
use crate::import_id::import_id;

/// Operations that are routine enough to leave out of the memo.
const STANDARD_OPERATIONS: &[&str] = &[
    "Tovary i uslugi",
    "Debitare",
    "Suplinire",
    "Tranzactie reusita",
];
/// Statuses that are routine enough to leave out of the memo; empty means absent.
const STANDARD_STATUSES: &[&str] = &["Odobrena", ""];
/// Substrings marking an outflow.
const DEBIT_OPERATIONS: &[&str] = &["Debitare", "Tovary i uslugi", "Tranzactie reusita"];

const MEMO_SEPARATOR: &str = " - ";
const UNKNOWN_PAYEE: &str = "Unknown";

pub fn is_debit(operation: &str) -> bool {
    DEBIT_OPERATIONS.iter().any(|op| operation.contains(op))
}

/// Non-standard operation and status joined by ` - `; empty when both are standard.
pub fn build_memo(tx: &Transaction) -> String {
    let operation = tx.operation();
    let status = tx.status();

    let mut parts = Vec::new();
    if !STANDARD_OPERATIONS.iter().any(|op| *op == operation) {
        parts.push(operation);
    }
    if !STANDARD_STATUSES.iter().any(|st| *st == status) {
        parts.push(status);
    }
    parts.join(MEMO_SEPARATOR)
}

/// Turns parsed transactions into ledger payloads using a fixed account table.
#[derive(Debug, Clone, Default)]
pub struct Mapper {
    accounts: AccountIndex,
}

impl Mapper {
    pub fn new(accounts: &[AccountMapping]) -> Self {
        Mapper {
            accounts: AccountIndex::new(accounts),
        }
    }

    pub fn account_for(&self, tx: &Transaction) -> Result<String, MappingError> {
        self.accounts.resolve(tx.card.as_deref()).map(str::to_string)
    }

    pub fn map(
        &self,
        message: &RawMessage,
        tx: &Transaction,
    ) -> Result<TransactionPayload, MappingError> {
        let account_id = self.account_for(tx)?;

        let mut amount = tx.effective_amount().to_milliunits();
        if is_debit(tx.operation()) {
            amount = -amount;
        }

        let payee_name = match tx.address() {
            "" => UNKNOWN_PAYEE.to_string(),
            address => address.to_string(),
        };

        Ok(TransactionPayload {
            account_id,
            date: message.timestamp.format("%Y-%m-%d").to_string(),
            amount,
            payee_name,
            memo: build_memo(tx),
            cleared: "cleared".to_string(),
            import_id: import_id(message, tx),
        })
    }
}
