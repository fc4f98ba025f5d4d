use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger rate limit exceeded (429)")]
    RateLimited,
    #[error("ledger server error: {status}")]
    Server { status: u16 },
    #[error("ledger API error {status}: {}", api_message(.name, .detail))]
    Api {
        status: u16,
        name: Option<String>,
        detail: String,
    },
    #[error("unexpected ledger status code: {0}")]
    UnexpectedStatus(u16),
    #[error("ledger request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("failed to decode ledger response: {0}")]
    Decode(#[from] serde_json::Error),
}

fn api_message(name: &Option<String>, detail: &str) -> String {
    match name {
        Some(name) => format!("{name} - {detail}"),
        None => detail.to_string(),
    }
}

impl LedgerError {
    /// Rate-limit and server-class failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::RateLimited | LedgerError::Server { .. })
    }
}

// ── Wire types ────────────────────────────────────────────────────────────────

/// One transaction as submitted to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionPayload {
    pub account_id: String,
    /// `YYYY-MM-DD`
    pub date: String,
    /// Milliunits; negative for outflows.
    pub amount: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub payee_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub memo: String,
    pub cleared: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub import_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CreatedTransaction {
    pub id: String,
    #[serde(default)]
    pub import_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CreatedTransactions {
    #[serde(default)]
    pub transaction_ids: Vec<String>,
    #[serde(default)]
    pub transactions: Vec<CreatedTransaction>,
    #[serde(default)]
    pub duplicate_import_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub account_type: String,
    #[serde(default)]
    pub closed: bool,
    #[serde(default)]
    pub deleted: bool,
}

impl Account {
    pub fn is_open(&self) -> bool {
        !self.closed && !self.deleted
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAccount {
    pub name: String,
    #[serde(rename = "type")]
    pub account_type: String,
    pub balance: i64,
}

impl NewAccount {
    /// Zero-balance checking account named after the card suffix.
    pub fn for_card(last4: &str) -> Self {
        NewAccount {
            name: format!("Card {last4}"),
            account_type: "checking".to_string(),
            balance: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Budget {
    pub id: String,
    pub name: String,
}

/// The ledger operations the sync engine depends on.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn create_transactions(
        &self,
        budget_id: &str,
        transactions: &[TransactionPayload],
    ) -> Result<CreatedTransactions, LedgerError>;

    async fn get_accounts(&self, budget_id: &str) -> Result<Vec<Account>, LedgerError>;

    async fn create_account(
        &self,
        budget_id: &str,
        account: &NewAccount,
    ) -> Result<Account, LedgerError>;

    async fn get_budgets(&self) -> Result<Vec<Budget>, LedgerError>;
}

// ── Mock client (always available, used for tests) ────────────────────────────

#[derive(Debug, Default)]
struct MockState {
    accounts: Vec<Account>,
    budgets: Vec<Budget>,
    batches: Vec<Vec<TransactionPayload>>,
    batch_calls: usize,
    created_accounts: Vec<NewAccount>,
    get_accounts_calls: usize,
    fail_batch: Option<usize>,
    fail_accounts: bool,
    fail_create_account: bool,
}

/// In-memory ledger that records every call; failures are opt-in.
#[derive(Debug, Default)]
pub struct MockLedgerClient {
    state: Mutex<MockState>,
}

fn mock_failure() -> LedgerError {
    LedgerError::Api {
        status: 400,
        name: Some("bad_request".to_string()),
        detail: "mock failure".to_string(),
    }
}

impl MockLedgerClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_accounts(self, accounts: Vec<Account>) -> Self {
        self.update(|s| s.accounts = accounts);
        self
    }

    pub fn with_budgets(self, budgets: Vec<Budget>) -> Self {
        self.update(|s| s.budgets = budgets);
        self
    }

    /// Makes the `n`th `create_transactions` call (zero-based) fail.
    pub fn failing_batch(self, n: usize) -> Self {
        self.update(|s| s.fail_batch = Some(n));
        self
    }

    pub fn failing_accounts(self) -> Self {
        self.update(|s| s.fail_accounts = true);
        self
    }

    pub fn failing_account_creation(self) -> Self {
        self.update(|s| s.fail_create_account = true);
        self
    }

    /// Every accepted batch, in call order.
    pub fn batches(&self) -> Vec<Vec<TransactionPayload>> {
        self.update(|s| s.batches.clone())
    }

    /// Number of `create_transactions` calls, failed ones included.
    pub fn batch_calls(&self) -> usize {
        self.update(|s| s.batch_calls)
    }

    pub fn get_accounts_calls(&self) -> usize {
        self.update(|s| s.get_accounts_calls)
    }

    pub fn created_accounts(&self) -> Vec<NewAccount> {
        self.update(|s| s.created_accounts.clone())
    }

    fn update<T>(&self, f: impl FnOnce(&mut MockState) -> T) -> T {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }
}

#[async_trait]
impl LedgerClient for MockLedgerClient {
    async fn create_transactions(
        &self,
        _budget_id: &str,
        transactions: &[TransactionPayload],
    ) -> Result<CreatedTransactions, LedgerError> {
        self.update(|s| {
            let call = s.batch_calls;
            s.batch_calls += 1;
            if s.fail_batch == Some(call) {
                return Err(mock_failure());
            }
            s.batches.push(transactions.to_vec());
            Ok(CreatedTransactions {
                transaction_ids: transactions
                    .iter()
                    .enumerate()
                    .map(|(i, _)| format!("tx-{call}-{i}"))
                    .collect(),
                ..CreatedTransactions::default()
            })
        })
    }

    async fn get_accounts(&self, _budget_id: &str) -> Result<Vec<Account>, LedgerError> {
        self.update(|s| {
            s.get_accounts_calls += 1;
            if s.fail_accounts {
                return Err(mock_failure());
            }
            Ok(s.accounts.clone())
        })
    }

    async fn create_account(
        &self,
        _budget_id: &str,
        account: &NewAccount,
    ) -> Result<Account, LedgerError> {
        self.update(|s| {
            if s.fail_create_account {
                return Err(mock_failure());
            }
            s.created_accounts.push(account.clone());
            let created = Account {
                id: format!("acc-new-{}", s.created_accounts.len()),
                name: account.name.clone(),
                account_type: account.account_type.clone(),
                closed: false,
                deleted: false,
            };
            s.accounts.push(created.clone());
            Ok(created)
        })
    }

    async fn get_budgets(&self) -> Result<Vec<Budget>, LedgerError> {
        self.update(|s| Ok(s.budgets.clone()))
    }
}
