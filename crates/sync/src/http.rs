//! HTTP implementation of [`LedgerClient`] against the YNAB v1 REST API.
//!
//! Rate-limit (429) and server-class (5xx) responses are retried with
//! exponential backoff up to a bounded number of attempts. Client errors and
//! transport failures (including the per-request timeout) are returned at once.

use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff, ExponentialBackoffBuilder};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

use crate::client::{
    Account, Budget, CreatedTransactions, LedgerClient, LedgerError, NewAccount,
    TransactionPayload,
};

pub const DEFAULT_BASE_URL: &str = "https://api.youneedabudget.com/v1";

#[derive(Debug, Clone)]
pub struct HttpLedgerConfig {
    pub base_url: String,
    pub timeout: Duration,
    /// Total attempts per request, the first one included.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for HttpLedgerConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
        }
    }
}

/// Bearer token whose bytes are zeroed when dropped.
struct ApiToken(Vec<u8>);

impl ApiToken {
    fn new(token: &str) -> Self {
        ApiToken(token.as_bytes().to_vec())
    }

    fn expose(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }
}

impl Drop for ApiToken {
    fn drop(&mut self) {
        self.0.iter_mut().for_each(|b| *b = 0);
        std::sync::atomic::compiler_fence(std::sync::atomic::Ordering::SeqCst);
    }
}

impl fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiToken(***)")
    }
}

#[derive(Debug)]
pub struct HttpLedgerClient {
    http: reqwest::Client,
    token: ApiToken,
    config: HttpLedgerConfig,
}

// ── Response envelopes ────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct AccountsData {
    accounts: Vec<Account>,
}

#[derive(Deserialize)]
struct AccountData {
    account: Account,
}

#[derive(Deserialize)]
struct BudgetsData {
    budgets: Vec<Budget>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    name: String,
    #[serde(default)]
    detail: String,
}

/// Maps a finished response to its body or to the matching error class.
fn classify(status: u16, body: String) -> Result<String, LedgerError> {
    match status {
        200 | 201 => Ok(body),
        429 => Err(LedgerError::RateLimited),
        s if s >= 500 => Err(LedgerError::Server { status: s }),
        s if s >= 400 => Err(match serde_json::from_str::<ErrorBody>(&body) {
            Ok(parsed) => LedgerError::Api {
                status: s,
                name: Some(parsed.error.name),
                detail: parsed.error.detail,
            },
            Err(_) => LedgerError::Api {
                status: s,
                name: None,
                detail: body,
            },
        }),
        s => Err(LedgerError::UnexpectedStatus(s)),
    }
}

impl HttpLedgerClient {
    pub fn new(api_key: &str, config: HttpLedgerConfig) -> Result<Self, LedgerError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            token: ApiToken::new(api_key),
            config,
        })
    }

    fn backoff_policy(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.config.initial_backoff)
            .with_max_interval(self.config.max_backoff)
            .with_max_elapsed_time(None)
            .build()
    }

    async fn execute(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<String, LedgerError> {
        let mut request = self
            .http
            .request(method, url)
            .bearer_auth(self.token.expose());
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        classify(status, text)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T, LedgerError> {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0u32;

        let text = retry(self.backoff_policy(), || {
            attempt += 1;
            let current = attempt;
            let method = method.clone();
            let url = url.as_str();
            let body = body.as_ref();
            async move {
                match self.execute(method, url, body).await {
                    Ok(text) => Ok(text),
                    Err(e) if e.is_retryable() && current < max_attempts => {
                        warn!(attempt = current, max_attempts, error = %e, "retrying ledger request");
                        Err(backoff::Error::transient(e))
                    }
                    Err(e) => Err(backoff::Error::permanent(e)),
                }
            }
        })
        .await?;

        debug!(path, bytes = text.len(), "ledger response");
        Ok(serde_json::from_str::<Envelope<T>>(&text)?.data)
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn create_transactions(
        &self,
        budget_id: &str,
        transactions: &[TransactionPayload],
    ) -> Result<CreatedTransactions, LedgerError> {
        let body = json!({ "transactions": transactions });
        self.send(
            Method::POST,
            &format!("/budgets/{budget_id}/transactions"),
            Some(body),
        )
        .await
    }

    async fn get_accounts(&self, budget_id: &str) -> Result<Vec<Account>, LedgerError> {
        let data: AccountsData = self
            .send(Method::GET, &format!("/budgets/{budget_id}/accounts"), None)
            .await?;
        Ok(data.accounts)
    }

    async fn create_account(
        &self,
        budget_id: &str,
        account: &NewAccount,
    ) -> Result<Account, LedgerError> {
        let body = json!({ "account": account });
        let data: AccountData = self
            .send(
                Method::POST,
                &format!("/budgets/{budget_id}/accounts"),
                Some(body),
            )
            .await?;
        Ok(data.account)
    }

    async fn get_budgets(&self) -> Result<Vec<Budget>, LedgerError> {
        let data: BudgetsData = self.send(Method::GET, "/budgets", None).await?;
        Ok(data.budgets)
    }
}
