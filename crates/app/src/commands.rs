use anyhow::{bail, Context, Result};
use smsledger_core::{ParsedMessage, RawMessage, Transaction};
use smsledger_import::{Classification, Matcher};
use smsledger_storage::JournalStore;
use smsledger_sync::{AccountResolver, LedgerClient, Mapper, SyncResult, Synchronizer};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{Config, ConfigError};
use crate::pool::WorkerPool;
use crate::rates::{convert_transactions, RateProvider};
use crate::source::MessageSource;

/// Sender name of the user's own replies in an export.
const OWN_SENDER: &str = "Me";

pub struct AppState {
    pub config: Config,
    pub config_path: PathBuf,
    pub matcher: Arc<Matcher>,
    pub pool: WorkerPool,
}

impl AppState {
    pub fn new(config: Config, config_path: PathBuf) -> Result<Self, ConfigError> {
        let matcher = config.matcher()?;
        let pool = WorkerPool::new(config.worker_count());
        debug!(
            workers = pool.size(),
            templates = matcher.templates().len(),
            "pipeline ready"
        );
        Ok(Self {
            config,
            config_path,
            matcher: Arc::new(matcher),
            pool,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Set when the budget id was looked up and saved during this run.
    pub resolved_budget: Option<String>,
    pub candidates: usize,
    pub currency: String,
    pub new_accounts: usize,
    pub result: SyncResult,
}

// ── Pipeline steps ────────────────────────────────────────────────────────────

/// Parses every message on the pool; output is index-aligned with `messages`.
/// A template match whose fields fail to parse counts as no template. A unit
/// that panicked is kept as an unparsed message.
pub async fn parse_messages(
    pool: &WorkerPool,
    matcher: Arc<Matcher>,
    messages: Arc<Vec<RawMessage>>,
) -> Vec<ParsedMessage> {
    let shared = Arc::clone(&messages);
    let results = pool
        .map(messages.len(), move |i| {
            let message = shared[i].clone();
            let outcome = matcher.parse(&message.content);
            let ignored = matcher.should_ignore(&message.content);
            ParsedMessage {
                has_template: outcome.is_parsed(),
                transaction: outcome.into_transaction(),
                ignored,
                message,
            }
        })
        .await;

    results
        .into_iter()
        .zip(messages.iter())
        .map(|(result, message)| {
            result.unwrap_or_else(|_| ParsedMessage {
                message: message.clone(),
                transaction: None,
                has_template: false,
                ignored: false,
            })
        })
        .collect()
}

/// Keeps syncable, non-declined transactions already expressed in the home
/// currency, as aligned message and transaction lists.
pub fn select_for_sync(
    parsed: Vec<ParsedMessage>,
    home_currency: &str,
) -> (Vec<RawMessage>, Vec<Transaction>) {
    parsed
        .into_iter()
        .filter(ParsedMessage::is_syncable)
        .filter_map(|pm| {
            let tx = pm.transaction?;
            (!tx.is_declined() && tx.is_converted_to(home_currency)).then_some((pm.message, tx))
        })
        .unzip()
}

/// Messages neither matched by a template nor deliberately ignored.
pub async fn find_missing_templates(
    pool: &WorkerPool,
    matcher: Arc<Matcher>,
    messages: Arc<Vec<RawMessage>>,
) -> Vec<RawMessage> {
    let shared = Arc::clone(&messages);
    let classes = pool
        .map(messages.len(), move |i| matcher.classify(&shared[i].content))
        .await;

    messages
        .iter()
        .zip(classes)
        .filter(|(msg, _)| msg.sender != OWN_SENDER)
        .filter(|(_, class)| {
            class
                .as_ref()
                .map_or(true, |c: &Classification| c.is_missing_template())
        })
        .map(|(msg, _)| msg.clone())
        .collect()
}

// ── Commands ──────────────────────────────────────────────────────────────────

async fn ensure_budget(state: &mut AppState, client: &dyn LedgerClient) -> Result<Option<String>> {
    if state.config.ledger.budget_id.is_some() {
        return Ok(None);
    }

    let budgets = client.get_budgets().await.context("failed to fetch budget ID")?;
    let Some(first) = budgets.into_iter().next() else {
        bail!("no budgets found in ledger account");
    };

    info!(budget = %first.name, id = %first.id, "using first budget");
    state.config.ledger.budget_id = Some(first.id.clone());
    state
        .config
        .save(&state.config_path)
        .context("failed to save config")?;
    Ok(Some(first.id))
}

pub async fn sync(
    state: &mut AppState,
    source: &dyn MessageSource,
    client: &dyn LedgerClient,
    rates: &dyn RateProvider,
    journal: &JournalStore,
) -> Result<SyncReport> {
    let resolved_budget = ensure_budget(state, client).await?;
    let budget_id = state
        .config
        .ledger
        .budget_id
        .clone()
        .context("ledger.budget_id not configured")?;
    let start = state.config.ledger.start()?;
    let home = state.config.default_currency.clone();

    let messages = Arc::new(source.fetch_messages().await?);
    let mut parsed = parse_messages(&state.pool, state.matcher.clone(), messages).await;
    convert_transactions(rates, &mut parsed, &home).await;

    let (messages, transactions) = select_for_sync(parsed, &home);
    info!(count = transactions.len(), currency = %home, "transactions to sync");

    let existing = state.config.ledger.accounts.clone();
    let accounts = AccountResolver::new(client, &budget_id)
        .ensure_accounts(&existing, &transactions)
        .await
        .context("failed to ensure accounts")?;

    let new_accounts = accounts.len() - existing.len();
    if new_accounts > 0 {
        state.config.ledger.accounts = accounts.clone();
        state
            .config
            .save(&state.config_path)
            .context("failed to save config")?;
        info!(new_accounts, "added account mappings to config");
    }

    let syncer = Synchronizer::new(journal, client, Mapper::new(&accounts), &budget_id, start);
    let result = match syncer.sync(&messages, &transactions).await {
        Ok(result) => result,
        Err(aborted) => {
            warn!(
                synced = aborted.partial.synced,
                skipped = aborted.partial.skipped,
                "sync stopped early"
            );
            return Err(anyhow::Error::new(aborted).context("sync failed"));
        }
    };

    Ok(SyncReport {
        resolved_budget,
        candidates: transactions.len(),
        currency: home,
        new_accounts,
        result,
    })
}

pub fn print_sync_report(report: &SyncReport) {
    if let Some(id) = &report.resolved_budget {
        println!("Saved budget ID {id} to config");
    }
    if report.new_accounts > 0 {
        println!("Added {} new account(s) to config", report.new_accounts);
    }
    println!(
        "Found {} {} transactions to sync",
        report.candidates, report.currency
    );

    let r = &report.result;
    println!("\nSync Results:");
    println!("  Total transactions: {}", r.total);
    println!("  Synced: {}", r.synced);
    println!("  Skipped: {}", r.skipped);
    if !r.failed.is_empty() {
        println!("  Failed: {}", r.failed.len());
        for failure in &r.failed {
            println!("    - {failure}");
        }
    }
}

pub async fn missing_templates(state: &AppState, source: &dyn MessageSource) -> Result<()> {
    let messages = Arc::new(source.fetch_messages().await?);
    let missing = find_missing_templates(&state.pool, state.matcher.clone(), messages).await;

    println!("Messages without matching templates:");
    println!("=====================================");
    for msg in &missing {
        println!(
            "\n[{}] {}: [{} chars]",
            msg.timestamp.format("%Y-%m-%d %H:%M:%S"),
            msg.sender,
            msg.content.chars().count()
        );
        println!("---");
    }
    println!("\nTotal messages without templates: {}", missing.len());
    Ok(())
}
