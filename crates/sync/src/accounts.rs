use smsledger_core::{card_last4, AccountIndex, AccountMapping, Transaction};
use thiserror::Error;
use tracing::{debug, info};

use crate::client::{LedgerClient, LedgerError, NewAccount};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("failed to list ledger accounts: {0}")]
    ListAccounts(#[source] LedgerError),
    #[error("failed to create ledger account for card {last4}: {source}")]
    CreateAccount {
        last4: String,
        #[source]
        source: LedgerError,
    },
}

/// Unique card suffixes in first-seen order.
pub fn unique_last4s<'a>(transactions: impl IntoIterator<Item = &'a Transaction>) -> Vec<String> {
    let mut seen = Vec::<String>::new();
    for tx in transactions {
        let Some(last4) = tx.card.as_deref().and_then(card_last4) else {
            continue;
        };
        if !seen.iter().any(|s| s == last4) {
            seen.push(last4.to_string());
        }
    }
    seen
}

/// Makes sure every card seen in a run has a ledger account behind it.
pub struct AccountResolver<'a, C: LedgerClient + ?Sized> {
    client: &'a C,
    budget_id: &'a str,
}

impl<'a, C: LedgerClient + ?Sized> AccountResolver<'a, C> {
    pub fn new(client: &'a C, budget_id: &'a str) -> Self {
        Self { client, budget_id }
    }

    /// Returns `existing` followed by one new mapping per previously unmapped
    /// card suffix. An open ledger account whose name contains the suffix is
    /// reused; otherwise a `Card {last4}` checking account is created.
    ///
    /// The ledger is not contacted when every suffix is already mapped. Any
    /// ledger error aborts the whole call and no partial list is returned.
    pub async fn ensure_accounts(
        &self,
        existing: &[AccountMapping],
        transactions: &[Transaction],
    ) -> Result<Vec<AccountMapping>, ResolveError> {
        let index = AccountIndex::new(existing);
        let unmapped: Vec<String> = unique_last4s(transactions)
            .into_iter()
            .filter(|last4| !index.contains(last4))
            .collect();

        if unmapped.is_empty() {
            debug!("all cards already mapped");
            return Ok(existing.to_vec());
        }

        let accounts = self
            .client
            .get_accounts(self.budget_id)
            .await
            .map_err(ResolveError::ListAccounts)?;

        let mut result = existing.to_vec();
        for last4 in unmapped {
            let found = accounts
                .iter()
                .filter(|a| a.is_open())
                .find(|a| a.name.contains(last4.as_str()));

            let account_id = match found {
                Some(account) => {
                    info!(%last4, account = %account.name, "mapped card to existing account");
                    account.id.clone()
                }
                None => {
                    let created = self
                        .client
                        .create_account(self.budget_id, &NewAccount::for_card(&last4))
                        .await
                        .map_err(|source| ResolveError::CreateAccount {
                            last4: last4.clone(),
                            source,
                        })?;
                    info!(%last4, account = %created.name, "created ledger account for card");
                    created.id
                }
            };
            result.push(AccountMapping::new(&account_id, &last4));
        }

        Ok(result)
    }
}
