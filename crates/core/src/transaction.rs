use serde::{Deserialize, Serialize};

use super::money::Amount;

/// A bank transaction decomposed from one notification.
///
/// Fields a template did not capture are `None`, never an empty string or
/// zero, so "balance was 0.00" and "no balance in the message" stay distinct.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub operation: Option<String>,
    pub card: Option<String>,
    pub status: Option<String>,
    /// As written in the message.
    pub original: Amount,
    /// Home-currency amount; set only after a successful conversion.
    pub converted: Option<Amount>,
    pub balance: Option<f64>,
    pub date_time: Option<String>,
    pub address: Option<String>,
    pub support: Option<String>,
    pub from_account: Option<String>,
    pub to_account: Option<String>,
    pub raw_message: String,
}

impl Transaction {
    pub fn from_raw(raw_message: &str) -> Self {
        Transaction {
            raw_message: raw_message.to_string(),
            ..Default::default()
        }
    }

    pub fn operation(&self) -> &str {
        self.operation.as_deref().unwrap_or_default()
    }

    pub fn status(&self) -> &str {
        self.status.as_deref().unwrap_or_default()
    }

    pub fn card(&self) -> &str {
        self.card.as_deref().unwrap_or_default()
    }

    pub fn address(&self) -> &str {
        self.address.as_deref().unwrap_or_default()
    }

    /// The converted amount when present, the original otherwise.
    pub fn effective_amount(&self) -> &Amount {
        self.converted.as_ref().unwrap_or(&self.original)
    }

    pub fn is_converted_to(&self, currency: &str) -> bool {
        self.converted.as_ref().is_some_and(|a| a.is_in(currency))
    }

    pub fn is_declined(&self) -> bool {
        self.status().starts_with("Decline")
    }
}
