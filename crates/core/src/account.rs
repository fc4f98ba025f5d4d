use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Binds a card suffix to the ledger account that receives its transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountMapping {
    pub ledger_account_id: String,
    pub last4: String,
}

impl AccountMapping {
    pub fn new(ledger_account_id: &str, last4: &str) -> Self {
        AccountMapping {
            ledger_account_id: ledger_account_id.to_string(),
            last4: last4.to_string(),
        }
    }
}

impl fmt::Display for AccountMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "*{} -> {}", self.last4, self.ledger_account_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    #[error("transaction has no card information")]
    NoCard,
    #[error("could not extract last4 from card: {0}")]
    NoLast4(String),
    #[error("no account found for card ending in {0}")]
    UnknownCard(String),
}

/// Returns the trailing four ASCII digits of a masked card string
/// (`"9..7890"`, `"*1234"`), or `None` when it does not end in four digits.
pub fn card_last4(card: &str) -> Option<&str> {
    let bytes = card.as_bytes();
    if bytes.len() < 4 {
        return None;
    }
    let tail = &bytes[bytes.len() - 4..];
    if tail.iter().all(u8::is_ascii_digit) {
        Some(&card[card.len() - 4..])
    } else {
        None
    }
}

/// Lookup table from card suffix to ledger account id.
#[derive(Debug, Clone, Default)]
pub struct AccountIndex {
    by_last4: HashMap<String, String>,
}

impl AccountIndex {
    pub fn new(mappings: &[AccountMapping]) -> Self {
        let by_last4 = mappings
            .iter()
            .map(|m| (m.last4.clone(), m.ledger_account_id.clone()))
            .collect();
        AccountIndex { by_last4 }
    }

    pub fn contains(&self, last4: &str) -> bool {
        self.by_last4.contains_key(last4)
    }

    /// Resolves a card string to its ledger account id.
    pub fn resolve(&self, card: Option<&str>) -> Result<&str, MappingError> {
        let card = card.filter(|c| !c.is_empty()).ok_or(MappingError::NoCard)?;
        let last4 = card_last4(card).ok_or_else(|| MappingError::NoLast4(card.to_string()))?;
        self.by_last4
            .get(last4)
            .map(String::as_str)
            .ok_or_else(|| MappingError::UnknownCard(last4.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last4_from_masked_cards() {
        assert_eq!(card_last4("9..7890"), Some("7890"));
        assert_eq!(card_last4("*1234"), Some("1234"));
        assert_eq!(card_last4("1234"), Some("1234"));
    }

    #[test]
    fn last4_rejects_short_or_non_digit_tail() {
        assert_eq!(card_last4("123"), None);
        assert_eq!(card_last4("*12a4"), None);
        assert_eq!(card_last4(""), None);
        assert_eq!(card_last4("Card 1234 X"), None);
    }

    #[test]
    fn last4_handles_multibyte_prefix() {
        assert_eq!(card_last4("карта 5678"), Some("5678"));
    }

    #[test]
    fn index_resolves_known_card() {
        let index = AccountIndex::new(&[AccountMapping::new("acc-1", "1234")]);
        assert_eq!(index.resolve(Some("*1234")), Ok("acc-1"));
        assert!(index.contains("1234"));
    }

    #[test]
    fn index_errors_are_descriptive() {
        let index = AccountIndex::new(&[AccountMapping::new("acc-1", "1234")]);
        assert_eq!(index.resolve(None), Err(MappingError::NoCard));
        assert_eq!(index.resolve(Some("")), Err(MappingError::NoCard));
        assert_eq!(
            index.resolve(Some("*12")),
            Err(MappingError::NoLast4("*12".to_string()))
        );
        let err = index.resolve(Some("9..9999")).unwrap_err();
        assert_eq!(err.to_string(), "no account found for card ending in 9999");
    }

    #[test]
    fn mapping_display() {
        assert_eq!(AccountMapping::new("abc", "1234").to_string(), "*1234 -> abc");
    }
}
