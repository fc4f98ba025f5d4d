use serde::{Deserialize, Serialize};
use std::fmt;

/// A monetary value tagged with its three-letter currency code.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Amount {
    pub value: f64,
    pub currency: String,
}

impl Amount {
    pub fn new(value: f64, currency: &str) -> Self {
        Amount {
            value,
            currency: currency.to_string(),
        }
    }

    /// Ledger integer representation: `value * 1000`, truncated toward zero.
    pub fn to_milliunits(&self) -> i64 {
        (self.value * 1000.0) as i64
    }

    /// Converts into `home_currency` using a units-of-home-per-unit rate.
    pub fn convert(&self, rate: f64, home_currency: &str) -> Amount {
        Amount {
            value: self.value * rate,
            currency: home_currency.to_string(),
        }
    }

    pub fn is_in(&self, currency: &str) -> bool {
        self.currency == currency
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} {}", self.value, self.currency)
    }
}
