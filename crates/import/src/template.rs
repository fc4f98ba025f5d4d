use std::fmt;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use smsledger_core::{Amount, Transaction};
use thiserror::Error;

use crate::number::parse_number;

// ── Compiled regex cache ─────────────────────────────────────────────────────

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

re!(re_maib_op, r"^Op: (.+)");
re!(re_maib_field, r"^([^:]+): (.*)$");
// Digit and word classes are ASCII-only, matching the bank grammars.
re!(re_maib_amount, r"^([0-9,]+)[ \t]*([A-Za-z0-9_]+)$");

re!(re_exim_transfer,
    r"Tranzactia din ([0-9]{2}/[0-9]{2}/[0-9]{4}) din contul ([^\t\n\f\r ]+) in contul ([^\t\n\f\r ]+) in suma de ([0-9.]+) ([A-Za-z0-9_]+) a fost ([A-Za-z0-9_]+)");
// Detalii may contain commas; the lazy group plus end anchor keeps them.
re!(re_debitare,
    r"Debitare cont Card ([^,]+), Data ([^,]+), Suma ([0-9.]+) ([A-Za-z0-9_]+), Detalii (.+?), Disponibil ([0-9.]+) [A-Za-z0-9_]+$");
re!(re_tranzactie_reusita,
    r"Tranzactie reusita, Data ([^,]+), Card ([^,]+), Suma ([0-9.]+) ([A-Za-z0-9_]+), Locatie ([^,]+, [A-Za-z0-9_]+), Disponibil ([0-9.]+)");
re!(re_suplinire,
    r"Suplinire cont Card ([^,]+), Data ([^,]+), Suma ([0-9.]+) ([A-Za-z0-9_]+), Detalii (.+?)(?:, Disponibil ([0-9.]+) [A-Za-z0-9_]+)?$");

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TemplateError {
    #[error("invalid number: {0:?}")]
    InvalidNumber(String),
    #[error("invalid amount format: {0:?}")]
    InvalidAmount(String),
    #[error("{0} template does not match the message")]
    NoMatch(Template),
}

/// One bank-message dialect.
///
/// Variants are tried in [`Template::REGISTERED`] order and the first match
/// wins, so more specific grammars must come before more general ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Template {
    /// MAIB line-oriented `key: value` notifications.
    Maib,
    /// Eximbank inter-account transfer confirmation.
    EximTransaction,
    /// Eximbank card debit.
    Debitare,
    /// Eximbank successful purchase.
    TranzactieReusita,
    /// Eximbank card top-up; the trailing balance is optional.
    Suplinire,
}

impl Template {
    pub const REGISTERED: [Template; 5] = [
        Template::Maib,
        Template::EximTransaction,
        Template::Debitare,
        Template::TranzactieReusita,
        Template::Suplinire,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Template::Maib => "MAIB",
            Template::EximTransaction => "EximTransaction",
            Template::Debitare => "Debitare",
            Template::TranzactieReusita => "TranzactieReusita",
            Template::Suplinire => "Suplinire",
        }
    }

    fn regex(self) -> &'static Regex {
        match self {
            Template::Maib => re_maib_op(),
            Template::EximTransaction => re_exim_transfer(),
            Template::Debitare => re_debitare(),
            Template::TranzactieReusita => re_tranzactie_reusita(),
            Template::Suplinire => re_suplinire(),
        }
    }

    pub fn matches(self, content: &str) -> bool {
        self.regex().is_match(content)
    }

    /// Decomposes `content` into a transaction. Callers are expected to have
    /// checked [`Template::matches`] first.
    pub fn parse(self, content: &str) -> Result<Transaction, TemplateError> {
        match self {
            Template::Maib => parse_maib(content),
            Template::EximTransaction => {
                let caps = self.captures(content)?;
                Ok(Transaction {
                    date_time: capture(&caps, 1),
                    from_account: capture(&caps, 2),
                    to_account: capture(&caps, 3),
                    original: Amount::new(parse_number(&caps[4])?, &caps[5]),
                    status: capture(&caps, 6),
                    ..Transaction::from_raw(content)
                })
            }
            Template::Debitare => {
                let caps = self.captures(content)?;
                Ok(Transaction {
                    operation: Some("Debitare".to_string()),
                    card: capture(&caps, 1),
                    date_time: capture(&caps, 2),
                    original: Amount::new(parse_number(&caps[3])?, &caps[4]),
                    address: capture(&caps, 5),
                    balance: Some(parse_number(&caps[6])?),
                    ..Transaction::from_raw(content)
                })
            }
            Template::TranzactieReusita => {
                let caps = self.captures(content)?;
                Ok(Transaction {
                    operation: Some("Tranzactie reusita".to_string()),
                    date_time: capture(&caps, 1),
                    card: capture(&caps, 2),
                    original: Amount::new(parse_number(&caps[3])?, &caps[4]),
                    address: capture(&caps, 5),
                    balance: Some(parse_number(&caps[6])?),
                    ..Transaction::from_raw(content)
                })
            }
            Template::Suplinire => {
                let caps = self.captures(content)?;
                Ok(Transaction {
                    operation: Some("Suplinire".to_string()),
                    card: capture(&caps, 1),
                    date_time: capture(&caps, 2),
                    original: Amount::new(parse_number(&caps[3])?, &caps[4]),
                    address: capture(&caps, 5),
                    balance: caps
                        .get(6)
                        .map(|m| parse_number(m.as_str()))
                        .transpose()?,
                    ..Transaction::from_raw(content)
                })
            }
        }
    }

    fn captures(self, content: &str) -> Result<Captures<'_>, TemplateError> {
        self.regex()
            .captures(content)
            .ok_or(TemplateError::NoMatch(self))
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Template {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Template::REGISTERED
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown template: '{s}'"))
    }
}

fn capture(caps: &Captures<'_>, idx: usize) -> Option<String> {
    caps.get(idx).map(|m| m.as_str().to_string())
}

// ── MAIB ─────────────────────────────────────────────────────────────────────

/// Each recognised key overwrites the previous value, so the last
/// occurrence of a duplicated key wins. Unknown keys are skipped.
fn parse_maib(content: &str) -> Result<Transaction, TemplateError> {
    let mut tx = Transaction::from_raw(content);

    for line in content.split('\n') {
        let Some(caps) = re_maib_field().captures(line) else {
            continue;
        };
        let key = caps[1].trim();
        let value = caps[2].trim().to_string();

        match key {
            "Op" => tx.operation = Some(value),
            "Karta" => tx.card = Some(value),
            "Status" => tx.status = Some(value),
            "Summa" => tx.original = parse_maib_amount(&value)?,
            "Dost" => tx.balance = Some(parse_number(&value)?),
            "Data/vremya" => tx.date_time = Some(value),
            "Adres" => tx.address = Some(value),
            "Podderzhka" => tx.support = Some(value),
            _ => {}
        }
    }

    Ok(tx)
}

fn parse_maib_amount(value: &str) -> Result<Amount, TemplateError> {
    let caps = re_maib_amount()
        .captures(value)
        .ok_or_else(|| TemplateError::InvalidAmount(value.to_string()))?;
    Ok(Amount::new(parse_number(&caps[1])?, &caps[2]))
}
