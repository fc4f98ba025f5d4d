use smsledger_core::Transaction;
use tracing::debug;

use crate::ignore::IgnoreClassifier;
use crate::template::{Template, TemplateError};

/// Result of running a message through the matcher.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    Parsed {
        template: Template,
        transaction: Transaction,
    },
    /// No registered template recognises the message. Expected, not an error.
    NoTemplate,
    /// A template matched but a field (amount, balance) was malformed.
    Malformed {
        template: Template,
        error: TemplateError,
    },
}

impl ParseOutcome {
    pub fn is_parsed(&self) -> bool {
        matches!(self, ParseOutcome::Parsed { .. })
    }

    pub fn template(&self) -> Option<Template> {
        match self {
            ParseOutcome::Parsed { template, .. } | ParseOutcome::Malformed { template, .. } => {
                Some(*template)
            }
            ParseOutcome::NoTemplate => None,
        }
    }

    pub fn into_transaction(self) -> Option<Transaction> {
        match self {
            ParseOutcome::Parsed { transaction, .. } => Some(transaction),
            _ => None,
        }
    }
}

/// Template lookup and ignore check for one message; the two are independent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub has_template: bool,
    pub ignored: bool,
}

impl Classification {
    /// Neither recognised nor deliberately ignored.
    pub fn is_missing_template(self) -> bool {
        !self.has_template && !self.ignored
    }
}

/// Ordered template list plus the ignore classifier.
#[derive(Debug, Clone)]
pub struct Matcher {
    templates: Vec<Template>,
    ignore: IgnoreClassifier,
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new(Template::REGISTERED.to_vec(), IgnoreClassifier::default())
    }
}

impl Matcher {
    /// `templates` are tried in the given order; the first match wins.
    pub fn new(templates: Vec<Template>, ignore: IgnoreClassifier) -> Self {
        Self { templates, ignore }
    }

    pub fn templates(&self) -> &[Template] {
        &self.templates
    }

    pub fn find_template(&self, content: &str) -> Option<Template> {
        self.templates.iter().copied().find(|t| t.matches(content))
    }

    pub fn should_ignore(&self, content: &str) -> bool {
        self.ignore.should_ignore(content)
    }

    pub fn classify(&self, content: &str) -> Classification {
        Classification {
            has_template: self.find_template(content).is_some(),
            ignored: self.should_ignore(content),
        }
    }

    pub fn parse(&self, content: &str) -> ParseOutcome {
        let Some(template) = self.find_template(content) else {
            return ParseOutcome::NoTemplate;
        };
        match template.parse(content) {
            Ok(transaction) => ParseOutcome::Parsed {
                template,
                transaction,
            },
            Err(error) => {
                debug!(template = %template, %error, "template matched but parse failed");
                ParseOutcome::Malformed { template, error }
            }
        }
    }
}
