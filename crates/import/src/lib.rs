pub mod ignore;
pub mod matcher;
pub mod number;
pub mod template;

pub use ignore::{IgnoreClassifier, DEFAULT_IGNORE_PATTERNS};
pub use matcher::{Classification, Matcher, ParseOutcome};
pub use number::parse_number;
pub use template::{Template, TemplateError};
