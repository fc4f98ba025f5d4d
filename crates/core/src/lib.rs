pub mod account;
pub mod message;
pub mod money;
pub mod transaction;

pub use account::{card_last4, AccountIndex, AccountMapping, MappingError};
pub use message::{ParsedMessage, RawMessage};
pub use money::Amount;
pub use transaction::Transaction;
