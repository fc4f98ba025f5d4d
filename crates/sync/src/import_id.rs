use sha2::{Digest, Sha256};
use smsledger_core::{RawMessage, Transaction};

/// Namespace tag every generated id starts with.
pub const IMPORT_ID_PREFIX: &str = "YNAB:";

/// Compute SHA-256 of an in-memory byte slice.
pub fn sha256_bytes(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Deterministic id for one observed transaction.
///
/// The preimage is `"{unix_secs}:{card}:{amount:.2}:{address}"` where the
/// amount is the converted value (the original one when no conversion took
/// place). Sender and original amount are not part of it, so two purchases
/// in the same second on the same card with equal amount and payee share an
/// id. Changing which fields feed the preimage invalidates every journal
/// entry written before the change.
pub fn import_id(message: &RawMessage, tx: &Transaction) -> String {
    let preimage = format!(
        "{}:{}:{:.2}:{}",
        message.timestamp.timestamp(),
        tx.card(),
        tx.effective_amount().value,
        tx.address(),
    );
    let digest = sha256_bytes(preimage.as_bytes());
    format!("{IMPORT_ID_PREFIX}{}", hex::encode(&digest[..8]))
}
