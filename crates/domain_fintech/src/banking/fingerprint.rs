//! Deterministic fingerprint for duplicate detection
//!
//! Bank exports do not carry an id that survives re-export, so ingestion
//! deduplicates on a hash over the normalized business fields. The
//! provider's own id is deliberately left out.

use sha2::{Digest, Sha256};

use core_kernel::{round_minor, BankConnectionId};

use super::normalizer::TransactionNormalizer;
use super::transaction::RawBankRecord;

/// Hex-encoded SHA-256 over connection, day, amount, currency, description and reference
pub fn fingerprint(connection_id: BankConnectionId, record: &RawBankRecord) -> String {
    let amount = round_minor(record.amount, record.currency);
    let canonical = format!(
        "{}|{}|{:.2}|{}|{}|{}",
        connection_id.as_uuid(),
        record.date.format("%Y-%m-%d"),
        amount,
        record.currency.code(),
        TransactionNormalizer::normalize(&record.description),
        record.reference.as_deref().unwrap_or("").trim(),
    );

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}
