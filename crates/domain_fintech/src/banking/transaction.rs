//! Imported bank transactions

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::{BankConnectionId, BankTransactionId, CompanyId, Currency};

/// Money flow relative to the company's account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    /// Positive amounts are inbound
    pub fn from_signed(amount: Decimal) -> Self {
        if amount.is_sign_negative() && !amount.is_zero() {
            Direction::Out
        } else {
            Direction::In
        }
    }
}

/// Processing state of an imported line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BankTransactionStatus {
    Imported,
    Reconciled,
    Suspense,
}

/// A record as returned by a transaction source, before normalization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBankRecord {
    /// Provider's id; not stable across re-exports, so not used for dedup
    pub id: String,
    /// Signed amount; negative is outbound
    pub amount: Decimal,
    pub currency: Currency,
    pub description: String,
    pub date: DateTime<Utc>,
    pub reference: Option<String>,
}

/// A stored bank line, unique per `(bank_connection_id, fingerprint)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankTransaction {
    pub id: BankTransactionId,
    pub company_id: CompanyId,
    pub bank_connection_id: BankConnectionId,
    pub fingerprint: String,
    pub provider_transaction_id: String,
    /// Absolute amount
    pub amount: Decimal,
    pub currency: Currency,
    pub description: String,
    pub direction: Direction,
    pub bank_ref: Option<String>,
    pub transaction_date: DateTime<Utc>,
    pub status: BankTransactionStatus,
    pub created_at: DateTime<Utc>,
}

impl BankTransaction {
    pub fn from_raw(
        company_id: CompanyId,
        bank_connection_id: BankConnectionId,
        fingerprint: String,
        raw: &RawBankRecord,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: BankTransactionId::new_v7(),
            company_id,
            bank_connection_id,
            fingerprint,
            provider_transaction_id: raw.id.clone(),
            amount: raw.amount.abs(),
            currency: raw.currency,
            description: raw.description.clone(),
            direction: Direction::from_signed(raw.amount),
            bank_ref: raw.reference.clone(),
            transaction_date: raw.date,
            status: BankTransactionStatus::Imported,
            created_at: now,
        }
    }
}
