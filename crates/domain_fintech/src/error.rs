//! Fintech domain errors

use rust_decimal::Decimal;
use thiserror::Error;

use core_kernel::CoreError;

use crate::banking::connection::{BankErrorCode, ConnectionStatus};

/// Errors that can occur in the financial core
#[derive(Debug, Error)]
pub enum FintechError {
    /// Journal entry lines do not balance
    #[error("Unbalanced journal entry: debits={debits}, credits={credits}")]
    UnbalancedEntry {
        debits: Decimal,
        credits: Decimal,
    },

    /// Journal entry has no lines
    #[error("Journal entry {0} has no lines")]
    EmptyEntry(String),

    /// A unique constraint was violated
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Entity not found
    #[error("{entity} not found: {id}")]
    NotFound {
        entity: &'static str,
        id: String,
    },

    /// Bank connection state machine rejected the move
    #[error("Illegal bank connection transition: {from} -> {to}")]
    InvalidTransition {
        from: ConnectionStatus,
        to: ConnectionStatus,
    },

    /// Fetching from the bank failed
    #[error("Bank sync failed ({code}): {message}")]
    BankSync {
        code: BankErrorCode,
        message: String,
    },

    /// Invalid input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Payload could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Kernel error
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Backing store failure
    #[error("Storage error: {0}")]
    Storage(String),
}

impl FintechError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        FintechError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        FintechError::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        FintechError::Conflict(message.into())
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, FintechError::Conflict(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FintechError::NotFound { .. })
    }
}
