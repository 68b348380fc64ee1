//! Core Kernel - Foundational types shared by the back-office financial core
//!
//! This crate provides the building blocks used across all domain crates:
//! - Fixed-point money helpers (currency, VAT extraction, rounding)
//! - Strongly-typed identifiers
//! - The marketplace list shared by settlement and action code
//! - An injectable clock
//! - The error type used by collaborator ports

pub mod money;
pub mod marketplace;
pub mod identifiers;
pub mod clock;
pub mod ports;
pub mod error;

pub use money::{Currency, MoneyError, VatRate, VatSplit, round_minor};
pub use marketplace::Marketplace;
pub use identifiers::{
    CompanyId, EventId, JournalEntryId, JournalLineId, BankConnectionId,
    BankTransactionId, BankStatementId, PaymentMatchId, MatchingRuleId,
    AuditRecordId, SettlementRecordId, ActionAuditId, LabelId, OrderId,
};
pub use clock::{Clock, SystemClock, ManualClock};
pub use ports::{PortError, DomainPort};
pub use error::CoreError;
