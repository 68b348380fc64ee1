//! Domain events recorded by the event log
//!
//! Every state-changing fact in the financial core is one of these. The
//! payload schema is fixed per event type, so the ledger poster and the P&L
//! aggregator switch exhaustively over `EventKind` instead of probing
//! loosely-shaped JSON.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

use core_kernel::{
    BankConnectionId, BankStatementId, BankTransactionId, CompanyId, Currency, EventId,
    JournalEntryId, Marketplace, MatchingRuleId, PaymentMatchId, SettlementRecordId,
};

use crate::banking::connection::BankErrorCode;
use crate::banking::normalizer::TransactionTags;
use crate::banking::transaction::Direction;
use crate::matching::rules::TargetType;
use crate::mode::OperatingMode;
use crate::reconciliation::ReconciliationStatus;

/// Aggregate an event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AggregateType {
    Order,
    Inventory,
    Journal,
    Settlement,
    Product,
}

/// Event severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Critical,
}

/// Settlement line category reported by a marketplace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeeType {
    Sale,
    Commission,
    #[serde(alias = "CARGO")]
    Shipping,
    ServiceFee,
    OtherFee,
    Other,
}

/// Metadata carried by every event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMetadata {
    /// Overrides the process-wide operating mode for this event's reactions
    pub mode: Option<OperatingMode>,
    /// User or process that caused the event
    pub actor: Option<String>,
    pub severity: Severity,
    pub correlation_id: Option<String>,
}

/// Event type and typed payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "eventType",
    content = "payload",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum EventKind {
    SaleCompleted {
        order_number: String,
        product_id: String,
        marketplace: Marketplace,
        /// VAT-inclusive sale amount
        gross_amount: Decimal,
        /// Percentage; 20 when absent
        tax_rate: Option<Decimal>,
        fifo_cost: Decimal,
        currency: Currency,
    },
    MarketplaceTransactionRecorded {
        marketplace: Marketplace,
        settlement_id: SettlementRecordId,
        external_reference: String,
        fee_type: FeeType,
        amount: Decimal,
        product_id: Option<String>,
        order_number: Option<String>,
        currency: Currency,
    },
    RefundCompleted {
        order_number: String,
        product_id: String,
        marketplace: Marketplace,
        refund_amount: Decimal,
        currency: Currency,
    },
    BankTransactionImported {
        bank_transaction_id: BankTransactionId,
        bank_connection_id: BankConnectionId,
        /// Absolute amount; `direction` carries the sign
        amount: Decimal,
        currency: Currency,
        direction: Direction,
        description: String,
        tags: TransactionTags,
    },
    BankMatchConfirmed {
        match_id: PaymentMatchId,
        bank_transaction_id: BankTransactionId,
        journal_entry_id: Option<JournalEntryId>,
        amount: Decimal,
        direction: Direction,
    },
    MatchingRuleLearned {
        rule_id: MatchingRuleId,
        pattern: String,
        target_type: TargetType,
        account_code: String,
    },
    FirstRealMoneyReceived {
        bank_transaction_id: BankTransactionId,
        amount: Decimal,
        currency: Currency,
    },
    SettlementReconciled {
        statement_id: BankStatementId,
        status: ReconciliationStatus,
        open_total: Decimal,
        payout: Decimal,
        difference: Decimal,
    },
    SafetyBreakerTripped {
        suspense_balance: Decimal,
        failed_events: usize,
        reason: String,
    },
    BankSyncFailed {
        bank_connection_id: BankConnectionId,
        error_code: BankErrorCode,
        message: String,
    },
    MarketplaceActionCompleted {
        idempotency_key: String,
        action: String,
        marketplace: Marketplace,
        order_number: String,
    },
    MarketplaceActionFailed {
        idempotency_key: String,
        action: String,
        marketplace: Marketplace,
        error_code: String,
        message: String,
    },
}

impl EventKind {
    /// Wire name of the event type
    ///
    /// Settlement lines are typed per marketplace, e.g.
    /// `TRENDYOL_TRANSACTION_RECORDED`.
    pub fn event_type(&self) -> Cow<'static, str> {
        let name = match self {
            EventKind::SaleCompleted { .. } => "SALE_COMPLETED",
            EventKind::MarketplaceTransactionRecorded { marketplace, .. } => {
                return Cow::Owned(format!("{}_TRANSACTION_RECORDED", marketplace.code()));
            }
            EventKind::RefundCompleted { .. } => "REFUND_COMPLETED",
            EventKind::BankTransactionImported { .. } => "BANK_TRANSACTION_IMPORTED",
            EventKind::BankMatchConfirmed { .. } => "BANK_MATCH_CONFIRMED",
            EventKind::MatchingRuleLearned { .. } => "MATCHING_RULE_LEARNED",
            EventKind::FirstRealMoneyReceived { .. } => "FIRST_REAL_MONEY_RECEIVED",
            EventKind::SettlementReconciled { .. } => "SETTLEMENT_RECONCILED",
            EventKind::SafetyBreakerTripped { .. } => "SAFETY_BREAKER_TRIPPED",
            EventKind::BankSyncFailed { .. } => "BANK_SYNC_FAILED",
            EventKind::MarketplaceActionCompleted { .. } => "MARKETPLACE_ACTION_COMPLETED",
            EventKind::MarketplaceActionFailed { .. } => "MARKETPLACE_ACTION_FAILED",
        };
        Cow::Borrowed(name)
    }

    fn default_severity(&self) -> Severity {
        match self {
            EventKind::SafetyBreakerTripped { .. } => Severity::Critical,
            EventKind::BankSyncFailed { .. } | EventKind::MarketplaceActionFailed { .. } => {
                Severity::Warning
            }
            _ => Severity::Info,
        }
    }
}

/// An event not yet appended to the log
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub company_id: CompanyId,
    pub aggregate_type: AggregateType,
    pub aggregate_id: String,
    pub kind: EventKind,
    pub metadata: EventMetadata,
}

impl NewEvent {
    pub fn new(
        company_id: CompanyId,
        aggregate_type: AggregateType,
        aggregate_id: impl ToString,
        kind: EventKind,
    ) -> Self {
        let metadata = EventMetadata {
            severity: kind.default_severity(),
            ..EventMetadata::default()
        };
        Self {
            company_id,
            aggregate_type,
            aggregate_id: aggregate_id.to_string(),
            kind,
            metadata,
        }
    }

    pub fn with_mode(mut self, mode: OperatingMode) -> Self {
        self.metadata.mode = Some(mode);
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.metadata.actor = Some(actor.into());
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.metadata.correlation_id = Some(correlation_id.into());
        self
    }
}

/// A recorded business fact; never mutated after append
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainEvent {
    pub id: EventId,
    pub company_id: CompanyId,
    pub aggregate_type: AggregateType,
    pub aggregate_id: String,
    #[serde(flatten)]
    pub kind: EventKind,
    pub metadata: EventMetadata,
    pub created_at: DateTime<Utc>,
}

impl DomainEvent {
    pub(crate) fn record(event: NewEvent, now: DateTime<Utc>) -> Self {
        Self {
            id: EventId::new_v7(),
            company_id: event.company_id,
            aggregate_type: event.aggregate_type,
            aggregate_id: event.aggregate_id,
            kind: event.kind,
            metadata: event.metadata,
            created_at: now,
        }
    }

    pub fn event_type(&self) -> Cow<'static, str> {
        self.kind.event_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn recorded(kind: EventKind) -> DomainEvent {
        DomainEvent::record(
            NewEvent::new(CompanyId::new(), AggregateType::Settlement, "agg-1", kind),
            Utc::now(),
        )
    }

    #[test]
    fn test_settlement_event_type_is_per_marketplace() {
        let event = recorded(EventKind::MarketplaceTransactionRecorded {
            marketplace: Marketplace::Hepsiburada,
            settlement_id: SettlementRecordId::new(),
            external_reference: "HB-1".into(),
            fee_type: FeeType::Commission,
            amount: dec!(12.50),
            product_id: None,
            order_number: None,
            currency: Currency::TRY,
        });
        assert_eq!(event.event_type(), "HEPSIBURADA_TRANSACTION_RECORDED");
    }

    #[test]
    fn test_breaker_events_are_critical() {
        let event = NewEvent::new(
            CompanyId::new(),
            AggregateType::Journal,
            "breaker",
            EventKind::SafetyBreakerTripped {
                suspense_balance: dec!(50001),
                failed_events: 0,
                reason: "suspense".into(),
            },
        );
        assert_eq!(event.metadata.severity, Severity::Critical);
    }

    #[test]
    fn test_serialized_shape() {
        let event = recorded(EventKind::RefundCompleted {
            order_number: "1001".into(),
            product_id: "SKU-1".into(),
            marketplace: Marketplace::Trendyol,
            refund_amount: dec!(50),
            currency: Currency::TRY,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["eventType"], "REFUND_COMPLETED");
        assert_eq!(json["payload"]["productId"], "SKU-1");
        assert_eq!(json["aggregateType"], "SETTLEMENT");

        let back: DomainEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
