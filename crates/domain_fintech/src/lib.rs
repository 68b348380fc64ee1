//! Fintech Domain - Event-Sourced Double-Entry Core
//!
//! This crate turns raw external facts (bank transactions, marketplace
//! settlement lines, sales) into an immutable double-entry ledger and keeps
//! the derived projections consistent with it.
//!
//! # Pipeline
//!
//! Every state change goes through the [`EventLog`]. Appending an event runs
//! the registered reactions inside the same store transaction:
//!
//! - **Ledger poster**: journal lines per event type, once per source event
//! - **P&L aggregator**: per-product, per-marketplace profitability counters
//! - **Payment matching**: rule/systematic scoring of imported bank lines
//!
//! Batch engines work on the resulting ledger: settlement reconciliation,
//! the safety breaker and control-tower metrics.
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_fintech::{EventLog, MemoryLedgerStore, MemoryDiary, MatchingConfig, OperatingMode};
//!
//! let log = Arc::new(EventLog::with_standard_handlers(
//!     Arc::new(MemoryLedgerStore::new()),
//!     Arc::new(SystemClock),
//!     OperatingMode::DryRun,
//!     MatchingConfig::default(),
//!     Arc::new(MemoryDiary::new()),
//! ));
//!
//! let sync = BankSyncEngine::new(log.clone());
//! let report = sync.sync_connection(connection_id, &source).await?;
//! ```

pub mod audit;
pub mod banking;
pub mod chart;
pub mod error;
pub mod event_log;
pub mod events;
pub mod journal;
pub mod matching;
pub mod memory;
pub mod metrics;
pub mod mode;
pub mod pnl;
pub mod poster;
pub mod reconciliation;
pub mod safety;
pub mod store;

pub use audit::AuditRecord;
pub use banking::{
    BankConnection, BankErrorCode, BankSyncEngine, BankTransaction, BankTransactionStatus,
    ConnectionService, ConnectionStatus, Direction, RawBankRecord, SourceError, StatusChange, SyncOutcome,
    SyncReport, TransactionNormalizer, TransactionSource, TransactionTags,
};
pub use chart::{AccountTotals, AccountType};
pub use error::FintechError;
pub use event_log::{EventHandler, EventLog, ReactionContext};
pub use events::{AggregateType, DomainEvent, EventKind, EventMetadata, FeeType, NewEvent, Severity};
pub use journal::{EntryDraft, JournalEntry, JournalLine, LineDraft, OpenLineQuery};
pub use matching::{
    ConfidenceBucket, DiaryEntry, EdgeCaseDiary, JsonlDiary, MatchStatus, MatchType, MatchingConfig,
    MatchingRule, MemoryDiary, PaymentMatch, PaymentMatchingEngine, RuleLearner, TargetType,
};
pub use memory::{LedgerState, MemoryLedgerStore};
pub use metrics::{HealthGrade, MetricsSnapshot, ReconciliationMetrics};
pub use mode::OperatingMode;
pub use pnl::{MarketplaceProductPnl, PnlAggregator, PnlKey};
pub use poster::LedgerPoster;
pub use reconciliation::{
    BankStatement, ProcessingStatus, ReconciliationConfig, ReconciliationOutcome,
    ReconciliationStatus, SettledTransaction, SettlementRecord, SettlementReconciliationEngine,
};
pub use safety::{AutopilotConfig, BreakerThresholds, SafetyBreaker};
pub use store::{LedgerStore, LedgerTx, LedgerUnit};
