//! Marketplace Actions - Idempotent execution of side effects
//!
//! Operators trigger marketplace actions (refresh an order's status, print a
//! shipping label, change the cargo provider). Each request carries an
//! idempotency key and produces exactly one audit row and one cached result,
//! however many times it is submitted.
//!
//! # Components
//!
//! - [`ActionExecutor`]: lease + audit row, direct or queued execution
//! - [`ActionWorker`]: drains the job queue with retries and dead-lettering
//! - [`ActionHandler`]: the marketplace calls themselves
//! - [`LabelStore`]: store-and-hash of fetched labels
//!
//! # Example
//!
//! ```rust,ignore
//! let outcome = executor
//!     .execute(ActionRequest::new("order-1001-label", company, Marketplace::N11, ActionKind::PrintLabelA4, "1001"))
//!     .await?;
//! assert!(matches!(outcome.status, ActionStatus::Pending | ActionStatus::Success | ActionStatus::Failed));
//! ```

pub mod audit_store;
pub mod error;
pub mod events;
pub mod executor;
pub mod gateway;
pub mod handler;
pub mod labels;
pub mod lease;
pub mod model;
pub mod queue;
pub mod worker;

pub use audit_store::{ActionAuditStore, BeginOutcome, MemoryActionAuditStore};
pub use error::{ActionError, ActionErrorCode};
pub use events::{ActionEventSink, NoopEventSink};
pub use executor::{ActionExecutor, ExecutorConfig};
pub use gateway::{GatewayDirectory, LabelDocument, LocalOrder, MarketplaceGateway, MemoryOrderBook, OrderBook, RemoteOrder};
pub use handler::ActionHandler;
pub use labels::{LabelRecord, LabelRepository, LabelStore, MemoryLabelRepository, MemoryObjectStorage, ObjectStorage};
pub use lease::{action_lease_key, Lease, LeaseProvider, MemoryLeaseProvider};
pub use model::{ActionAudit, ActionKind, ActionOutcome, ActionRequest, ActionStatus, FailureRecord};
pub use queue::{
    BackoffKind, DeadLetteredJob, EnqueueResult, JobQueue, MemoryJobQueue, NackOutcome, QueueConfig, QueueStats,
    QueuedJob, ReplayReport, ReplaySkip, ReplayTarget,
};
pub use worker::{ActionWorker, WorkOutcome};
