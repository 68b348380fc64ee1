//! Idempotent action executor
//!
//! Two entry paths share one audit row per idempotency key:
//!
//! - **Direct**: take the `action:{key}` lease (60s TTL), claim the audit
//!   row, call the marketplace, record the result, release the lease on every
//!   path. A caller that finds the lease taken gets `PENDING`, or the cached
//!   result when the row already succeeded.
//! - **Queued**: claim the audit row and enqueue a job under the same key;
//!   the [`ActionWorker`](crate::worker::ActionWorker) calls the marketplace
//!   later. The caller always gets `PENDING` unless a cached result exists.
//!
//! A crash while holding the lease leaves it to expire; the next caller may
//! then run the provider call again. The audit row guarantees a single
//! result, not a single provider call.

use chrono::Duration;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use core_kernel::{Clock, Marketplace};

use crate::audit_store::{ActionAuditStore, BeginOutcome};
use crate::error::ActionError;
use crate::events::ActionEventSink;
use crate::handler::ActionHandler;
use crate::lease::{action_lease_key, LeaseProvider};
use crate::model::{ActionAudit, ActionOutcome, ActionRequest, ActionStatus};
use crate::queue::{EnqueueResult, JobQueue, ReplayTarget};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    pub lock_ttl: Duration,
    /// Marketplaces whose actions go through the job queue
    pub queued_marketplaces: HashSet<Marketplace>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            lock_ttl: Duration::seconds(60),
            queued_marketplaces: HashSet::from([Marketplace::Trendyol]),
        }
    }
}

pub struct ActionExecutor {
    audits: Arc<dyn ActionAuditStore>,
    leases: Arc<dyn LeaseProvider>,
    queue: Arc<dyn JobQueue>,
    handler: Arc<ActionHandler>,
    events: Arc<dyn ActionEventSink>,
    clock: Arc<dyn Clock>,
    config: ExecutorConfig,
}

impl ActionExecutor {
    pub fn new(
        audits: Arc<dyn ActionAuditStore>,
        leases: Arc<dyn LeaseProvider>,
        queue: Arc<dyn JobQueue>,
        handler: Arc<ActionHandler>,
        events: Arc<dyn ActionEventSink>,
        clock: Arc<dyn Clock>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            audits,
            leases,
            queue,
            handler,
            events,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Routes the request to the direct or queued path
    pub async fn execute(&self, request: ActionRequest) -> Result<ActionOutcome, ActionError> {
        request.validate()?;
        if self.config.queued_marketplaces.contains(&request.marketplace) {
            self.enqueue(request).await
        } else {
            self.execute_now(request).await
        }
    }

    /// Current audit row for an idempotency key
    pub async fn status(&self, idempotency_key: &str) -> Result<Option<ActionAudit>, ActionError> {
        self.audits.find(idempotency_key).await
    }

    /// Direct path: runs the provider call under the lease
    pub async fn execute_now(&self, request: ActionRequest) -> Result<ActionOutcome, ActionError> {
        request.validate()?;
        let key = request.idempotency_key.clone();
        let lease_key = action_lease_key(&key);

        let Some(lease) = self.leases.try_acquire(&lease_key, self.config.lock_ttl).await? else {
            debug!(idempotency_key = %key, "Action already in progress");
            let existing = self.audits.find(&key).await?;
            return Ok(match existing {
                Some(audit) if audit.status == ActionStatus::Success => ActionOutcome::from_audit(&audit),
                Some(audit) => ActionOutcome::pending(&key, Some(audit.id)),
                None => ActionOutcome::pending(&key, None),
            });
        };

        let result = self.run_locked(&request).await;

        match self.leases.release(&lease).await {
            Ok(true) => {}
            Ok(false) => warn!(idempotency_key = %key, "Lease expired before release"),
            Err(e) => warn!(idempotency_key = %key, error = %e, "Lease release failed"),
        }
        result
    }

    async fn run_locked(&self, request: &ActionRequest) -> Result<ActionOutcome, ActionError> {
        let key = &request.idempotency_key;
        if let BeginOutcome::AlreadySucceeded(audit) = self.audits.begin(request, self.clock.now()).await? {
            debug!(idempotency_key = %key, "Returning cached action result");
            return Ok(ActionOutcome::from_audit(&audit));
        }

        match self.handler.handle(request).await {
            Ok(response) => {
                let audit = self.audits.complete(key, response, self.clock.now()).await?;
                self.events.completed(&audit).await;
                info!(
                    idempotency_key = %key,
                    action = %request.action,
                    marketplace = %request.marketplace,
                    "Action succeeded"
                );
                Ok(ActionOutcome::from_audit(&audit))
            }
            Err(e) => {
                let audit = self
                    .audits
                    .fail(key, e.code(), &e.message(), self.clock.now())
                    .await?;
                self.events.failed(&audit).await;
                warn!(
                    idempotency_key = %key,
                    action = %request.action,
                    error_code = %e.code(),
                    error = %e,
                    "Action failed"
                );
                Ok(ActionOutcome::from_audit(&audit))
            }
        }
    }

    /// Queued path: claims the audit row and hands the job to the worker
    pub async fn enqueue(&self, request: ActionRequest) -> Result<ActionOutcome, ActionError> {
        request.validate()?;
        let key = request.idempotency_key.clone();
        let now = self.clock.now();

        let (audit, created) = self.audits.insert_if_absent(&request, now).await?;
        if audit.has_cached_result() {
            return Ok(ActionOutcome::from_audit(&audit));
        }
        if audit.status == ActionStatus::Failed {
            self.audits.begin(&request, now).await?;
            // A dead-lettered job keeps its id; bring it back instead of enqueueing a twin
            let report = self.queue.replay(ReplayTarget::Ids(vec![key.clone()])).await?;
            if report.replayed.contains(&key) {
                info!(idempotency_key = %key, "Failed action resubmitted from dead-letter queue");
                return Ok(ActionOutcome::pending(&key, Some(audit.id)));
            }
        }

        // A live job answers Duplicate; a queue that lost its jobs takes the row back
        match self.queue.enqueue(request).await? {
            EnqueueResult::Enqueued(job_id) => {
                self.audits.set_job(&key, &job_id, now).await?;
                info!(idempotency_key = %key, job_id = %job_id, "Action queued");
            }
            EnqueueResult::Duplicate(job_id) => {
                debug!(idempotency_key = %key, job_id = %job_id, created, "Action already queued");
            }
        }
        Ok(ActionOutcome::pending(&key, Some(audit.id)))
    }
}
