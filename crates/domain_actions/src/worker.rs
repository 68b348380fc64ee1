//! Queue worker
//!
//! Pulls action jobs, runs them through the [`ActionHandler`] and keeps the
//! audit row in step with the queue: each failed attempt lands in the row's
//! failure history, and the row only turns `FAILED` once the queue gives up
//! on the job.

use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::watch;
use tracing::{error, info, warn};

use core_kernel::Clock;

use crate::audit_store::ActionAuditStore;
use crate::error::ActionError;
use crate::events::ActionEventSink;
use crate::handler::ActionHandler;
use crate::model::{ActionStatus, FailureRecord};
use crate::queue::{JobQueue, NackOutcome};

/// What one poll of the queue did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkOutcome {
    Idle,
    /// Audit row missing or already successful
    Skipped(String),
    Succeeded(String),
    Retrying(String),
    Failed(String),
}

pub struct ActionWorker {
    queue: Arc<dyn JobQueue>,
    audits: Arc<dyn ActionAuditStore>,
    handler: Arc<ActionHandler>,
    events: Arc<dyn ActionEventSink>,
    clock: Arc<dyn Clock>,
}

impl ActionWorker {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        audits: Arc<dyn ActionAuditStore>,
        handler: Arc<ActionHandler>,
        events: Arc<dyn ActionEventSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            queue,
            audits,
            handler,
            events,
            clock,
        }
    }

    /// Processes at most one job
    pub async fn run_once(&self) -> Result<WorkOutcome, ActionError> {
        let Some(job) = self.queue.reserve().await? else {
            return Ok(WorkOutcome::Idle);
        };
        let key = job.id.clone();

        let audit = self.audits.find(&key).await?;
        if audit.as_ref().map_or(true, |a| a.status == ActionStatus::Success) {
            warn!(idempotency_key = %key, "Audit row missing or already successful; skipping job");
            self.queue.ack(&key).await?;
            return Ok(WorkOutcome::Skipped(key));
        }

        info!(
            idempotency_key = %key,
            action = %job.request.action,
            marketplace = %job.request.marketplace,
            attempt = job.attempts_made,
            "Worker processing started"
        );

        match self.handler.handle(&job.request).await {
            Ok(response) => {
                let audit = self.audits.complete(&key, response, self.clock.now()).await?;
                self.queue.ack(&key).await?;
                self.events.completed(&audit).await;
                info!(idempotency_key = %key, "Action completed");
                Ok(WorkOutcome::Succeeded(key))
            }
            Err(e) => {
                let code = e.code();
                let message = e.message();
                let outcome = self.queue.nack(&key, &message, code.is_retryable()).await?;
                let terminal = outcome == NackOutcome::DeadLettered;

                let failure = FailureRecord {
                    error: message.clone(),
                    at: self.clock.now(),
                    attempt: job.attempts_made,
                };
                let audit = self
                    .audits
                    .record_attempt_failure(&key, failure, code, terminal)
                    .await?;

                if terminal {
                    error!(
                        idempotency_key = %key,
                        error_code = %code,
                        attempts = job.attempts_made,
                        error = %message,
                        "Action failed; job dead-lettered"
                    );
                    self.events.failed(&audit).await;
                    Ok(WorkOutcome::Failed(key))
                } else {
                    warn!(
                        idempotency_key = %key,
                        error_code = %code,
                        attempt = job.attempts_made,
                        error = %message,
                        "Action attempt failed; will retry"
                    );
                    Ok(WorkOutcome::Retrying(key))
                }
            }
        }
    }

    /// Runs until no job is due
    pub async fn drain(&self) -> Result<Vec<WorkOutcome>, ActionError> {
        let mut outcomes = Vec::new();
        loop {
            match self.run_once().await? {
                WorkOutcome::Idle => return Ok(outcomes),
                other => outcomes.push(other),
            }
        }
    }

    /// Polls with `concurrency` loops until `shutdown` flips to `true`
    pub async fn run(
        self: Arc<Self>,
        concurrency: usize,
        poll_interval: StdDuration,
        shutdown: watch::Receiver<bool>,
    ) {
        let loops = (0..concurrency.max(1)).map(|slot| {
            let worker = Arc::clone(&self);
            let mut shutdown = shutdown.clone();
            tokio::spawn(async move {
                info!(slot, "Action worker loop started");
                while !*shutdown.borrow() {
                    match worker.run_once().await {
                        Ok(WorkOutcome::Idle) => {
                            if let Err(e) = worker.queue.requeue_stalled().await {
                                error!(slot, error = %e, "Stalled job sweep failed");
                            }
                            tokio::select! {
                                _ = tokio::time::sleep(poll_interval) => {}
                                changed = shutdown.changed() => {
                                    if changed.is_err() {
                                        break;
                                    }
                                }
                            }
                        }
                        Ok(_) => {}
                        Err(e) => {
                            error!(slot, error = %e, "Worker iteration failed");
                            tokio::time::sleep(poll_interval).await;
                        }
                    }
                }
                info!(slot, "Action worker loop stopped");
            })
        });

        for result in futures_util::future::join_all(loops).await {
            if let Err(e) = result {
                error!(error = %e, "Action worker loop panicked");
            }
        }
    }
}
