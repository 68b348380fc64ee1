//! Action job queue with dead-letter replay
//!
//! Jobs are keyed by the action's idempotency key, so enqueueing the same
//! key twice while the first job is alive is a no-op. A job that exhausts
//! its attempts, or fails with a non-retryable error, moves to the
//! dead-letter queue. Replay puts a dead-lettered job back under its
//! original id and refuses ids still alive in the main queue.
//!
//! Delivery is at-least-once: a reserved job that is neither acked nor
//! nacked stays in flight until [`JobQueue::requeue_stalled`] returns it.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use core_kernel::Clock;

use crate::error::ActionError;
use crate::model::ActionRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    Fixed,
    Exponential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    /// Total tries per job, the first one included
    pub attempts: u32,
    pub backoff_ms: i64,
    pub backoff: BackoffKind,
    /// How long a reserved job may stay unacknowledged
    pub visibility_timeout_secs: i64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff_ms: 1000,
            backoff: BackoffKind::Exponential,
            visibility_timeout_secs: 300,
        }
    }
}

impl QueueConfig {
    /// Delay before the retry that follows failed attempt `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = match self.backoff {
            BackoffKind::Fixed => 1,
            BackoffKind::Exponential => 1_i64 << attempt.saturating_sub(1).min(20),
        };
        Duration::milliseconds(self.backoff_ms.saturating_mul(factor))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedJob {
    pub id: String,
    pub request: ActionRequest,
    /// Attempts started so far
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub available_at: DateTime<Utc>,
    pub enqueued_at: DateTime<Utc>,
    pub reserved_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", content = "jobId", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnqueueResult {
    Enqueued(String),
    /// A live job already holds this id
    Duplicate(String),
}

impl EnqueueResult {
    pub fn job_id(&self) -> &str {
        match self {
            EnqueueResult::Enqueued(id) | EnqueueResult::Duplicate(id) => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NackOutcome {
    Retrying { attempt: u32, next_at: DateTime<Utc> },
    DeadLettered,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetteredJob {
    pub job: QueuedJob,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReplayTarget {
    Ids(Vec<String>),
    All,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaySkip {
    pub job_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayReport {
    pub replayed: Vec<String>,
    pub skipped: Vec<ReplaySkip>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub waiting: usize,
    pub in_flight: usize,
    pub dead_lettered: usize,
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, request: ActionRequest) -> Result<EnqueueResult, ActionError>;

    /// Takes the next due job and counts the attempt
    async fn reserve(&self) -> Result<Option<QueuedJob>, ActionError>;

    async fn ack(&self, job_id: &str) -> Result<(), ActionError>;

    /// Reports a failed attempt; the queue decides between retry and dead-letter
    async fn nack(&self, job_id: &str, error: &str, retryable: bool) -> Result<NackOutcome, ActionError>;

    /// Returns reserved jobs whose visibility timeout passed to the waiting list
    async fn requeue_stalled(&self) -> Result<usize, ActionError>;

    async fn dead_letters(&self) -> Result<Vec<DeadLetteredJob>, ActionError>;

    async fn replay(&self, target: ReplayTarget) -> Result<ReplayReport, ActionError>;

    async fn stats(&self) -> Result<QueueStats, ActionError>;
}

#[derive(Default)]
struct QueueState {
    waiting: VecDeque<QueuedJob>,
    in_flight: HashMap<String, QueuedJob>,
    dead: BTreeMap<String, DeadLetteredJob>,
}

impl QueueState {
    fn is_live(&self, job_id: &str) -> bool {
        self.in_flight.contains_key(job_id) || self.waiting.iter().any(|j| j.id == job_id)
    }
}

pub struct MemoryJobQueue {
    config: QueueConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<QueueState>,
}

impl MemoryJobQueue {
    pub fn new(config: QueueConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            state: Mutex::new(QueueState::default()),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    fn state(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, request: ActionRequest) -> Result<EnqueueResult, ActionError> {
        let now = self.clock.now();
        let job_id = request.idempotency_key.clone();
        let mut state = self.state();
        if state.is_live(&job_id) || state.dead.contains_key(&job_id) {
            return Ok(EnqueueResult::Duplicate(job_id));
        }
        state.waiting.push_back(QueuedJob {
            id: job_id.clone(),
            request,
            attempts_made: 0,
            max_attempts: self.config.attempts,
            available_at: now,
            enqueued_at: now,
            reserved_at: None,
            last_error: None,
        });
        Ok(EnqueueResult::Enqueued(job_id))
    }

    async fn reserve(&self) -> Result<Option<QueuedJob>, ActionError> {
        let now = self.clock.now();
        let mut state = self.state();
        let Some(pos) = state.waiting.iter().position(|j| j.available_at <= now) else {
            return Ok(None);
        };
        let Some(mut job) = state.waiting.remove(pos) else {
            return Ok(None);
        };
        job.attempts_made += 1;
        job.reserved_at = Some(now);
        state.in_flight.insert(job.id.clone(), job.clone());
        Ok(Some(job))
    }

    async fn ack(&self, job_id: &str) -> Result<(), ActionError> {
        let mut state = self.state();
        state
            .in_flight
            .remove(job_id)
            .map(|_| ())
            .ok_or_else(|| ActionError::Queue(format!("job {job_id} is not in flight")))
    }

    async fn nack(&self, job_id: &str, error: &str, retryable: bool) -> Result<NackOutcome, ActionError> {
        let now = self.clock.now();
        let mut state = self.state();
        let mut job = state
            .in_flight
            .remove(job_id)
            .ok_or_else(|| ActionError::Queue(format!("job {job_id} is not in flight")))?;
        job.last_error = Some(error.to_string());
        job.reserved_at = None;

        if retryable && job.attempts_made < job.max_attempts {
            let next_at = now + self.config.delay_after(job.attempts_made);
            let attempt = job.attempts_made;
            job.available_at = next_at;
            state.waiting.push_back(job);
            return Ok(NackOutcome::Retrying { attempt, next_at });
        }

        warn!(job_id, attempts = job.attempts_made, error, "Job moved to dead-letter queue");
        state.dead.insert(
            job_id.to_string(),
            DeadLetteredJob {
                job,
                error: error.to_string(),
                failed_at: now,
            },
        );
        Ok(NackOutcome::DeadLettered)
    }

    async fn requeue_stalled(&self) -> Result<usize, ActionError> {
        let now = self.clock.now();
        let cutoff = now - Duration::seconds(self.config.visibility_timeout_secs);
        let mut state = self.state();
        let stalled: Vec<String> = state
            .in_flight
            .values()
            .filter(|j| j.reserved_at.is_some_and(|at| at <= cutoff))
            .map(|j| j.id.clone())
            .collect();
        for id in &stalled {
            if let Some(mut job) = state.in_flight.remove(id) {
                job.reserved_at = None;
                job.available_at = now;
                state.waiting.push_back(job);
            }
        }
        Ok(stalled.len())
    }

    async fn dead_letters(&self) -> Result<Vec<DeadLetteredJob>, ActionError> {
        Ok(self.state().dead.values().cloned().collect())
    }

    async fn replay(&self, target: ReplayTarget) -> Result<ReplayReport, ActionError> {
        let now = self.clock.now();
        let mut state = self.state();
        let ids: Vec<String> = match target {
            ReplayTarget::All => state.dead.keys().cloned().collect(),
            ReplayTarget::Ids(ids) => ids,
        };

        let mut report = ReplayReport::default();
        for id in ids {
            if state.is_live(&id) {
                report.skipped.push(ReplaySkip {
                    job_id: id,
                    reason: "job is still in the main queue".into(),
                });
                continue;
            }
            let Some(dead) = state.dead.remove(&id) else {
                report.skipped.push(ReplaySkip {
                    job_id: id,
                    reason: "job is not dead-lettered".into(),
                });
                continue;
            };
            let mut job = dead.job;
            job.attempts_made = 0;
            job.available_at = now;
            job.last_error = None;
            state.waiting.push_back(job);
            report.replayed.push(id);
        }

        info!(
            replayed = report.replayed.len(),
            skipped = report.skipped.len(),
            "Dead-letter replay finished"
        );
        Ok(report)
    }

    async fn stats(&self) -> Result<QueueStats, ActionError> {
        let state = self.state();
        Ok(QueueStats {
            waiting: state.waiting.len(),
            in_flight: state.in_flight.len(),
            dead_lettered: state.dead.len(),
        })
    }
}
