//! Action audit persistence
//!
//! One row per idempotency key. The row is the exactly-once *result*: once
//! it reaches `SUCCESS` with a response, nothing resets it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{ActionError, ActionErrorCode};
use crate::model::{ActionAudit, ActionRequest, ActionStatus, FailureRecord};

/// Result of claiming a row for execution
#[derive(Debug, Clone, PartialEq)]
pub enum BeginOutcome {
    /// Row is `PENDING` and the caller should run the action
    Started(ActionAudit),
    /// A cached success exists; do not call the provider
    AlreadySucceeded(ActionAudit),
}

#[async_trait]
pub trait ActionAuditStore: Send + Sync {
    async fn find(&self, idempotency_key: &str) -> Result<Option<ActionAudit>, ActionError>;

    /// Create-or-reset to `PENDING`, leaving a cached success untouched
    async fn begin(&self, request: &ActionRequest, now: DateTime<Utc>) -> Result<BeginOutcome, ActionError>;

    /// Inserts a `PENDING` row unless one exists; `true` when this call created it
    ///
    /// A lost unique-key race reads back the winner's row.
    async fn insert_if_absent(
        &self,
        request: &ActionRequest,
        now: DateTime<Utc>,
    ) -> Result<(ActionAudit, bool), ActionError>;

    async fn complete(
        &self,
        idempotency_key: &str,
        response: Value,
        now: DateTime<Utc>,
    ) -> Result<ActionAudit, ActionError>;

    async fn fail(
        &self,
        idempotency_key: &str,
        code: ActionErrorCode,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<ActionAudit, ActionError>;

    /// Appends a worker failure; the row stays `PENDING` unless `terminal`
    async fn record_attempt_failure(
        &self,
        idempotency_key: &str,
        failure: FailureRecord,
        code: ActionErrorCode,
        terminal: bool,
    ) -> Result<ActionAudit, ActionError>;

    async fn set_job(&self, idempotency_key: &str, job_id: &str, now: DateTime<Utc>) -> Result<(), ActionError>;

    async fn count(&self) -> Result<usize, ActionError>;
}

/// Applies the `begin` upsert rules to an existing row
pub fn reset_for_begin(audit: &mut ActionAudit, request: &ActionRequest, now: DateTime<Utc>) -> bool {
    if audit.has_cached_result() {
        return false;
    }
    audit.status = ActionStatus::Pending;
    audit.error_code = None;
    audit.error_message = None;
    audit.request_payload = request.payload.clone();
    audit.updated_at = now;
    true
}

/// Applies a worker failure to a row
pub fn apply_attempt_failure(audit: &mut ActionAudit, failure: FailureRecord, code: ActionErrorCode, terminal: bool) {
    audit.retry_count += 1;
    audit.error_code = Some(code);
    audit.error_message = Some(failure.error.clone());
    audit.updated_at = failure.at;
    audit.status = if terminal {
        ActionStatus::Failed
    } else {
        ActionStatus::Pending
    };
    audit.failure_history.push(failure);
}

#[derive(Default)]
pub struct MemoryActionAuditStore {
    rows: Mutex<HashMap<String, ActionAudit>>,
}

impl MemoryActionAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn update<F>(&self, idempotency_key: &str, f: F) -> Result<ActionAudit, ActionError>
    where
        F: FnOnce(&mut ActionAudit),
    {
        let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        let audit = rows
            .get_mut(idempotency_key)
            .ok_or_else(|| ActionError::AuditNotFound(idempotency_key.to_string()))?;
        f(audit);
        Ok(audit.clone())
    }
}

#[async_trait]
impl ActionAuditStore for MemoryActionAuditStore {
    async fn find(&self, idempotency_key: &str) -> Result<Option<ActionAudit>, ActionError> {
        let rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        Ok(rows.get(idempotency_key).cloned())
    }

    async fn begin(&self, request: &ActionRequest, now: DateTime<Utc>) -> Result<BeginOutcome, ActionError> {
        let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        let audit = match rows.entry(request.idempotency_key.clone()) {
            Entry::Vacant(slot) => {
                let audit = slot.insert(ActionAudit::pending(request, now));
                return Ok(BeginOutcome::Started(audit.clone()));
            }
            Entry::Occupied(slot) => slot.into_mut(),
        };
        if !reset_for_begin(audit, request, now) {
            return Ok(BeginOutcome::AlreadySucceeded(audit.clone()));
        }
        Ok(BeginOutcome::Started(audit.clone()))
    }

    async fn insert_if_absent(
        &self,
        request: &ActionRequest,
        now: DateTime<Utc>,
    ) -> Result<(ActionAudit, bool), ActionError> {
        let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = rows.get(&request.idempotency_key) {
            return Ok((existing.clone(), false));
        }
        let audit = ActionAudit::pending(request, now);
        rows.insert(request.idempotency_key.clone(), audit.clone());
        Ok((audit, true))
    }

    async fn complete(
        &self,
        idempotency_key: &str,
        response: Value,
        now: DateTime<Utc>,
    ) -> Result<ActionAudit, ActionError> {
        self.update(idempotency_key, |audit| {
            audit.status = ActionStatus::Success;
            audit.response_payload = Some(response);
            audit.error_code = None;
            audit.error_message = None;
            audit.updated_at = now;
        })
    }

    async fn fail(
        &self,
        idempotency_key: &str,
        code: ActionErrorCode,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<ActionAudit, ActionError> {
        self.update(idempotency_key, |audit| {
            audit.status = ActionStatus::Failed;
            audit.error_code = Some(code);
            audit.error_message = Some(message.to_string());
            audit.updated_at = now;
        })
    }

    async fn record_attempt_failure(
        &self,
        idempotency_key: &str,
        failure: FailureRecord,
        code: ActionErrorCode,
        terminal: bool,
    ) -> Result<ActionAudit, ActionError> {
        self.update(idempotency_key, |audit| apply_attempt_failure(audit, failure, code, terminal))
    }

    async fn set_job(&self, idempotency_key: &str, job_id: &str, now: DateTime<Utc>) -> Result<(), ActionError> {
        self.update(idempotency_key, |audit| {
            audit.job_id = Some(job_id.to_string());
            audit.updated_at = now;
        })?;
        Ok(())
    }

    async fn count(&self) -> Result<usize, ActionError> {
        Ok(self.rows.lock().unwrap_or_else(|e| e.into_inner()).len())
    }
}
