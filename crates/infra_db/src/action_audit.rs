//! PostgreSQL action audit store
//!
//! One `action_audits` row per idempotency key. The `begin` upsert resets a
//! failed or pending row in a single statement and leaves a cached success
//! alone, so concurrent callers racing on the unique key all see a
//! consistent row.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::{debug, instrument};
use uuid::Uuid;

use core_kernel::{ActionAuditId, CompanyId, Marketplace};
use domain_actions::{
    ActionAudit, ActionAuditStore, ActionError, ActionErrorCode, ActionKind, ActionRequest, ActionStatus,
    BeginOutcome, FailureRecord,
};

use crate::error::DatabaseError;

const COLUMNS: &str = "id, idempotency_key, company_id, marketplace, action, order_number, request_payload, \
     status, response_payload, error_code, error_message, retry_count, failure_history, job_id, \
     created_at, updated_at";

#[derive(Debug, Clone)]
pub struct PgActionAuditStore {
    pool: PgPool,
}

impl PgActionAuditStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, idempotency_key: &str) -> Result<Option<ActionAudit>, DatabaseError> {
        let sql = format!("SELECT {COLUMNS} FROM action_audits WHERE idempotency_key = $1");
        sqlx::query(&sql)
            .bind(idempotency_key)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| row_to_audit(&row))
            .transpose()
    }

    async fn insert_returning(
        &self,
        request: &ActionRequest,
        now: DateTime<Utc>,
        on_conflict: &str,
    ) -> Result<Option<ActionAudit>, DatabaseError> {
        let sql = format!(
            "INSERT INTO action_audits (id, idempotency_key, company_id, marketplace, action, order_number, \
             request_payload, status, retry_count, failure_history, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, 'PENDING', 0, '[]'::jsonb, $8, $8) \
             ON CONFLICT (idempotency_key) {on_conflict} \
             RETURNING {COLUMNS}"
        );
        sqlx::query(&sql)
            .bind(Uuid::from(ActionAuditId::new_v7()))
            .bind(&request.idempotency_key)
            .bind(Uuid::from(request.company_id))
            .bind(request.marketplace.code())
            .bind(request.action.as_str())
            .bind(&request.order_number)
            .bind(&request.payload)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| row_to_audit(&row))
            .transpose()
    }

    async fn update_returning(
        &self,
        idempotency_key: &str,
        query: sqlx::query::Query<'_, sqlx::Postgres, sqlx::postgres::PgArguments>,
    ) -> Result<ActionAudit, ActionError> {
        let row = query
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from)?
            .ok_or_else(|| ActionError::AuditNotFound(idempotency_key.to_string()))?;
        Ok(row_to_audit(&row)?)
    }
}

#[async_trait]
impl ActionAuditStore for PgActionAuditStore {
    async fn find(&self, idempotency_key: &str) -> Result<Option<ActionAudit>, ActionError> {
        Ok(self.fetch(idempotency_key).await?)
    }

    #[instrument(skip(self, request), fields(idempotency_key = %request.idempotency_key))]
    async fn begin(&self, request: &ActionRequest, now: DateTime<Utc>) -> Result<BeginOutcome, ActionError> {
        let reset = "DO UPDATE SET status = 'PENDING', error_code = NULL, error_message = NULL, \
                     request_payload = EXCLUDED.request_payload, updated_at = EXCLUDED.updated_at \
                     WHERE action_audits.status <> 'SUCCESS' OR action_audits.response_payload IS NULL";
        if let Some(audit) = self.insert_returning(request, now, reset).await? {
            return Ok(BeginOutcome::Started(audit));
        }
        // The WHERE clause skipped the update: a cached success exists
        debug!("Action already succeeded");
        let audit = self
            .fetch(&request.idempotency_key)
            .await?
            .ok_or_else(|| ActionError::AuditNotFound(request.idempotency_key.clone()))?;
        Ok(BeginOutcome::AlreadySucceeded(audit))
    }

    async fn insert_if_absent(
        &self,
        request: &ActionRequest,
        now: DateTime<Utc>,
    ) -> Result<(ActionAudit, bool), ActionError> {
        if let Some(audit) = self.insert_returning(request, now, "DO NOTHING").await? {
            return Ok((audit, true));
        }
        let existing = self
            .fetch(&request.idempotency_key)
            .await?
            .ok_or_else(|| ActionError::AuditNotFound(request.idempotency_key.clone()))?;
        Ok((existing, false))
    }

    async fn complete(
        &self,
        idempotency_key: &str,
        response: Value,
        now: DateTime<Utc>,
    ) -> Result<ActionAudit, ActionError> {
        let sql = format!(
            "UPDATE action_audits SET status = 'SUCCESS', response_payload = $2, error_code = NULL, \
             error_message = NULL, updated_at = $3 WHERE idempotency_key = $1 RETURNING {COLUMNS}"
        );
        let query = sqlx::query(&sql).bind(idempotency_key).bind(response).bind(now);
        self.update_returning(idempotency_key, query).await
    }

    async fn fail(
        &self,
        idempotency_key: &str,
        code: ActionErrorCode,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<ActionAudit, ActionError> {
        let sql = format!(
            "UPDATE action_audits SET status = 'FAILED', error_code = $2, error_message = $3, updated_at = $4 \
             WHERE idempotency_key = $1 RETURNING {COLUMNS}"
        );
        let query = sqlx::query(&sql)
            .bind(idempotency_key)
            .bind(code.as_str())
            .bind(message)
            .bind(now);
        self.update_returning(idempotency_key, query).await
    }

    async fn record_attempt_failure(
        &self,
        idempotency_key: &str,
        failure: FailureRecord,
        code: ActionErrorCode,
        terminal: bool,
    ) -> Result<ActionAudit, ActionError> {
        let sql = format!(
            "UPDATE action_audits SET retry_count = retry_count + 1, error_code = $2, error_message = $3, \
             updated_at = $4, status = CASE WHEN $5 THEN 'FAILED' ELSE 'PENDING' END, \
             failure_history = failure_history || jsonb_build_array($6::jsonb) \
             WHERE idempotency_key = $1 RETURNING {COLUMNS}"
        );
        let query = sqlx::query(&sql)
            .bind(idempotency_key)
            .bind(code.as_str())
            .bind(failure.error.clone())
            .bind(failure.at)
            .bind(terminal)
            .bind(Json(failure));
        self.update_returning(idempotency_key, query).await
    }

    async fn set_job(&self, idempotency_key: &str, job_id: &str, now: DateTime<Utc>) -> Result<(), ActionError> {
        let result = sqlx::query("UPDATE action_audits SET job_id = $2, updated_at = $3 WHERE idempotency_key = $1")
            .bind(idempotency_key)
            .bind(job_id)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from)?;
        if result.rows_affected() == 0 {
            return Err(ActionError::AuditNotFound(idempotency_key.to_string()));
        }
        Ok(())
    }

    async fn count(&self) -> Result<usize, ActionError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM action_audits")
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::from)?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

fn row_to_audit(row: &PgRow) -> Result<ActionAudit, DatabaseError> {
    let marketplace: String = row.try_get("marketplace")?;
    let action: String = row.try_get("action")?;
    let status: String = row.try_get("status")?;
    let error_code: Option<String> = row.try_get("error_code")?;
    let retry_count: i32 = row.try_get("retry_count")?;
    let Json(failure_history): Json<Vec<FailureRecord>> = row.try_get("failure_history")?;

    Ok(ActionAudit {
        id: ActionAuditId::from_uuid(row.try_get("id")?),
        idempotency_key: row.try_get("idempotency_key")?,
        company_id: CompanyId::from_uuid(row.try_get("company_id")?),
        marketplace: marketplace
            .parse::<Marketplace>()
            .map_err(|e| DatabaseError::serialization(e.to_string()))?,
        action: action
            .parse::<ActionKind>()
            .map_err(|e| DatabaseError::serialization(e.to_string()))?,
        order_number: row.try_get("order_number")?,
        request_payload: row.try_get("request_payload")?,
        status: status
            .parse::<ActionStatus>()
            .map_err(|e| DatabaseError::serialization(e.to_string()))?,
        response_payload: row.try_get("response_payload")?,
        error_code: error_code
            .map(|c| c.parse::<ActionErrorCode>())
            .transpose()
            .map_err(|e| DatabaseError::serialization(e.to_string()))?,
        error_message: row.try_get("error_message")?,
        retry_count: u32::try_from(retry_count).map_err(|e| DatabaseError::serialization(e.to_string()))?,
        failure_history,
        job_id: row.try_get("job_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
