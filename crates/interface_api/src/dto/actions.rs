//! Action DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use validator::Validate;

use core_kernel::{CompanyId, Marketplace};
use domain_actions::{ActionAudit, ActionErrorCode, ActionKind, ActionRequest, ActionStatus, FailureRecord};

use crate::error::ApiError;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteActionRequest {
    #[validate(length(min = 1, max = 255))]
    pub idempotency_key: String,
    pub company_id: Uuid,
    #[validate(length(min = 1))]
    pub marketplace: String,
    #[validate(length(min = 1))]
    pub action: String,
    #[validate(length(min = 1))]
    pub order_number: String,
    #[serde(default)]
    pub payload: Option<Value>,
}

impl ExecuteActionRequest {
    /// Validates and converts into a domain request
    pub fn into_request(self) -> Result<ActionRequest, ApiError> {
        self.validate()?;
        let marketplace: Marketplace = self
            .marketplace
            .parse()
            .map_err(|e: core_kernel::CoreError| ApiError::Validation(e.to_string()))?;
        let action: ActionKind = self.action.parse()?;

        let request = ActionRequest::new(
            self.idempotency_key,
            CompanyId::from_uuid(self.company_id),
            marketplace,
            action,
            self.order_number,
        );
        Ok(match self.payload {
            Some(payload) => request.with_payload(payload),
            None => request,
        })
    }
}

/// Poll view of an action's audit row
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionStatusResponse {
    pub idempotency_key: String,
    pub audit_id: Uuid,
    pub marketplace: Marketplace,
    pub action: ActionKind,
    pub order_number: String,
    pub status: ActionStatus,
    pub result: Option<Value>,
    pub error_code: Option<ActionErrorCode>,
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub failure_history: Vec<FailureRecord>,
    pub job_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<ActionAudit> for ActionStatusResponse {
    fn from(audit: ActionAudit) -> Self {
        Self {
            idempotency_key: audit.idempotency_key,
            audit_id: *audit.id.as_uuid(),
            marketplace: audit.marketplace,
            action: audit.action,
            order_number: audit.order_number,
            status: audit.status,
            result: audit.response_payload,
            error_code: audit.error_code,
            error_message: audit.error_message,
            retry_count: audit.retry_count,
            failure_history: audit.failure_history,
            job_id: audit.job_id,
            updated_at: audit.updated_at,
        }
    }
}
