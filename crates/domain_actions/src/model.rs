//! Action requests, audit rows and outcomes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use core_kernel::{ActionAuditId, CompanyId, Marketplace};

use crate::error::{ActionError, ActionErrorCode};

/// Longest idempotency key accepted
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

/// Named operation against a marketplace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    RefreshStatus,
    #[serde(rename = "PRINT_LABEL_A4")]
    PrintLabelA4,
    ChangeCargo,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::RefreshStatus => "REFRESH_STATUS",
            ActionKind::PrintLabelA4 => "PRINT_LABEL_A4",
            ActionKind::ChangeCargo => "CHANGE_CARGO",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = ActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "REFRESH_STATUS" => Ok(ActionKind::RefreshStatus),
            "PRINT_LABEL_A4" => Ok(ActionKind::PrintLabelA4),
            "CHANGE_CARGO" => Ok(ActionKind::ChangeCargo),
            other => Err(ActionError::validation(format!("unsupported action: {other}"))),
        }
    }
}

/// A caller's request to run an action exactly once per idempotency key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    pub idempotency_key: String,
    pub company_id: CompanyId,
    pub marketplace: Marketplace,
    pub action: ActionKind,
    pub order_number: String,
    #[serde(default)]
    pub payload: Value,
}

impl ActionRequest {
    pub fn new(
        idempotency_key: impl Into<String>,
        company_id: CompanyId,
        marketplace: Marketplace,
        action: ActionKind,
        order_number: impl Into<String>,
    ) -> Self {
        Self {
            idempotency_key: idempotency_key.into(),
            company_id,
            marketplace,
            action,
            order_number: order_number.into(),
            payload: Value::Null,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// String field from the payload, ignoring blanks
    pub fn payload_str(&self, field: &str) -> Option<String> {
        match self.payload.get(field)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<(), ActionError> {
        if self.idempotency_key.trim().is_empty() {
            return Err(ActionError::validation("idempotencyKey is required"));
        }
        if self.idempotency_key.len() > MAX_IDEMPOTENCY_KEY_LEN {
            return Err(ActionError::validation(format!(
                "idempotencyKey longer than {MAX_IDEMPOTENCY_KEY_LEN} characters"
            )));
        }
        if self.order_number.trim().is_empty() {
            return Err(ActionError::validation("orderNumber is required"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionStatus {
    Pending,
    Success,
    Failed,
}

impl ActionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::Pending => "PENDING",
            ActionStatus::Success => "SUCCESS",
            ActionStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ActionStatus::Pending)
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionStatus {
    type Err = ActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(ActionStatus::Pending),
            "SUCCESS" => Ok(ActionStatus::Success),
            "FAILED" => Ok(ActionStatus::Failed),
            other => Err(ActionError::storage(format!("unknown action status: {other}"))),
        }
    }
}

/// One failed worker attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub error: String,
    pub at: DateTime<Utc>,
    pub attempt: u32,
}

/// Durable record of an action, one row per idempotency key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionAudit {
    pub id: ActionAuditId,
    pub idempotency_key: String,
    pub company_id: CompanyId,
    pub marketplace: Marketplace,
    pub action: ActionKind,
    pub order_number: String,
    pub request_payload: Value,
    pub status: ActionStatus,
    pub response_payload: Option<Value>,
    pub error_code: Option<ActionErrorCode>,
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub failure_history: Vec<FailureRecord>,
    pub job_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ActionAudit {
    /// New `PENDING` row for a request
    pub fn pending(request: &ActionRequest, now: DateTime<Utc>) -> Self {
        Self {
            id: ActionAuditId::new_v7(),
            idempotency_key: request.idempotency_key.clone(),
            company_id: request.company_id,
            marketplace: request.marketplace,
            action: request.action,
            order_number: request.order_number.clone(),
            request_payload: request.payload.clone(),
            status: ActionStatus::Pending,
            response_payload: None,
            error_code: None,
            error_message: None,
            retry_count: 0,
            failure_history: Vec::new(),
            job_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A successful row with its cached response
    pub fn has_cached_result(&self) -> bool {
        self.status == ActionStatus::Success && self.response_payload.is_some()
    }

    /// Rebuilds the request this row was created from
    pub fn to_request(&self) -> ActionRequest {
        ActionRequest {
            idempotency_key: self.idempotency_key.clone(),
            company_id: self.company_id,
            marketplace: self.marketplace,
            action: self.action,
            order_number: self.order_number.clone(),
            payload: self.request_payload.clone(),
        }
    }
}

/// What a caller sees for an idempotency key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionOutcome {
    pub idempotency_key: String,
    pub status: ActionStatus,
    pub audit_id: Option<ActionAuditId>,
    pub result: Option<Value>,
    pub error_code: Option<ActionErrorCode>,
    pub error_message: Option<String>,
}

impl ActionOutcome {
    /// In flight; poll again later
    pub fn pending(idempotency_key: impl Into<String>, audit_id: Option<ActionAuditId>) -> Self {
        Self {
            idempotency_key: idempotency_key.into(),
            status: ActionStatus::Pending,
            audit_id,
            result: None,
            error_code: None,
            error_message: None,
        }
    }

    pub fn from_audit(audit: &ActionAudit) -> Self {
        Self {
            idempotency_key: audit.idempotency_key.clone(),
            status: audit.status,
            audit_id: Some(audit.id),
            result: audit.response_payload.clone(),
            error_code: audit.error_code,
            error_message: audit.error_message.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> ActionRequest {
        ActionRequest::new("k-1", CompanyId::new(), Marketplace::N11, ActionKind::PrintLabelA4, "1001")
    }

    #[test]
    fn test_validate() {
        assert!(request().validate().is_ok());

        let mut blank = request();
        blank.idempotency_key = "  ".into();
        assert_eq!(blank.validate().unwrap_err().code(), ActionErrorCode::Validation);

        let mut long = request();
        long.idempotency_key = "x".repeat(MAX_IDEMPOTENCY_KEY_LEN + 1);
        assert!(long.validate().is_err());
    }

    #[test]
    fn test_payload_str() {
        let req = request().with_payload(json!({
            "shipmentPackageId": 778899,
            "labelShipmentPackageId": " ",
            "cargoProviderCode": "YKMP",
        }));
        assert_eq!(req.payload_str("shipmentPackageId").as_deref(), Some("778899"));
        assert_eq!(req.payload_str("labelShipmentPackageId"), None);
        assert_eq!(req.payload_str("cargoProviderCode").as_deref(), Some("YKMP"));
        assert_eq!(req.payload_str("missing"), None);
    }

    #[test]
    fn test_action_wire_names() {
        assert_eq!(serde_json::to_string(&ActionKind::PrintLabelA4).unwrap(), "\"PRINT_LABEL_A4\"");
        assert_eq!("CHANGE_CARGO".parse::<ActionKind>().unwrap(), ActionKind::ChangeCargo);
        assert!("DELETE_ORDER".parse::<ActionKind>().is_err());
    }
}
