//! Append-only audit trail for state-mutating decisions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use core_kernel::{AuditRecordId, CompanyId};

/// Audit actions written by the financial core
pub mod actions {
    pub const BANK_CONNECTION_STATUS_CHANGED: &str = "BANK_CONNECTION_STATUS_CHANGED";
    pub const MATCHING_RULE_LEARNED: &str = "MATCHING_RULE_LEARNED";
    pub const SAFETY_BREAKER_TRIPPED: &str = "SAFETY_BREAKER_TRIPPED";
    pub const SAFETY_BREAKER_REARMED: &str = "SAFETY_BREAKER_REARMED";
    pub const AUTOPILOT_DISABLED: &str = "AUTOPILOT_DISABLED";
}

/// One audit row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub id: AuditRecordId,
    pub company_id: CompanyId,
    pub who: String,
    pub action: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
    pub details: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(
        company_id: CompanyId,
        who: impl Into<String>,
        action: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AuditRecordId::new_v7(),
            company_id,
            who: who.into(),
            action: action.into(),
            before: None,
            after: None,
            details: None,
            created_at: now,
        }
    }

    pub fn change(mut self, before: Value, after: Value) -> Self {
        self.before = Some(before);
        self.after = Some(after);
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}
