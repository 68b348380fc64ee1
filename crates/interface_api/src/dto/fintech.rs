//! Reconciliation and health DTOs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use domain_fintech::{MetricsSnapshot, ReconciliationOutcome};

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileRequest {
    pub company_id: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileResponse {
    pub statement_id: Uuid,
    /// The statement had been reconciled before; nothing was posted
    pub already_matched: bool,
    pub outcome: Option<ReconciliationOutcome>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyHealthResponse {
    pub company_id: Uuid,
    /// Autonomous financial actions may continue
    pub healthy: bool,
    pub metrics: MetricsSnapshot,
}
