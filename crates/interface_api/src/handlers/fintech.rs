//! Reconciliation and company health handlers

use axum::{
    extract::{Path, State},
    Json,
};
use tracing::{info, warn};
use uuid::Uuid;

use core_kernel::{BankStatementId, CompanyId};

use crate::dto::fintech::{CompanyHealthResponse, ReconcileRequest, ReconcileResponse};
use crate::{error::ApiError, AppState};

/// Reconciles a bank statement against the company's open receivables
pub async fn reconcile_statement(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ReconcileRequest>,
) -> Result<Json<ReconcileResponse>, ApiError> {
    let company_id = CompanyId::from_uuid(body.company_id);
    let outcome = state
        .reconciliation
        .reconcile_statement(company_id, BankStatementId::from_uuid(id))
        .await?;

    match &outcome {
        Some(o) => info!(statement_id = %id, %company_id, status = o.status.as_str(), "Statement reconciled"),
        None => info!(statement_id = %id, %company_id, "Statement already reconciled"),
    }
    Ok(Json(ReconcileResponse {
        statement_id: id,
        already_matched: outcome.is_none(),
        outcome,
    }))
}

/// Runs the safety breaker and returns the control-tower snapshot
pub async fn company_health(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CompanyHealthResponse>, ApiError> {
    let company_id = CompanyId::from_uuid(id);
    let healthy = state.breaker.check_health(company_id).await?;
    if !healthy {
        warn!(%company_id, "Safety breaker is tripped");
    }
    let metrics = state.metrics.snapshot(company_id).await?;

    Ok(Json(CompanyHealthResponse {
        company_id: id,
        healthy,
        metrics,
    }))
}
