//! Marketplace action handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::info;

use domain_actions::{ActionOutcome, ActionStatus};

use crate::dto::actions::{ActionStatusResponse, ExecuteActionRequest};
use crate::{error::ApiError, AppState};

/// Executes an action, or returns the cached result for a known key
///
/// `202 Accepted` while the action is still pending (queued or held by
/// another caller), `200 OK` once it is terminal.
pub async fn execute_action(
    State(state): State<AppState>,
    Json(body): Json<ExecuteActionRequest>,
) -> Result<(StatusCode, Json<ActionOutcome>), ApiError> {
    let request = body.into_request()?;
    info!(
        idempotency_key = %request.idempotency_key,
        company_id = %request.company_id,
        marketplace = %request.marketplace,
        action = %request.action,
        "Action requested"
    );

    let outcome = state.executor.execute(request).await?;
    let status = match outcome.status {
        ActionStatus::Pending => StatusCode::ACCEPTED,
        ActionStatus::Success | ActionStatus::Failed => StatusCode::OK,
    };
    Ok((status, Json(outcome)))
}

/// Polls an action's audit row
pub async fn get_action(
    State(state): State<AppState>,
    Path(idempotency_key): Path<String>,
) -> Result<Json<ActionStatusResponse>, ApiError> {
    let audit = state
        .executor
        .status(&idempotency_key)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("action {idempotency_key}")))?;
    Ok(Json(audit.into()))
}
