//! Dead-letter queue administration

use axum::{extract::State, Json};
use tracing::info;

use domain_actions::ReplayReport;

use crate::dto::admin::{DeadLetterView, ReplayRequest};
use crate::{error::ApiError, AppState};

/// Lists dead-lettered jobs
pub async fn list_dead_letters(State(state): State<AppState>) -> Result<Json<Vec<DeadLetterView>>, ApiError> {
    let dead = state.queue.dead_letters().await?;
    Ok(Json(dead.into_iter().map(DeadLetterView::from).collect()))
}

/// Re-enqueues dead-lettered jobs under their original ids
pub async fn replay_dead_letters(
    State(state): State<AppState>,
    Json(body): Json<ReplayRequest>,
) -> Result<Json<ReplayReport>, ApiError> {
    let target = body.into_target()?;
    let report = state.queue.replay(target).await?;
    info!(
        replayed = report.replayed.len(),
        skipped = report.skipped.len(),
        "Dead-letter replay requested"
    );
    Ok(Json(report))
}
