//! Health check handlers

use axum::{extract::State, Json};
use serde::Serialize;

use domain_actions::QueueStats;

use crate::{error::ApiError, AppState};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessResponse {
    pub status: String,
    pub version: String,
    pub database: String,
    pub queue: QueueStats,
}

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness check (database, when configured, and queue)
pub async fn readiness_check(State(state): State<AppState>) -> Result<Json<ReadinessResponse>, ApiError> {
    let database = match &state.pool {
        Some(pool) => {
            infra_db::ping(pool).await?;
            "up"
        }
        None => "in-memory",
    };
    let queue = state.queue.stats().await?;

    Ok(Json(ReadinessResponse {
        status: "ready".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: database.to_string(),
        queue,
    }))
}
