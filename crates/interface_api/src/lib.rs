//! HTTP API Layer
//!
//! REST surface of the back-office core using Axum: marketplace actions,
//! dead-letter administration, statement reconciliation and company health.
//!
//! # Architecture
//!
//! - **Handlers**: Request handlers per area (actions, admin, fintech, health)
//! - **Middleware**: Request ids and request logging
//! - **DTOs**: Request/Response data transfer objects
//! - **Error Handling**: Consistent error responses
//!
//! # Example
//!
//! ```rust,ignore
//! use interface_api::{create_router, AppState};
//!
//! let state = AppState::new(executor, queue, event_log, &config);
//! let app = create_router(state);
//! axum::serve(listener, app).await?;
//! ```

pub mod config;
pub mod dto;
pub mod error;
pub mod events;
pub mod handlers;
pub mod middleware;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use domain_actions::{ActionExecutor, JobQueue};
use domain_fintech::{EventLog, ReconciliationMetrics, SafetyBreaker, SettlementReconciliationEngine};

use crate::config::BackofficeConfig;
use crate::handlers::{actions, admin, fintech, health};
use crate::middleware::{log_requests, REQUEST_ID_HEADER};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub executor: Arc<ActionExecutor>,
    pub queue: Arc<dyn JobQueue>,
    pub reconciliation: Arc<SettlementReconciliationEngine>,
    pub breaker: Arc<SafetyBreaker>,
    pub metrics: Arc<ReconciliationMetrics>,
    /// Present when audits and leases live in PostgreSQL
    pub pool: Option<PgPool>,
}

impl AppState {
    /// Builds the fintech engines over `event_log` with thresholds from `config`
    pub fn new(
        executor: Arc<ActionExecutor>,
        queue: Arc<dyn JobQueue>,
        event_log: Arc<EventLog>,
        config: &BackofficeConfig,
    ) -> Self {
        Self {
            executor,
            queue,
            reconciliation: Arc::new(SettlementReconciliationEngine::new(
                event_log.clone(),
                config.reconciliation_config(),
            )),
            breaker: Arc::new(SafetyBreaker::new(event_log.clone(), config.breaker_thresholds())),
            metrics: Arc::new(ReconciliationMetrics::new(event_log)),
            pool: None,
        }
    }

    pub fn with_pool(mut self, pool: PgPool) -> Self {
        self.pool = Some(pool);
        self
    }
}

/// Creates the main API router
pub fn create_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check));

    let action_routes = Router::new()
        .route("/", post(actions::execute_action))
        .route("/:idempotency_key", get(actions::get_action));

    let admin_routes = Router::new()
        .route("/dlq", get(admin::list_dead_letters))
        .route("/dlq/replay", post(admin::replay_dead_letters));

    let fintech_routes = Router::new()
        .route("/statements/:id/reconcile", post(fintech::reconcile_statement))
        .route("/companies/:id/health", get(fintech::company_health));

    let api_routes = Router::new()
        .nest("/actions", action_routes)
        .nest("/admin", admin_routes)
        .nest("/fintech", fintech_routes);

    Router::new()
        .merge(public_routes)
        .nest("/api/v1", api_routes)
        .layer(axum_middleware::from_fn(log_requests))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::new(REQUEST_ID_HEADER.clone()))
        .layer(SetRequestIdLayer::new(REQUEST_ID_HEADER.clone(), MakeRequestUuid))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
