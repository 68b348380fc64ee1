//! Back-office core - API Server Binary
//!
//! Starts the HTTP API and the action queue worker in one process.
//!
//! # Usage
//!
//! ```bash
//! # Run with default configuration (in-memory stores, DRY_RUN)
//! cargo run --bin backoffice-api
//!
//! # Run against PostgreSQL
//! BACKOFFICE_DATABASE_URL=postgres://... BACKOFFICE_PORT=8080 cargo run --bin backoffice-api
//! ```
//!
//! # Environment Variables
//!
//! * `BACKOFFICE_HOST` / `BACKOFFICE_PORT` - Listen address (default: 0.0.0.0:8080)
//! * `BACKOFFICE_DATABASE_URL` - PostgreSQL for action audits and leases (optional)
//! * `BACKOFFICE_OPERATING_MODE` - DRY_RUN, LIVE_PULL or LIVE_ALL (default: DRY_RUN)
//! * `BACKOFFICE_LOG_LEVEL` - Log level: trace, debug, info, warn, error (default: info)
//! * `BACKOFFICE_LOG_JSON` - Emit JSON log lines (default: false)
//!
//! See `BackofficeConfig` for the full list.

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use core_kernel::{Clock, SystemClock};
use domain_actions::{
    ActionAuditStore, ActionEventSink, ActionExecutor, ActionHandler, ActionWorker, GatewayDirectory, JobQueue,
    LabelRepository, LabelStore, LeaseProvider, MemoryActionAuditStore, MemoryJobQueue, MemoryLabelRepository,
    MemoryLeaseProvider, MemoryObjectStorage, MemoryOrderBook, ObjectStorage, OrderBook,
};
use domain_fintech::{EventLog, JsonlDiary, MemoryLedgerStore};
use infra_db::{create_pool_from_url, run_migrations, PgActionAuditStore, PgLeaseProvider};
use interface_api::{config::BackofficeConfig, create_router, events::EventLogActionSink, AppState};

const WORKER_POLL_INTERVAL: StdDuration = StdDuration::from_millis(500);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = BackofficeConfig::from_env().context("loading configuration")?;

    init_tracing(&config.log_level, config.log_json);

    tracing::info!(
        host = %config.host,
        port = %config.port,
        mode = ?config.operating_mode,
        "Starting back-office API server"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let event_log = Arc::new(EventLog::with_standard_handlers(
        Arc::new(MemoryLedgerStore::new()),
        clock.clone(),
        config.operating_mode,
        config.matching_config(),
        Arc::new(JsonlDiary::new(&config.edge_case_diary_path)),
    ));

    let pool = match &config.database_url {
        Some(url) => {
            tracing::info!("Connecting to database...");
            let pool = create_pool_from_url(url).await.context("connecting to database")?;
            run_migrations(&pool).await.context("running migrations")?;
            Some(pool)
        }
        None => {
            tracing::warn!("No database configured; action audits and leases are in-memory");
            None
        }
    };

    let (audits, leases): (Arc<dyn ActionAuditStore>, Arc<dyn LeaseProvider>) = match &pool {
        Some(pool) => (
            Arc::new(PgActionAuditStore::new(pool.clone())),
            Arc::new(PgLeaseProvider::new(pool.clone(), clock.clone())),
        ),
        None => (
            Arc::new(MemoryActionAuditStore::new()),
            Arc::new(MemoryLeaseProvider::new(clock.clone())),
        ),
    };
    let queue: Arc<dyn JobQueue> = Arc::new(MemoryJobQueue::new(config.queue_config(), clock.clone()));

    // Marketplace gateways are registered by the deployment; an unregistered
    // marketplace fails its actions with E_CONFIG_MISSING.
    let label_store = Arc::new(LabelStore::new(
        Arc::new(MemoryObjectStorage::new()) as Arc<dyn ObjectStorage>,
        Arc::new(MemoryLabelRepository::new()) as Arc<dyn LabelRepository>,
        clock.clone(),
    ));
    let handler = Arc::new(ActionHandler::new(
        GatewayDirectory::new(),
        Arc::new(MemoryOrderBook::new()) as Arc<dyn OrderBook>,
        label_store,
        clock.clone(),
    ));
    let events: Arc<dyn ActionEventSink> = Arc::new(EventLogActionSink::new(event_log.clone()));

    let executor = Arc::new(ActionExecutor::new(
        audits.clone(),
        leases,
        queue.clone(),
        handler.clone(),
        events.clone(),
        clock.clone(),
        config.executor_config(),
    ));
    let worker = Arc::new(ActionWorker::new(queue.clone(), audits, handler, events, clock));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker_handle = tokio::spawn(worker.run(config.worker_concurrency, WORKER_POLL_INTERVAL, shutdown_rx));

    let mut state = AppState::new(executor, queue, event_log, &config);
    if let Some(pool) = pool {
        state = state.with_pool(pool);
    }
    let app = create_router(state);

    let addr: SocketAddr = config.server_addr().parse().context("parsing listen address")?;
    tracing::info!(%addr, "Server listening");

    let listener = TcpListener::bind(addr).await.context("binding listener")?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    // Let in-flight jobs finish before exiting
    shutdown_tx.send(true).ok();
    if let Err(e) = worker_handle.await {
        tracing::error!(error = %e, "Action worker task failed");
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Initializes the tracing subscriber for structured logging.
///
/// `RUST_LOG` wins over the configured level when set.
fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init();
    }
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
