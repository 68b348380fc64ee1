//! Back-office core - Operator CLI
//!
//! ```bash
//! # Replay dead-lettered jobs through a running API
//! backoffice-ops replay-dlq --id trendyol-label-1001 --id trendyol-label-1002
//! backoffice-ops replay-dlq --all --base-url http://10.0.0.5:8080
//!
//! # In-process self checks against scripted collaborators
//! backoffice-ops golden-run
//! backoffice-ops canary --concurrency 50
//! ```

use anyhow::{bail, ensure, Context, Result};
use clap::{Parser, Subcommand};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tracing_subscriber::EnvFilter;

use core_kernel::{CompanyId, Marketplace};
use domain_actions::{ActionAuditStore, ActionKind, ActionStatus, LocalOrder, ReplayReport};
use domain_fintech::{BankSyncEngine, ConfidenceBucket, LedgerTx, OperatingMode};
use interface_api::dto::admin::ReplayRequest;
use test_utils::{
    ActionHarness, ActionRequestBuilder, FakeMarketplaceGateway, FakeTransactionSource, GoldenDataset, LedgerHarness,
    TemporalFixtures,
};

#[derive(Parser)]
#[command(name = "backoffice-ops")]
#[command(about = "Back-office operator tools", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Re-enqueue dead-lettered action jobs under their original ids
    ReplayDlq {
        /// Job id (the action's idempotency key); repeatable
        #[arg(long = "id", conflicts_with = "all", required_unless_present = "all")]
        ids: Vec<String>,

        /// Replay every dead-lettered job
        #[arg(long, default_value_t = false)]
        all: bool,

        /// API base URL
        #[arg(long, default_value = "http://localhost:8080")]
        base_url: String,
    },

    /// Ingest the golden bank dataset twice in DRY_RUN and check the counts
    GoldenRun,

    /// Fire concurrent executions with one idempotency key
    Canary {
        #[arg(long, default_value_t = 20)]
        concurrency: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Commands::ReplayDlq { ids, all, base_url } => replay_dlq(ids, all, &base_url).await,
        Commands::GoldenRun => golden_run().await,
        Commands::Canary { concurrency } => canary(concurrency).await,
    }
}

async fn replay_dlq(job_ids: Vec<String>, all: bool, base_url: &str) -> Result<()> {
    let client = Client::builder()
        .timeout(StdDuration::from_secs(30))
        .build()
        .context("building HTTP client")?;
    let url = format!("{}/api/v1/admin/dlq/replay", base_url.trim_end_matches('/'));

    let response = client
        .post(&url)
        .json(&ReplayRequest { job_ids, all })
        .send()
        .await
        .with_context(|| format!("POST {url}"))?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        bail!("replay failed with HTTP {status}: {body}");
    }

    let report: ReplayReport = response.json().await.context("decoding replay report")?;
    for id in &report.replayed {
        println!("replayed  {id}");
    }
    for skip in &report.skipped {
        println!("skipped   {} ({})", skip.job_id, skip.reason);
    }
    println!("{} replayed, {} skipped", report.replayed.len(), report.skipped.len());
    Ok(())
}

async fn golden_run() -> Result<()> {
    let h = LedgerHarness::new(OperatingMode::DryRun);
    h.seed_rules().await?;
    let connection = h.active_connection("Golden Mock Bank").await?;
    let source = FakeTransactionSource::with_records(GoldenDataset::records());
    let sync = BankSyncEngine::new(h.log.clone());

    let first = sync.sync_connection(connection, &source).await?;
    let second = sync.sync_connection(connection, &source).await?;
    println!("first run:  {} fetched, {} inserted", first.fetched, first.imported);
    println!("second run: {} fetched, {} inserted", second.fetched, second.imported);

    ensure!(
        first.imported == GoldenDataset::UNIQUE,
        "first run inserted {}, expected {}",
        first.imported,
        GoldenDataset::UNIQUE
    );
    ensure!(second.imported == 0, "second run inserted {}, expected 0", second.imported);

    let state = h.snapshot().await;
    let journals = state.entries_for_company(h.company_id).len();
    ensure!(journals == 0, "DRY_RUN posted {journals} journal entries");

    let high = state
        .matches_since(h.company_id, TemporalFixtures::booking_day())
        .iter()
        .filter(|m| m.confidence_bucket == ConfidenceBucket::High)
        .count();
    ensure!(high >= 1, "no HIGH confidence match");

    println!("journals: {journals}, HIGH matches: {high}");
    println!("golden run passed");
    Ok(())
}

async fn canary(concurrency: usize) -> Result<()> {
    ensure!(concurrency > 0, "concurrency must be positive");

    let company = CompanyId::new();
    let gateway = Arc::new(
        FakeMarketplaceGateway::new(Marketplace::N11)
            .with_delay(StdDuration::from_millis(100))
            .with_label("PKG-CANARY", b"%PDF-1.4 canary label"),
    );
    let order = LocalOrder::new(company, Marketplace::N11, "1001", "Created").with_shipment_package("PKG-CANARY");
    let h = Arc::new(ActionHarness::new(company, vec![gateway.clone()], vec![order]));
    let request = ActionRequestBuilder::new(company, Marketplace::N11, ActionKind::PrintLabelA4)
        .key("canary-label-1001")
        .order_number("1001")
        .build();

    let calls = (0..concurrency).map(|_| {
        let h = Arc::clone(&h);
        let request = request.clone();
        tokio::spawn(async move { h.executor.execute(request).await })
    });
    for joined in futures_util::future::join_all(calls).await {
        joined.context("canary task panicked")??;
    }

    let rows = h.audits.count().await?;
    let audit = h
        .audits
        .find("canary-label-1001")
        .await?
        .context("canary audit row missing")?;
    let provider_calls = gateway.label_calls();
    println!("{concurrency} callers: {rows} audit row(s), status {}, {provider_calls} provider call(s)", audit.status);

    ensure!(rows == 1, "expected 1 audit row, found {rows}");
    ensure!(audit.status == ActionStatus::Success, "expected SUCCESS, found {}", audit.status);
    ensure!(provider_calls == 1, "expected 1 provider call, found {provider_calls}");
    println!("canary passed");
    Ok(())
}
