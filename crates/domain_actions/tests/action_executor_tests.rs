//! Action Executor Tests
//!
//! Exercises the idempotent action layer against scripted marketplace
//! gateways:
//!
//! - Concurrency: one audit row and one provider call per idempotency key
//! - Leases: a held lease yields PENDING; an expired one is taken over
//! - Queue: retries with backoff, dead-lettering and replay on resubmit
//! - Handlers: label fallback, storage outage, status refresh, cargo change
//! - Errors: configuration, validation and auth failures are not retried

use chrono::Duration;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use core_kernel::{CompanyId, Marketplace, PortError};
use domain_actions::{
    action_lease_key, ActionAuditStore, ActionErrorCode, ActionKind, ActionStatus, JobQueue, LabelRepository,
    LeaseProvider, LocalOrder, OrderBook, RemoteOrder, ReplayTarget, WorkOutcome,
};
use test_utils::{ActionHarness, ActionRequestBuilder, FailingObjectStorage, FakeMarketplaceGateway};

const LABEL_PDF: &[u8] = b"%PDF-1.4 A4 shipping label";

fn remote(order_number: &str, status: &str, package: Option<&str>) -> RemoteOrder {
    RemoteOrder {
        order_number: order_number.to_string(),
        status: status.to_string(),
        shipment_package_id: package.map(str::to_string),
        cargo_provider: None,
        cargo_tracking_number: None,
    }
}

// ============================================================================
// EXACTLY-ONCE EXECUTION
// ============================================================================

mod exactly_once {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_calls_run_the_provider_once() {
        let company = CompanyId::new();
        let gateway = Arc::new(
            FakeMarketplaceGateway::new(Marketplace::N11)
                .with_delay(StdDuration::from_millis(150))
                .with_label("PKG-1", LABEL_PDF),
        );
        let order = LocalOrder::new(company, Marketplace::N11, "1001", "Created").with_shipment_package("PKG-1");
        let h = Arc::new(ActionHarness::new(company, vec![gateway.clone()], vec![order]));
        let request = ActionRequestBuilder::new(company, Marketplace::N11, ActionKind::PrintLabelA4)
            .key("n11-label-1001")
            .build();

        let calls = (0..10).map(|_| {
            let h = Arc::clone(&h);
            let request = request.clone();
            tokio::spawn(async move { h.executor.execute(request).await })
        });
        let outcomes: Vec<_> = futures_util::future::join_all(calls)
            .await
            .into_iter()
            .map(|joined| joined.unwrap().unwrap())
            .collect();

        assert!(outcomes
            .iter()
            .all(|o| matches!(o.status, ActionStatus::Pending | ActionStatus::Success)));
        assert!(outcomes.iter().any(|o| o.status == ActionStatus::Success));
        assert_eq!(gateway.label_calls(), 1);
        assert_eq!(h.audits.count().await.unwrap(), 1);

        let audit = h.audits.find("n11-label-1001").await.unwrap().unwrap();
        assert_eq!(audit.status, ActionStatus::Success);

        // Late caller gets the cached result
        let again = h.executor.execute(request).await.unwrap();
        assert_eq!(again.status, ActionStatus::Success);
        assert_eq!(again.result, audit.response_payload);
        assert_eq!(gateway.label_calls(), 1);
        assert_eq!(h.events.completed_keys(), vec!["n11-label-1001".to_string()]);
    }

    #[tokio::test]
    async fn test_held_lease_returns_pending_until_it_expires() {
        let company = CompanyId::new();
        let gateway = Arc::new(FakeMarketplaceGateway::new(Marketplace::N11).with_order(remote("1001", "Shipped", None)));
        let order = LocalOrder::new(company, Marketplace::N11, "1001", "Created");
        let h = ActionHarness::new(company, vec![gateway.clone()], vec![order]);
        let request = ActionRequestBuilder::new(company, Marketplace::N11, ActionKind::RefreshStatus)
            .key("n11-refresh-1001")
            .build();

        let stale = h
            .leases
            .try_acquire(&action_lease_key("n11-refresh-1001"), Duration::seconds(60))
            .await
            .unwrap();
        assert!(stale.is_some());

        let blocked = h.executor.execute(request.clone()).await.unwrap();
        assert_eq!(blocked.status, ActionStatus::Pending);
        assert_eq!(gateway.total_calls(), 0);

        h.clock.advance(Duration::seconds(61));
        let taken_over = h.executor.execute(request).await.unwrap();
        assert_eq!(taken_over.status, ActionStatus::Success);
        assert_eq!(gateway.order_calls(), 1);

        // The crashed holder cannot drop the new holder's lease
        assert!(!h.leases.release(&stale.unwrap()).await.unwrap());
    }
}

// ============================================================================
// QUEUED EXECUTION
// ============================================================================

mod queued {
    use super::*;

    #[tokio::test]
    async fn test_retries_dead_letters_and_replays_on_resubmit() {
        let company = CompanyId::new();
        let gateway = Arc::new(FakeMarketplaceGateway::new(Marketplace::Trendyol).with_label("PKG-7", LABEL_PDF));
        for _ in 0..3 {
            gateway.fail_label("PKG-7", PortError::connection("connection reset by peer"));
        }
        let order = LocalOrder::new(company, Marketplace::Trendyol, "7007", "Picking").with_shipment_package("PKG-7");
        let h = ActionHarness::new(company, vec![gateway.clone()], vec![order]);
        let key = "ty-label-7007";
        let request = ActionRequestBuilder::new(company, Marketplace::Trendyol, ActionKind::PrintLabelA4)
            .key(key)
            .order_number("7007")
            .build();

        let queued = h.executor.execute(request.clone()).await.unwrap();
        assert_eq!(queued.status, ActionStatus::Pending);
        assert_eq!(gateway.total_calls(), 0);
        let audit = h.audits.find(key).await.unwrap().unwrap();
        assert_eq!(audit.job_id.as_deref(), Some(key));

        // Resubmitting while queued does not enqueue a twin
        h.executor.execute(request.clone()).await.unwrap();
        assert_eq!(h.queue.stats().await.unwrap().waiting, 1);

        assert_eq!(h.worker.run_once().await.unwrap(), WorkOutcome::Retrying(key.to_string()));
        // Backoff: nothing due until a second has passed
        assert_eq!(h.worker.run_once().await.unwrap(), WorkOutcome::Idle);
        h.clock.advance(Duration::milliseconds(1000));
        assert_eq!(h.worker.run_once().await.unwrap(), WorkOutcome::Retrying(key.to_string()));
        h.clock.advance(Duration::milliseconds(2000));
        assert_eq!(h.worker.run_once().await.unwrap(), WorkOutcome::Failed(key.to_string()));

        let failed = h.audits.find(key).await.unwrap().unwrap();
        assert_eq!(failed.status, ActionStatus::Failed);
        assert_eq!(failed.retry_count, 3);
        assert_eq!(failed.failure_history.len(), 3);
        assert_eq!(failed.error_code, Some(ActionErrorCode::Network));
        assert_eq!(h.events.failed_keys(), vec![key.to_string()]);
        assert_eq!(h.queue.stats().await.unwrap().dead_lettered, 1);

        // Resubmission brings the dead-lettered job back
        let resubmitted = h.executor.execute(request.clone()).await.unwrap();
        assert_eq!(resubmitted.status, ActionStatus::Pending);
        assert_eq!(h.queue.stats().await.unwrap().dead_lettered, 0);

        assert_eq!(h.worker.drain().await.unwrap(), vec![WorkOutcome::Succeeded(key.to_string())]);
        let done = h.executor.execute(request).await.unwrap();
        assert_eq!(done.status, ActionStatus::Success);
        assert_eq!(done.result.unwrap()["shipmentPackageId"], "PKG-7");
        assert_eq!(gateway.label_calls(), 4);
    }

    #[tokio::test]
    async fn test_pending_row_requeued_after_queue_loss() {
        let company = CompanyId::new();
        let gateway = Arc::new(FakeMarketplaceGateway::new(Marketplace::Trendyol).with_label("PKG-8", LABEL_PDF));
        let order = LocalOrder::new(company, Marketplace::Trendyol, "8008", "Picking").with_shipment_package("PKG-8");
        let mut h = ActionHarness::new(company, vec![gateway.clone()], vec![order]);
        let key = "ty-label-8008";
        let request = ActionRequestBuilder::new(company, Marketplace::Trendyol, ActionKind::PrintLabelA4)
            .key(key)
            .order_number("8008")
            .build();

        h.executor.execute(request.clone()).await.unwrap();
        let audit = h.audits.find(key).await.unwrap().unwrap();
        assert_eq!(audit.status, ActionStatus::Pending);
        assert!(audit.job_id.is_some());

        // The row survives, the queued job does not
        h.restart_queue();
        assert_eq!(h.queue.stats().await.unwrap().waiting, 0);

        let resubmitted = h.executor.execute(request.clone()).await.unwrap();
        assert_eq!(resubmitted.status, ActionStatus::Pending);
        assert_eq!(h.queue.stats().await.unwrap().waiting, 1);

        // A second resubmit finds the live job
        h.executor.execute(request.clone()).await.unwrap();
        assert_eq!(h.queue.stats().await.unwrap().waiting, 1);

        assert_eq!(h.worker.drain().await.unwrap(), vec![WorkOutcome::Succeeded(key.to_string())]);
        let done = h.executor.execute(request).await.unwrap();
        assert_eq!(done.status, ActionStatus::Success);
        assert_eq!(h.audits.count().await.unwrap(), 1);
        assert_eq!(gateway.label_calls(), 1);
    }

    #[tokio::test]
    async fn test_operator_replay_of_all_dead_letters() {
        let company = CompanyId::new();
        let gateway = Arc::new(FakeMarketplaceGateway::new(Marketplace::Trendyol));
        gateway.fail_cargo_update(PortError::RateLimited { retry_after_secs: 1 });
        gateway.fail_cargo_update(PortError::RateLimited { retry_after_secs: 1 });
        gateway.fail_cargo_update(PortError::RateLimited { retry_after_secs: 1 });
        let h = ActionHarness::new(company, vec![gateway.clone()], Vec::new());
        let request = ActionRequestBuilder::new(company, Marketplace::Trendyol, ActionKind::ChangeCargo)
            .key("ty-cargo-1")
            .payload(json!({ "shipmentPackageId": "PKG-1", "cargoProviderCode": "ARAS" }))
            .build();

        h.executor.execute(request).await.unwrap();
        h.worker.run_once().await.unwrap();
        h.clock.advance(Duration::seconds(1));
        h.worker.run_once().await.unwrap();
        h.clock.advance(Duration::seconds(2));
        assert_eq!(h.worker.run_once().await.unwrap(), WorkOutcome::Failed("ty-cargo-1".into()));

        let report = h.queue.replay(ReplayTarget::All).await.unwrap();
        assert_eq!(report.replayed, vec!["ty-cargo-1".to_string()]);
        assert!(report.skipped.is_empty());

        assert_eq!(h.worker.drain().await.unwrap(), vec![WorkOutcome::Succeeded("ty-cargo-1".into())]);
        assert_eq!(gateway.cargo_updates(), vec![("PKG-1".to_string(), "ARAS".to_string())]);
        let audit = h.audits.find("ty-cargo-1").await.unwrap().unwrap();
        assert_eq!(audit.status, ActionStatus::Success);
    }

    #[tokio::test]
    async fn test_auth_failure_is_not_retried() {
        let company = CompanyId::new();
        let gateway = Arc::new(FakeMarketplaceGateway::new(Marketplace::Trendyol));
        gateway.fail_cargo_update(PortError::unauthorized("invalid api key"));
        let h = ActionHarness::new(company, vec![gateway.clone()], Vec::new());
        let request = ActionRequestBuilder::new(company, Marketplace::Trendyol, ActionKind::ChangeCargo)
            .key("ty-cargo-auth")
            .payload(json!({ "shipmentPackageId": "PKG-2", "cargoProviderCode": "YK" }))
            .build();

        h.executor.execute(request).await.unwrap();
        assert_eq!(h.worker.run_once().await.unwrap(), WorkOutcome::Failed("ty-cargo-auth".into()));

        let audit = h.audits.find("ty-cargo-auth").await.unwrap().unwrap();
        assert_eq!(audit.status, ActionStatus::Failed);
        assert_eq!(audit.error_code, Some(ActionErrorCode::ProviderAuth));
        assert_eq!(audit.retry_count, 1);
        assert_eq!(gateway.cargo_calls(), 1);
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

mod handlers {
    use super::*;

    #[tokio::test]
    async fn test_label_falls_back_to_the_real_package_id() {
        let company = CompanyId::new();
        let gateway = Arc::new(
            FakeMarketplaceGateway::new(Marketplace::N11)
                .with_order(remote("5001", "ReadyToShip", Some("PKG-5001")))
                .with_label("PKG-5001", LABEL_PDF),
        );
        let h = ActionHarness::new(company, vec![gateway.clone()], Vec::new());
        let request = ActionRequestBuilder::new(company, Marketplace::N11, ActionKind::PrintLabelA4)
            .key("n11-label-5001")
            .order_number("5001")
            .build();

        let outcome = h.executor.execute(request).await.unwrap();
        assert_eq!(outcome.status, ActionStatus::Success);
        let result = outcome.result.unwrap();
        assert_eq!(result["shipmentPackageId"], "PKG-5001");
        assert_eq!(result["format"], "A4");
        assert_eq!(result["labelReady"], true);
        assert_eq!(result["size"], LABEL_PDF.len());
        assert_eq!(gateway.label_calls(), 2);
        assert_eq!(gateway.order_calls(), 1);

        let label = h
            .labels
            .find(company, Marketplace::N11, "PKG-5001")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result["sha256"], label.sha256.as_str());
        assert!(label.storage_key.is_some());
    }

    #[tokio::test]
    async fn test_storage_outage_keeps_label_hash() {
        let company = CompanyId::new();
        let gateway = Arc::new(FakeMarketplaceGateway::new(Marketplace::N11).with_label("PKG-9", LABEL_PDF));
        let order = LocalOrder::new(company, Marketplace::N11, "9009", "Picking").with_shipment_package("PKG-9");
        let h = ActionHarness::with_storage(
            company,
            vec![gateway],
            vec![order],
            Arc::new(FailingObjectStorage),
        );
        let request = ActionRequestBuilder::new(company, Marketplace::N11, ActionKind::PrintLabelA4)
            .key("n11-label-9009")
            .order_number("9009")
            .build();

        let outcome = h.executor.execute(request).await.unwrap();
        assert_eq!(outcome.status, ActionStatus::Success);
        assert!(outcome.result.unwrap()["storageKey"].is_null());

        let label = h.labels.find(company, Marketplace::N11, "PKG-9").await.unwrap().unwrap();
        assert!(label.storage_key.is_none());
        assert_eq!(label.size, LABEL_PDF.len());
    }

    #[tokio::test]
    async fn test_refresh_status_updates_the_local_order() {
        let company = CompanyId::new();
        let gateway = Arc::new(
            FakeMarketplaceGateway::new(Marketplace::Hepsiburada).with_order(remote("HB-1", "Shipped", Some("PKG-HB"))),
        );
        let order = LocalOrder::new(company, Marketplace::Hepsiburada, "HB-1", "Created");
        let h = ActionHarness::new(company, vec![gateway], vec![order]);
        let request = ActionRequestBuilder::new(company, Marketplace::Hepsiburada, ActionKind::RefreshStatus)
            .key("hb-refresh-1")
            .order_number("HB-1")
            .build();

        let outcome = h.executor.execute(request).await.unwrap();
        let result = outcome.result.unwrap();
        assert_eq!(result["previousStatus"], "Created");
        assert_eq!(result["currentStatus"], "Shipped");

        let stored = h.orders.find(company, Marketplace::Hepsiburada, "HB-1").await.unwrap().unwrap();
        assert_eq!(stored.status, "Shipped");
        assert_eq!(stored.shipment_package_id.as_deref(), Some("PKG-HB"));
    }

    #[tokio::test]
    async fn test_change_cargo_updates_every_order_of_the_package() {
        let company = CompanyId::new();
        let gateway = Arc::new(FakeMarketplaceGateway::new(Marketplace::N11));
        let orders = vec![
            LocalOrder::new(company, Marketplace::N11, "1", "Picking").with_shipment_package("PKG-S"),
            LocalOrder::new(company, Marketplace::N11, "2", "Picking").with_shipment_package("PKG-S"),
        ];
        let h = ActionHarness::new(company, vec![gateway.clone()], orders);
        let request = ActionRequestBuilder::new(company, Marketplace::N11, ActionKind::ChangeCargo)
            .key("n11-cargo-s")
            .order_number("1")
            .payload(json!({ "shipmentPackageId": "PKG-S", "cargoProviderCode": 17 }))
            .build();

        let outcome = h.executor.execute(request).await.unwrap();
        let result = outcome.result.unwrap();
        assert_eq!(result["updated"], true);
        assert_eq!(result["localOrdersUpdated"], 2);
        assert_eq!(gateway.cargo_updates(), vec![("PKG-S".to_string(), "17".to_string())]);
    }
}

// ============================================================================
// ERRORS
// ============================================================================

mod errors {
    use super::*;

    #[tokio::test]
    async fn test_missing_integration_fails_with_config_code() {
        let company = CompanyId::new();
        let h = ActionHarness::new(company, Vec::new(), Vec::new());
        let request = ActionRequestBuilder::new(company, Marketplace::Pazarama, ActionKind::RefreshStatus)
            .key("pz-refresh-1")
            .build();

        let outcome = h.executor.execute(request).await.unwrap();
        assert_eq!(outcome.status, ActionStatus::Failed);
        assert_eq!(outcome.error_code, Some(ActionErrorCode::ConfigMissing));
        assert_eq!(h.events.failed_keys(), vec!["pz-refresh-1".to_string()]);
    }

    #[tokio::test]
    async fn test_change_cargo_without_payload_never_calls_the_marketplace() {
        let company = CompanyId::new();
        let gateway = Arc::new(FakeMarketplaceGateway::new(Marketplace::N11));
        let h = ActionHarness::new(company, vec![gateway.clone()], Vec::new());
        let request = ActionRequestBuilder::new(company, Marketplace::N11, ActionKind::ChangeCargo)
            .key("n11-cargo-empty")
            .payload(json!({ "shipmentPackageId": "  " }))
            .build();

        let outcome = h.executor.execute(request).await.unwrap();
        assert_eq!(outcome.status, ActionStatus::Failed);
        assert_eq!(outcome.error_code, Some(ActionErrorCode::Validation));
        assert_eq!(gateway.cargo_calls(), 0);
    }

    #[tokio::test]
    async fn test_blank_idempotency_key_is_rejected() {
        let company = CompanyId::new();
        let h = ActionHarness::new(company, Vec::new(), Vec::new());
        let request = ActionRequestBuilder::new(company, Marketplace::N11, ActionKind::RefreshStatus)
            .key("   ")
            .build();

        let err = h.executor.execute(request).await.unwrap_err();
        assert_eq!(err.code(), ActionErrorCode::Validation);
        assert_eq!(h.audits.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_direct_action_can_be_retried_with_same_key() {
        let company = CompanyId::new();
        let gateway = Arc::new(FakeMarketplaceGateway::new(Marketplace::N11));
        gateway.fail_cargo_update(PortError::remote_api(503, "maintenance"));
        let h = ActionHarness::new(company, vec![gateway.clone()], Vec::new());
        let request = ActionRequestBuilder::new(company, Marketplace::N11, ActionKind::ChangeCargo)
            .key("n11-cargo-retry")
            .payload(json!({ "shipmentPackageId": "PKG-R", "cargoProviderCode": "MNG" }))
            .build();

        let first = h.executor.execute(request.clone()).await.unwrap();
        assert_eq!(first.status, ActionStatus::Failed);
        assert_eq!(first.error_code, Some(ActionErrorCode::Network));

        let second = h.executor.execute(request).await.unwrap();
        assert_eq!(second.status, ActionStatus::Success);
        assert_eq!(second.audit_id, first.audit_id);
        assert_eq!(gateway.cargo_calls(), 2);
    }
}
