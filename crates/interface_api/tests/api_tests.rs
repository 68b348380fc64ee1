//! API Tests
//!
//! Drives the router in-process with `tower::ServiceExt::oneshot` over
//! in-memory stores and scripted marketplace gateways:
//!
//! - Health and readiness
//! - Actions: direct execution, cached repeats, queued execution, polling
//! - Validation errors
//! - Dead-letter listing and replay
//! - Statement reconciliation and company health

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use core_kernel::{CompanyId, Marketplace, PortError};
use domain_actions::{ActionWorker, JobQueue, LocalOrder, RemoteOrder, WorkOutcome};
use domain_fintech::OperatingMode;
use interface_api::{config::BackofficeConfig, create_router, AppState};
use test_utils::{statement, ActionHarness, FakeMarketplaceGateway, LedgerHarness, SaleEventBuilder};

// ============================================================================
// HELPERS
// ============================================================================

struct TestApp {
    router: Router,
    worker: ActionWorker,
    ledger: LedgerHarness,
    company_id: CompanyId,
}

impl TestApp {
    fn new(gateways: Vec<Arc<FakeMarketplaceGateway>>, orders: Vec<LocalOrder>, company_id: CompanyId) -> Self {
        let ledger = LedgerHarness::new(OperatingMode::DryRun);
        let ActionHarness {
            executor, queue, worker, ..
        } = ActionHarness::new(company_id, gateways, orders);

        let state = AppState::new(
            Arc::new(executor),
            queue as Arc<dyn JobQueue>,
            ledger.log.clone(),
            &BackofficeConfig::default(),
        );
        Self {
            router: create_router(state),
            worker,
            ledger,
            company_id,
        }
    }

    fn empty() -> Self {
        Self::new(Vec::new(), Vec::new(), CompanyId::new())
    }

    async fn call(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.call(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.call(request).await
    }

    fn action_body(&self, key: &str, marketplace: &str, action: &str, order_number: &str, payload: Value) -> Value {
        json!({
            "idempotencyKey": key,
            "companyId": self.company_id.as_uuid(),
            "marketplace": marketplace,
            "action": action,
            "orderNumber": order_number,
            "payload": payload
        })
    }
}

fn remote(order_number: &str, status: &str) -> RemoteOrder {
    RemoteOrder {
        order_number: order_number.to_string(),
        status: status.to_string(),
        shipment_package_id: None,
        cargo_provider: None,
        cargo_tracking_number: None,
    }
}

// ============================================================================
// HEALTH
// ============================================================================

mod health {
    use super::*;

    #[tokio::test]
    async fn test_health_check() {
        let app = TestApp::empty();
        let (status, body) = app.get("/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_readiness_without_database() {
        let app = TestApp::empty();
        let (status, body) = app.get("/health/ready").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["database"], "in-memory");
        assert_eq!(body["queue"]["deadLettered"], 0);
    }

    #[tokio::test]
    async fn test_response_carries_request_id() {
        let app = TestApp::empty();
        let response = app
            .router
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.headers().contains_key("x-request-id"));
    }
}

// ============================================================================
// ACTIONS
// ============================================================================

mod actions {
    use super::*;

    #[tokio::test]
    async fn test_direct_action_runs_once_and_is_cached() {
        let company = CompanyId::new();
        let gateway = Arc::new(FakeMarketplaceGateway::new(Marketplace::N11).with_order(remote("1001", "Shipped")));
        let order = LocalOrder::new(company, Marketplace::N11, "1001", "Created");
        let app = TestApp::new(vec![gateway.clone()], vec![order], company);
        let body = app.action_body("n11-refresh-1001", "N11", "REFRESH_STATUS", "1001", Value::Null);

        let (status, first) = app.post("/api/v1/actions", body.clone()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["status"], "SUCCESS");

        let (status, second) = app.post("/api/v1/actions", body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(second["auditId"], first["auditId"]);
        assert_eq!(second["result"], first["result"]);
        assert_eq!(gateway.order_calls(), 1);

        let (status, polled) = app.get("/api/v1/actions/n11-refresh-1001").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(polled["status"], "SUCCESS");
        assert_eq!(polled["action"], "REFRESH_STATUS");
        assert_eq!(polled["retryCount"], 0);
    }

    #[tokio::test]
    async fn test_queued_action_is_accepted_then_completed_by_worker() {
        let company = CompanyId::new();
        let gateway =
            Arc::new(FakeMarketplaceGateway::new(Marketplace::Trendyol).with_order(remote("2001", "Delivered")));
        let order = LocalOrder::new(company, Marketplace::Trendyol, "2001", "Shipped");
        let app = TestApp::new(vec![gateway.clone()], vec![order], company);

        let (status, accepted) = app
            .post(
                "/api/v1/actions",
                app.action_body("ty-refresh-2001", "TRENDYOL", "REFRESH_STATUS", "2001", Value::Null),
            )
            .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(accepted["status"], "PENDING");
        assert_eq!(gateway.total_calls(), 0);

        let outcomes = app.worker.drain().await.unwrap();
        assert_eq!(outcomes, vec![WorkOutcome::Succeeded("ty-refresh-2001".to_string())]);

        let (status, polled) = app.get("/api/v1/actions/ty-refresh-2001").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(polled["status"], "SUCCESS");
        assert_eq!(polled["jobId"], "ty-refresh-2001");
    }

    #[tokio::test]
    async fn test_unknown_key_is_not_found() {
        let app = TestApp::empty();
        let (status, body) = app.get("/api/v1/actions/never-submitted").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");
    }

    #[tokio::test]
    async fn test_invalid_requests_are_rejected() {
        let app = TestApp::empty();

        let (status, body) = app
            .post(
                "/api/v1/actions",
                app.action_body("", "N11", "REFRESH_STATUS", "1001", Value::Null),
            )
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "validation_error");

        let (status, _) = app
            .post(
                "/api/v1/actions",
                app.action_body("k-1", "EBAY", "REFRESH_STATUS", "1001", Value::Null),
            )
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = app
            .post(
                "/api/v1/actions",
                app.action_body("k-2", "N11", "CANCEL_ORDER", "1001", Value::Null),
            )
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_unconfigured_marketplace_fails_the_action() {
        let app = TestApp::empty();
        let (status, body) = app
            .post(
                "/api/v1/actions",
                app.action_body("pz-refresh-1", "PAZARAMA", "REFRESH_STATUS", "1", Value::Null),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "FAILED");
        assert_eq!(body["errorCode"], "E_CONFIG_MISSING");
    }
}

// ============================================================================
// DEAD-LETTER QUEUE
// ============================================================================

mod dlq {
    use super::*;

    #[tokio::test]
    async fn test_dead_lettered_job_is_listed_and_replayed() {
        let company = CompanyId::new();
        let gateway = Arc::new(FakeMarketplaceGateway::new(Marketplace::Trendyol));
        gateway.fail_cargo_update(PortError::unauthorized("invalid api key"));
        let app = TestApp::new(vec![gateway.clone()], Vec::new(), company);

        let (status, _) = app
            .post(
                "/api/v1/actions",
                app.action_body(
                    "ty-cargo-3001",
                    "TRENDYOL",
                    "CHANGE_CARGO",
                    "3001",
                    json!({ "shipmentPackageId": "PKG-3001", "cargoProviderCode": "YK" }),
                ),
            )
            .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(
            app.worker.drain().await.unwrap(),
            vec![WorkOutcome::Failed("ty-cargo-3001".to_string())]
        );

        let (status, dead) = app.get("/api/v1/admin/dlq").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(dead.as_array().map(Vec::len), Some(1));
        assert_eq!(dead[0]["jobId"], "ty-cargo-3001");
        assert_eq!(dead[0]["action"], "CHANGE_CARGO");

        let (status, report) = app
            .post("/api/v1/admin/dlq/replay", json!({ "jobIds": ["ty-cargo-3001", "unknown-job"] }))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["replayed"], json!(["ty-cargo-3001"]));
        assert_eq!(report["skipped"][0]["jobId"], "unknown-job");

        app.worker.drain().await.unwrap();
        let (_, polled) = app.get("/api/v1/actions/ty-cargo-3001").await;
        assert_eq!(polled["status"], "SUCCESS");
        assert_eq!(gateway.cargo_calls(), 2);

        let (_, dead) = app.get("/api/v1/admin/dlq").await;
        assert_eq!(dead, json!([]));
    }

    #[tokio::test]
    async fn test_replay_needs_a_target() {
        let app = TestApp::empty();
        let (status, body) = app.post("/api/v1/admin/dlq/replay", json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "bad_request");

        let (status, report) = app.post("/api/v1/admin/dlq/replay", json!({ "all": true })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["replayed"], json!([]));
    }
}

// ============================================================================
// FINTECH
// ============================================================================

mod fintech {
    use super::*;

    #[tokio::test]
    async fn test_reconcile_statement_then_repeat() {
        let app = TestApp::empty();
        let company = app.ledger.company_id;
        app.ledger
            .log
            .emit(SaleEventBuilder::new(company).with_gross_amount(dec!(1000.00)).build())
            .await
            .unwrap();
        let stmt = statement(company, "TY-PAYOUT-1", dec!(999.25));
        let statement_id = *stmt.id.as_uuid();
        app.ledger.put_statement(stmt).await.unwrap();

        let uri = format!("/api/v1/fintech/statements/{statement_id}/reconcile");
        let (status, body) = app.post(&uri, json!({ "companyId": company.as_uuid() })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["alreadyMatched"], false);
        assert_eq!(body["outcome"]["status"], "TOLERATED");
        assert_eq!(body["outcome"]["closedLines"], 1);

        let (status, again) = app.post(&uri, json!({ "companyId": company.as_uuid() })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(again["alreadyMatched"], true);
        assert_eq!(again["outcome"], Value::Null);
    }

    #[tokio::test]
    async fn test_reconcile_unknown_statement_is_not_found() {
        let app = TestApp::empty();
        let uri = format!("/api/v1/fintech/statements/{}/reconcile", uuid::Uuid::new_v4());
        let (status, _) = app
            .post(&uri, json!({ "companyId": app.ledger.company_id.as_uuid() }))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_company_health_of_a_quiet_company() {
        let app = TestApp::empty();
        let uri = format!("/api/v1/fintech/companies/{}/health", app.ledger.company_id.as_uuid());
        let (status, body) = app.get(&uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["healthy"], true);
        assert_eq!(body["metrics"]["grade"], "HEALTHY");
        assert_eq!(body["metrics"]["openReceivableCount"], 0);
    }
}
