//! Scripted adapters for the back office's outbound ports
//!
//! Each fake counts its calls so tests can assert how often the outside
//! world was actually reached.

use async_trait::async_trait;
use chrono::Duration;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration as StdDuration;

use core_kernel::{DomainPort, Marketplace, PortError};
use domain_actions::{ActionAudit, ActionEventSink, LabelDocument, MarketplaceGateway, ObjectStorage, RemoteOrder};
use domain_fintech::{BankConnection, BankErrorCode, RawBankRecord, SourceError, TransactionSource};

/// Transaction source returning a fixed batch, or a fixed failure
pub struct FakeTransactionSource {
    records: Vec<RawBankRecord>,
    failure: Option<(Option<BankErrorCode>, String)>,
    calls: AtomicUsize,
}

impl FakeTransactionSource {
    pub fn with_records(records: Vec<RawBankRecord>) -> Self {
        Self {
            records,
            failure: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn empty() -> Self {
        Self::with_records(Vec::new())
    }

    /// Fails with a message the sync engine has to classify itself
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            records: Vec::new(),
            failure: Some((None, message.into())),
            calls: AtomicUsize::new(0),
        }
    }

    /// Fails with a code set at origin
    pub fn failing_with(code: BankErrorCode, message: impl Into<String>) -> Self {
        Self {
            records: Vec::new(),
            failure: Some((Some(code), message.into())),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DomainPort for FakeTransactionSource {}

#[async_trait]
impl TransactionSource for FakeTransactionSource {
    async fn fetch(&self, _connection: &BankConnection) -> Result<Vec<RawBankRecord>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some((Some(code), message)) => Err(SourceError::classified(*code, message.clone())),
            Some((None, message)) => Err(SourceError::opaque(message.clone())),
            None => Ok(self.records.clone()),
        }
    }
}

#[derive(Default)]
struct GatewayScript {
    orders: HashMap<String, RemoteOrder>,
    labels: HashMap<String, Vec<u8>>,
    /// Errors returned, in order, before falling back to the scripted label
    label_failures: HashMap<String, VecDeque<PortError>>,
    cargo_failures: VecDeque<PortError>,
    cargo_updates: Vec<(String, String)>,
}

/// Marketplace gateway answering from a script
pub struct FakeMarketplaceGateway {
    marketplace: Marketplace,
    delay: Option<StdDuration>,
    script: Mutex<GatewayScript>,
    order_calls: AtomicUsize,
    label_calls: AtomicUsize,
    cargo_calls: AtomicUsize,
}

impl FakeMarketplaceGateway {
    pub fn new(marketplace: Marketplace) -> Self {
        Self {
            marketplace,
            delay: None,
            script: Mutex::new(GatewayScript::default()),
            order_calls: AtomicUsize::new(0),
            label_calls: AtomicUsize::new(0),
            cargo_calls: AtomicUsize::new(0),
        }
    }

    /// Every call sleeps this long first
    pub fn with_delay(mut self, delay: StdDuration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_order(self, order: RemoteOrder) -> Self {
        self.script().orders.insert(order.order_number.clone(), order);
        self
    }

    pub fn with_label(self, shipment_package_id: &str, content: &[u8]) -> Self {
        self.script()
            .labels
            .insert(shipment_package_id.to_string(), content.to_vec());
        self
    }

    /// Queues a failure for the next label fetch of `shipment_package_id`
    pub fn fail_label(&self, shipment_package_id: &str, error: PortError) {
        self.script()
            .label_failures
            .entry(shipment_package_id.to_string())
            .or_default()
            .push_back(error);
    }

    /// Queues a failure for the next cargo provider update
    pub fn fail_cargo_update(&self, error: PortError) {
        self.script().cargo_failures.push_back(error);
    }

    pub fn order_calls(&self) -> usize {
        self.order_calls.load(Ordering::SeqCst)
    }

    pub fn label_calls(&self) -> usize {
        self.label_calls.load(Ordering::SeqCst)
    }

    pub fn cargo_calls(&self) -> usize {
        self.cargo_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.order_calls() + self.label_calls() + self.cargo_calls()
    }

    /// `(package, provider)` pairs the gateway accepted
    pub fn cargo_updates(&self) -> Vec<(String, String)> {
        self.script().cargo_updates.clone()
    }

    fn script(&self) -> std::sync::MutexGuard<'_, GatewayScript> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

impl DomainPort for FakeMarketplaceGateway {}

#[async_trait]
impl MarketplaceGateway for FakeMarketplaceGateway {
    fn marketplace(&self) -> Marketplace {
        self.marketplace
    }

    async fn get_order_by_number(&self, order_number: &str) -> Result<RemoteOrder, PortError> {
        self.order_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.script()
            .orders
            .get(order_number)
            .cloned()
            .ok_or_else(|| PortError::not_found("Order", order_number))
    }

    async fn fetch_label(&self, shipment_package_id: &str) -> Result<LabelDocument, PortError> {
        self.label_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        let mut script = self.script();
        if let Some(error) = script
            .label_failures
            .get_mut(shipment_package_id)
            .and_then(VecDeque::pop_front)
        {
            return Err(error);
        }
        script
            .labels
            .get(shipment_package_id)
            .map(|content| LabelDocument::pdf(content.clone()))
            .ok_or_else(|| PortError::not_found("Label", shipment_package_id))
    }

    async fn update_cargo_provider(
        &self,
        shipment_package_id: &str,
        cargo_provider_code: &str,
    ) -> Result<(), PortError> {
        self.cargo_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        let mut script = self.script();
        if let Some(error) = script.cargo_failures.pop_front() {
            return Err(error);
        }
        script
            .cargo_updates
            .push((shipment_package_id.to_string(), cargo_provider_code.to_string()));
        Ok(())
    }
}

/// Object storage that is always down
#[derive(Debug, Default)]
pub struct FailingObjectStorage;

impl DomainPort for FailingObjectStorage {}

#[async_trait]
impl ObjectStorage for FailingObjectStorage {
    async fn store(&self, _key: &str, _bytes: &[u8], _content_type: &str) -> Result<String, PortError> {
        Err(PortError::connection("object storage unreachable"))
    }

    async fn signed_url(&self, _key: &str, _ttl: Duration) -> Result<String, PortError> {
        Err(PortError::connection("object storage unreachable"))
    }
}

/// Event sink remembering which keys completed or failed
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    completed: Mutex<Vec<String>>,
    failed: Mutex<Vec<String>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn completed_keys(&self) -> Vec<String> {
        self.completed.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn failed_keys(&self) -> Vec<String> {
        self.failed.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl ActionEventSink for RecordingEventSink {
    async fn completed(&self, audit: &ActionAudit) {
        self.completed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(audit.idempotency_key.clone());
    }

    async fn failed(&self, audit: &ActionAudit) {
        self.failed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(audit.idempotency_key.clone());
    }
}
