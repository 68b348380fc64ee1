//! In-memory wiring of the financial core and the action layer
//!
//! Both harnesses run on a [`ManualClock`] starting at
//! [`TemporalFixtures::now`], so backoff windows and time buckets are moved
//! explicitly by the test.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use core_kernel::{BankConnectionId, Clock, CompanyId, ManualClock};
use domain_actions::{
    ActionAuditStore, ActionEventSink, ActionExecutor, ActionHandler, ActionWorker, ExecutorConfig, GatewayDirectory,
    JobQueue, LabelRepository, LabelStore, LeaseProvider, LocalOrder, MemoryActionAuditStore, MemoryJobQueue,
    MemoryLabelRepository, MemoryLeaseProvider, MemoryObjectStorage, MemoryOrderBook, ObjectStorage, OrderBook,
    QueueConfig,
};
use domain_fintech::{
    BankConnection, BankStatement, ConnectionService, ConnectionStatus, EventLog, FintechError, LedgerState,
    MatchingConfig, MemoryDiary, MemoryLedgerStore, OperatingMode, StatusChange,
};

use crate::fakes::{FakeMarketplaceGateway, RecordingEventSink};
use crate::fixtures::{seed_rules, TemporalFixtures};

/// Event log over a memory store, one company
pub struct LedgerHarness {
    pub store: MemoryLedgerStore,
    pub clock: Arc<ManualClock>,
    pub diary: Arc<MemoryDiary>,
    pub log: Arc<EventLog>,
    pub company_id: CompanyId,
}

impl LedgerHarness {
    pub fn new(mode: OperatingMode) -> Self {
        Self::with_matching(mode, MatchingConfig::default())
    }

    pub fn with_matching(mode: OperatingMode, matching: MatchingConfig) -> Self {
        let store = MemoryLedgerStore::new();
        let clock = Arc::new(ManualClock::new(TemporalFixtures::now()));
        let diary = Arc::new(MemoryDiary::new());
        let log = Arc::new(EventLog::with_standard_handlers(
            Arc::new(store.clone()),
            clock.clone(),
            mode,
            matching,
            diary.clone(),
        ));
        Self {
            store,
            clock,
            diary,
            log,
            company_id: CompanyId::new(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Creates a connection and walks it DRAFT -> PENDING_ACTIVATION -> ACTIVE
    pub async fn active_connection(&self, bank_name: &str) -> Result<BankConnectionId, FintechError> {
        let connection = self.draft_connection(bank_name).await?;
        let now = self.now();
        self.log
            .store()
            .transaction(|tx| {
                ConnectionService::update_status(
                    tx,
                    connection,
                    ConnectionStatus::PendingActivation,
                    StatusChange::by("test:operator").reason("CONSENT_REQUESTED"),
                    now,
                )?;
                ConnectionService::update_status(
                    tx,
                    connection,
                    ConnectionStatus::Active,
                    StatusChange::by("test:operator").reason("CONSENT_GRANTED"),
                    now,
                )?;
                Ok(())
            })
            .await?;
        Ok(connection)
    }

    pub async fn draft_connection(&self, bank_name: &str) -> Result<BankConnectionId, FintechError> {
        let connection = BankConnection::new(self.company_id, bank_name, "TR000000000000000000000001", self.now());
        let id = connection.id;
        self.log
            .store()
            .transaction(|tx| {
                tx.put_bank_connection(connection);
                Ok(())
            })
            .await?;
        Ok(id)
    }

    /// Seeds the TRENDYOL and KIRA rules
    pub async fn seed_rules(&self) -> Result<(), FintechError> {
        let rules = seed_rules(self.company_id, self.now());
        self.log
            .store()
            .transaction(|tx| {
                for rule in rules {
                    tx.insert_rule(rule);
                }
                Ok(())
            })
            .await
    }

    pub async fn put_statement(&self, statement: BankStatement) -> Result<(), FintechError> {
        self.log
            .store()
            .transaction(|tx| {
                tx.put_bank_statement(statement);
                Ok(())
            })
            .await
    }

    pub async fn snapshot(&self) -> LedgerState {
        self.store.snapshot().await
    }
}

/// Executor and worker over memory stores and scripted gateways
pub struct ActionHarness {
    pub clock: Arc<ManualClock>,
    pub company_id: CompanyId,
    pub audits: Arc<MemoryActionAuditStore>,
    pub leases: Arc<MemoryLeaseProvider>,
    pub queue: Arc<MemoryJobQueue>,
    pub orders: Arc<MemoryOrderBook>,
    pub labels: Arc<MemoryLabelRepository>,
    pub events: Arc<RecordingEventSink>,
    pub executor: ActionExecutor,
    pub worker: ActionWorker,
    handler: Arc<ActionHandler>,
}

impl ActionHarness {
    pub fn new(
        company_id: CompanyId,
        gateways: Vec<Arc<FakeMarketplaceGateway>>,
        orders: Vec<LocalOrder>,
    ) -> Self {
        Self::with_storage(company_id, gateways, orders, Arc::new(MemoryObjectStorage::new()))
    }

    pub fn with_storage(
        company_id: CompanyId,
        gateways: Vec<Arc<FakeMarketplaceGateway>>,
        orders: Vec<LocalOrder>,
        storage: Arc<dyn ObjectStorage>,
    ) -> Self {
        let clock = Arc::new(ManualClock::new(TemporalFixtures::now()));
        let dyn_clock: Arc<dyn Clock> = clock.clone();

        let directory = gateways
            .into_iter()
            .fold(GatewayDirectory::new(), |dir, gateway| dir.register(gateway));
        let order_book = Arc::new(MemoryOrderBook::with_orders(orders));
        let label_repo = Arc::new(MemoryLabelRepository::new());
        let label_store = Arc::new(LabelStore::new(
            storage,
            label_repo.clone() as Arc<dyn LabelRepository>,
            dyn_clock.clone(),
        ));
        let handler = Arc::new(ActionHandler::new(
            directory,
            order_book.clone() as Arc<dyn OrderBook>,
            label_store,
            dyn_clock.clone(),
        ));

        let audits = Arc::new(MemoryActionAuditStore::new());
        let leases = Arc::new(MemoryLeaseProvider::new(dyn_clock.clone()));
        let queue = Arc::new(MemoryJobQueue::new(QueueConfig::default(), dyn_clock.clone()));
        let events = Arc::new(RecordingEventSink::new());

        let (executor, worker) = wire(&clock, &audits, &leases, &queue, &handler, &events);

        Self {
            clock,
            company_id,
            audits,
            leases,
            queue,
            orders: order_book,
            labels: label_repo,
            events,
            executor,
            worker,
            handler,
        }
    }

    /// Swaps in an empty job queue over the same audit rows, as after a process restart
    pub fn restart_queue(&mut self) {
        let dyn_clock: Arc<dyn Clock> = self.clock.clone();
        self.queue = Arc::new(MemoryJobQueue::new(QueueConfig::default(), dyn_clock));
        let (executor, worker) = wire(&self.clock, &self.audits, &self.leases, &self.queue, &self.handler, &self.events);
        self.executor = executor;
        self.worker = worker;
    }
}

fn wire(
    clock: &Arc<ManualClock>,
    audits: &Arc<MemoryActionAuditStore>,
    leases: &Arc<MemoryLeaseProvider>,
    queue: &Arc<MemoryJobQueue>,
    handler: &Arc<ActionHandler>,
    events: &Arc<RecordingEventSink>,
) -> (ActionExecutor, ActionWorker) {
    let dyn_clock: Arc<dyn Clock> = clock.clone();
    let executor = ActionExecutor::new(
        audits.clone() as Arc<dyn ActionAuditStore>,
        leases.clone() as Arc<dyn LeaseProvider>,
        queue.clone() as Arc<dyn JobQueue>,
        handler.clone(),
        events.clone() as Arc<dyn ActionEventSink>,
        dyn_clock.clone(),
        ExecutorConfig::default(),
    );
    let worker = ActionWorker::new(
        queue.clone() as Arc<dyn JobQueue>,
        audits.clone() as Arc<dyn ActionAuditStore>,
        handler.clone(),
        events.clone() as Arc<dyn ActionEventSink>,
        dyn_clock,
    );
    (executor, worker)
}
