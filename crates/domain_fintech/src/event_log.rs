//! Append-only domain event log
//!
//! `emit` appends an event and runs every registered reaction inside the
//! same store transaction, so an event is never visible without its ledger
//! posting, P&L update and matching decision (or the reverse). Reactions run
//! in registration order:
//!
//! 1. `LedgerPoster`
//! 2. `PnlAggregator`
//! 3. `PaymentMatchingEngine`
//!
//! A reaction that wants to announce something (a confirmed match, the first
//! real money) queues a follow-up on its `ReactionContext`. Follow-ups are
//! appended and dispatched after the current event, still inside the same
//! transaction.
//!
//! Edge-case diary lines queued during a unit of work are written only after
//! it commits. Units that may emit go through [`EventLog::transaction`].

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, error, warn};

use core_kernel::{Clock, CompanyId};

use crate::error::FintechError;
use crate::events::{DomainEvent, NewEvent};
use crate::matching::{DiaryEntry, EdgeCaseDiary, MatchingConfig, PaymentMatchingEngine};
use crate::mode::OperatingMode;
use crate::pnl::PnlAggregator;
use crate::poster::LedgerPoster;
use crate::store::{LedgerStore, LedgerTx};

/// A synchronous reaction to appended events
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &'static str;

    fn handle(
        &self,
        tx: &mut dyn LedgerTx,
        event: &DomainEvent,
        ctx: &mut ReactionContext,
    ) -> Result<(), FintechError>;
}

/// Per-event context handed to reactions
#[derive(Debug)]
pub struct ReactionContext {
    now: DateTime<Utc>,
    mode: OperatingMode,
    follow_ups: Vec<NewEvent>,
}

impl ReactionContext {
    pub fn new(now: DateTime<Utc>, mode: OperatingMode) -> Self {
        Self {
            now,
            mode,
            follow_ups: Vec::new(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Effective operating mode for the event being handled
    pub fn mode(&self) -> OperatingMode {
        self.mode
    }

    /// Queues an event to be appended after the current one
    pub fn emit(&mut self, event: NewEvent) {
        self.follow_ups.push(event);
    }

    /// Returns queued follow-ups and clears them
    pub fn take_events(&mut self) -> Vec<NewEvent> {
        std::mem::take(&mut self.follow_ups)
    }
}

pub struct EventLog {
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    default_mode: OperatingMode,
    handlers: Vec<Arc<dyn EventHandler>>,
    diary: Arc<dyn EdgeCaseDiary>,
}

impl EventLog {
    /// Creates a log with an explicit reaction list
    pub fn new(
        store: Arc<dyn LedgerStore>,
        clock: Arc<dyn Clock>,
        default_mode: OperatingMode,
        handlers: Vec<Arc<dyn EventHandler>>,
        diary: Arc<dyn EdgeCaseDiary>,
    ) -> Self {
        Self {
            store,
            clock,
            default_mode,
            handlers,
            diary,
        }
    }

    /// Creates a log wired with the standard reactions
    pub fn with_standard_handlers(
        store: Arc<dyn LedgerStore>,
        clock: Arc<dyn Clock>,
        default_mode: OperatingMode,
        matching: MatchingConfig,
        diary: Arc<dyn EdgeCaseDiary>,
    ) -> Self {
        let handlers: Vec<Arc<dyn EventHandler>> = vec![
            Arc::new(LedgerPoster),
            Arc::new(PnlAggregator),
            Arc::new(PaymentMatchingEngine::new(matching)),
        ];
        Self::new(store, clock, default_mode, handlers, diary)
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn default_mode(&self) -> OperatingMode {
        self.default_mode
    }

    /// Appends an event and its reactions in one transaction
    pub async fn emit(&self, event: NewEvent) -> Result<DomainEvent, FintechError> {
        self.transaction(|tx| self.emit_in(tx, event)).await
    }

    /// Runs `work` in one store transaction, then writes the diary lines it queued
    pub async fn transaction<T, F>(&self, work: F) -> Result<T, FintechError>
    where
        F: FnOnce(&mut dyn LedgerTx) -> Result<T, FintechError> + Send,
        T: Send,
    {
        let (value, diary) = self
            .store
            .transaction(|tx| {
                let value = work(tx)?;
                Ok((value, tx.take_diary()))
            })
            .await?;
        self.write_diary(&diary);
        Ok(value)
    }

    fn write_diary(&self, entries: &[DiaryEntry]) {
        for entry in entries {
            // Advisory: a failed write never undoes the committed unit
            if let Err(e) = self.diary.record(entry) {
                warn!(bank_transaction_id = %entry.bank_transaction_id, error = %e, "Edge case diary write failed");
            }
        }
    }

    /// Appends an event inside a caller-owned transaction
    ///
    /// Returns the recorded form of `event`; follow-ups queued by reactions
    /// are appended too but not returned.
    pub fn emit_in(&self, tx: &mut dyn LedgerTx, event: NewEvent) -> Result<DomainEvent, FintechError> {
        let mut pending = VecDeque::from([event]);
        let mut first = None;

        while let Some(next) = pending.pop_front() {
            let now = self.clock.now();
            let recorded = DomainEvent::record(next, now);
            tx.append_event(recorded.clone())?;

            let mode = OperatingMode::resolve(recorded.metadata.mode, self.default_mode);
            let mut ctx = ReactionContext::new(now, mode);
            for handler in &self.handlers {
                handler.handle(tx, &recorded, &mut ctx).map_err(|e| {
                    error!(
                        handler = handler.name(),
                        event_id = %recorded.id,
                        event_type = %recorded.event_type(),
                        error = %e,
                        "Event reaction failed"
                    );
                    e
                })?;
            }

            debug!(
                event_id = %recorded.id,
                event_type = %recorded.event_type(),
                aggregate_id = %recorded.aggregate_id,
                mode = %mode,
                "Event appended"
            );

            // Follow-ups inherit the mode of the event that caused them
            for mut follow_up in ctx.take_events() {
                follow_up.metadata.mode.get_or_insert(mode);
                if follow_up.metadata.correlation_id.is_none() {
                    follow_up.metadata.correlation_id = Some(recorded.id.to_string());
                }
                pending.push_back(follow_up);
            }

            if first.is_none() {
                first = Some(recorded);
            }
        }

        first.ok_or_else(|| FintechError::Storage("event log produced no event".into()))
    }

    /// Events of one aggregate in append order
    pub async fn history(&self, aggregate_id: &str) -> Result<Vec<DomainEvent>, FintechError> {
        self.store
            .read(|tx| Ok(tx.events_for_aggregate(aggregate_id)))
            .await
    }

    /// Every event of a company in append order
    pub async fn company_events(&self, company_id: CompanyId) -> Result<Vec<DomainEvent>, FintechError> {
        self.store
            .read(|tx| Ok(tx.events_for_company(company_id)))
            .await
    }
}
