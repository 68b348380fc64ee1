//! Transactional store port for the financial core
//!
//! All reads and writes of the event log, ledger and derived projections go
//! through a `LedgerTx`. A unit of work is a synchronous closure, so nothing
//! can await inside the critical section: external I/O happens before or
//! after `transaction`, never inside it.
//!
//! ```rust,ignore
//! let entry = store
//!     .transaction(|tx| LedgerPoster::post_draft(tx, draft, now))
//!     .await?;
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use core_kernel::{
    BankConnectionId, BankStatementId, BankTransactionId, CompanyId, JournalEntryId, JournalLineId,
    Marketplace,
};

use crate::audit::AuditRecord;
use crate::banking::{BankConnection, BankTransaction, BankTransactionStatus};
use crate::chart::AccountTotals;
use crate::error::FintechError;
use crate::events::DomainEvent;
use crate::journal::{JournalEntry, JournalLine, OpenLineQuery};
use crate::matching::{DiaryEntry, MatchingRule, PaymentMatch};
use crate::pnl::{MarketplaceProductPnl, PnlKey};
use crate::reconciliation::{BankStatement, SettlementRecord};
use crate::safety::AutopilotConfig;

/// Operations available inside one store transaction
///
/// Unique constraints enforced by implementations:
/// - one journal entry per `source_key`
/// - one bank transaction per `(bank_connection_id, fingerprint)`
/// - one payment match per bank transaction
pub trait LedgerTx {
    // Event log
    fn append_event(&mut self, event: DomainEvent) -> Result<(), FintechError>;
    /// Events for an aggregate, in append order
    fn events_for_aggregate(&self, aggregate_id: &str) -> Vec<DomainEvent>;
    fn events_for_company(&self, company_id: CompanyId) -> Vec<DomainEvent>;
    /// Events whose type contains `type_fragment`, created at or after `since`
    fn count_events_since(&self, company_id: CompanyId, type_fragment: &str, since: DateTime<Utc>) -> usize;
    fn has_event_of_type(&self, company_id: CompanyId, event_type: &str) -> bool;

    // Journal
    fn find_entry_by_source(&self, source_key: &str) -> Option<JournalEntry>;
    fn insert_entry(&mut self, entry: JournalEntry) -> Result<(), FintechError>;
    fn entry(&self, entry_id: JournalEntryId) -> Option<JournalEntry>;
    fn entries_for_company(&self, company_id: CompanyId) -> Vec<JournalEntry>;
    /// Open lines matching the query, oldest first
    fn open_lines(&self, query: &OpenLineQuery) -> Vec<JournalLine>;
    /// Closes a line; returns false if it was already closed
    fn close_line(&mut self, line_id: JournalLineId) -> Result<bool, FintechError>;
    fn account_totals(&self, company_id: CompanyId, account_code: &str) -> AccountTotals;

    // P&L
    fn pnl_row(&self, key: &PnlKey) -> Option<MarketplaceProductPnl>;
    fn put_pnl_row(&mut self, row: MarketplaceProductPnl);
    fn pnl_rows(&self, company_id: CompanyId) -> Vec<MarketplaceProductPnl>;

    // Banking
    fn bank_connection(&self, id: BankConnectionId) -> Option<BankConnection>;
    fn bank_connections(&self, company_id: CompanyId) -> Vec<BankConnection>;
    fn put_bank_connection(&mut self, connection: BankConnection);
    fn find_bank_transaction(&self, connection_id: BankConnectionId, fingerprint: &str) -> Option<BankTransaction>;
    fn bank_transaction(&self, id: BankTransactionId) -> Option<BankTransaction>;
    fn bank_transactions(&self, company_id: CompanyId) -> Vec<BankTransaction>;
    fn insert_bank_transaction(&mut self, transaction: BankTransaction) -> Result<(), FintechError>;
    fn set_bank_transaction_status(
        &mut self,
        id: BankTransactionId,
        status: BankTransactionStatus,
    ) -> Result<(), FintechError>;

    // Matching
    fn active_rules(&self, company_id: CompanyId) -> Vec<MatchingRule>;
    fn insert_rule(&mut self, rule: MatchingRule);
    fn match_for_transaction(&self, bank_transaction_id: BankTransactionId) -> Option<PaymentMatch>;
    fn insert_match(&mut self, payment_match: PaymentMatch) -> Result<(), FintechError>;
    fn update_match(&mut self, payment_match: PaymentMatch) -> Result<(), FintechError>;
    fn matches_since(&self, company_id: CompanyId, since: DateTime<Utc>) -> Vec<PaymentMatch>;

    // Reconciliation
    fn bank_statement(&self, id: BankStatementId) -> Option<BankStatement>;
    fn put_bank_statement(&mut self, statement: BankStatement);
    fn settlement_by_reference(
        &self,
        company_id: CompanyId,
        marketplace: Marketplace,
        external_reference: &str,
    ) -> Option<SettlementRecord>;
    fn settlements_for_entry(&self, entry_id: JournalEntryId) -> Vec<SettlementRecord>;
    fn put_settlement(&mut self, record: SettlementRecord);

    // Audit and safety
    fn append_audit(&mut self, record: AuditRecord);
    fn audit_records(&self, company_id: CompanyId) -> Vec<AuditRecord>;
    fn autopilot_configs(&self, company_id: CompanyId) -> Vec<AutopilotConfig>;
    fn put_autopilot_config(&mut self, config: AutopilotConfig);
    fn breaker_tripped(&self, company_id: CompanyId) -> bool;
    fn set_breaker_tripped(&mut self, company_id: CompanyId, tripped: bool);

    // Post-commit outbox
    /// Holds a diary line until the unit commits; a rollback drops it
    fn queue_diary(&mut self, entry: DiaryEntry);
    fn take_diary(&mut self) -> Vec<DiaryEntry>;
}

/// An open unit of work; dropping it without `commit` rolls back
#[async_trait]
pub trait LedgerUnit: Send {
    fn tx(&mut self) -> &mut dyn LedgerTx;

    async fn commit(self: Box<Self>) -> Result<(), FintechError>;
}

/// Transactional ledger store
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn LedgerUnit>, FintechError>;
}

impl dyn LedgerStore {
    /// Runs `work` atomically: commits on `Ok`, rolls back on `Err`
    pub async fn transaction<T, F>(&self, work: F) -> Result<T, FintechError>
    where
        F: FnOnce(&mut dyn LedgerTx) -> Result<T, FintechError> + Send,
        T: Send,
    {
        let mut unit = self.begin().await?;
        let value = work(unit.tx())?;
        unit.commit().await?;
        Ok(value)
    }

    /// Runs a read-only unit of work
    pub async fn read<T, F>(&self, work: F) -> Result<T, FintechError>
    where
        F: FnOnce(&dyn LedgerTx) -> Result<T, FintechError> + Send,
        T: Send,
    {
        let mut unit = self.begin().await?;
        work(unit.tx())
    }
}
