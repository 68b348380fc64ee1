//! In-process ledger store
//!
//! Used by tests, the golden-run tooling and single-node deployments. A unit
//! of work holds the store lock for its whole lifetime and mutates a private
//! copy of the state; `commit` swaps the copy in, dropping the unit discards
//! it. Units are therefore serializable with respect to each other.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use core_kernel::{
    BankConnectionId, BankStatementId, BankTransactionId, CompanyId, JournalEntryId, JournalLineId,
    Marketplace, SettlementRecordId,
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
use crate::store::{LedgerStore, LedgerTx, LedgerUnit};

/// Complete in-memory state; implements `LedgerTx` directly
#[derive(Debug, Clone, Default)]
pub struct LedgerState {
    events: Vec<DomainEvent>,
    entries: Vec<JournalEntry>,
    entry_by_source: HashMap<String, usize>,
    pnl: BTreeMap<PnlKey, MarketplaceProductPnl>,
    connections: BTreeMap<BankConnectionId, BankConnection>,
    bank_transactions: Vec<BankTransaction>,
    fingerprints: HashSet<(BankConnectionId, String)>,
    rules: Vec<MatchingRule>,
    matches: Vec<PaymentMatch>,
    statements: BTreeMap<BankStatementId, BankStatement>,
    settlements: BTreeMap<SettlementRecordId, SettlementRecord>,
    audit: Vec<AuditRecord>,
    autopilot: Vec<AutopilotConfig>,
    tripped: HashSet<CompanyId>,
    diary_outbox: Vec<DiaryEntry>,
}

impl LedgerState {
    fn lines(&self) -> impl Iterator<Item = &JournalLine> {
        self.entries.iter().flat_map(|e| e.lines.iter())
    }
}

impl LedgerTx for LedgerState {
    fn append_event(&mut self, event: DomainEvent) -> Result<(), FintechError> {
        if self.events.iter().any(|e| e.id == event.id) {
            return Err(FintechError::conflict(format!("event {} already appended", event.id)));
        }
        self.events.push(event);
        Ok(())
    }

    fn events_for_aggregate(&self, aggregate_id: &str) -> Vec<DomainEvent> {
        self.events
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .cloned()
            .collect()
    }

    fn events_for_company(&self, company_id: CompanyId) -> Vec<DomainEvent> {
        self.events
            .iter()
            .filter(|e| e.company_id == company_id)
            .cloned()
            .collect()
    }

    fn count_events_since(&self, company_id: CompanyId, type_fragment: &str, since: DateTime<Utc>) -> usize {
        self.events
            .iter()
            .filter(|e| e.company_id == company_id && e.created_at >= since)
            .filter(|e| e.event_type().contains(type_fragment))
            .count()
    }

    fn has_event_of_type(&self, company_id: CompanyId, event_type: &str) -> bool {
        self.events
            .iter()
            .any(|e| e.company_id == company_id && e.event_type() == event_type)
    }

    fn find_entry_by_source(&self, source_key: &str) -> Option<JournalEntry> {
        self.entry_by_source
            .get(source_key)
            .and_then(|&idx| self.entries.get(idx))
            .cloned()
    }

    fn insert_entry(&mut self, entry: JournalEntry) -> Result<(), FintechError> {
        if self.entry_by_source.contains_key(&entry.source_key) {
            return Err(FintechError::conflict(format!(
                "journal entry for source {} already exists",
                entry.source_key
            )));
        }
        self.entry_by_source.insert(entry.source_key.clone(), self.entries.len());
        self.entries.push(entry);
        Ok(())
    }

    fn entry(&self, entry_id: JournalEntryId) -> Option<JournalEntry> {
        self.entries.iter().find(|e| e.id == entry_id).cloned()
    }

    fn entries_for_company(&self, company_id: CompanyId) -> Vec<JournalEntry> {
        self.entries
            .iter()
            .filter(|e| e.company_id == company_id)
            .cloned()
            .collect()
    }

    fn open_lines(&self, query: &OpenLineQuery) -> Vec<JournalLine> {
        let mut lines: Vec<JournalLine> = self.lines().filter(|l| query.matches(l)).cloned().collect();
        lines.sort_by_key(|l| l.created_at);
        lines
    }

    fn close_line(&mut self, line_id: JournalLineId) -> Result<bool, FintechError> {
        let line = self
            .entries
            .iter_mut()
            .flat_map(|e| e.lines.iter_mut())
            .find(|l| l.id == line_id)
            .ok_or_else(|| FintechError::not_found("JournalLine", line_id))?;
        let was_open = line.is_open;
        line.is_open = false;
        Ok(was_open)
    }

    fn account_totals(&self, company_id: CompanyId, account_code: &str) -> AccountTotals {
        self.lines()
            .filter(|l| l.company_id == company_id && l.account_code == account_code)
            .fold(AccountTotals::default(), |mut acc, l| {
                acc.debit += l.debit;
                acc.credit += l.credit;
                acc
            })
    }

    fn pnl_row(&self, key: &PnlKey) -> Option<MarketplaceProductPnl> {
        self.pnl.get(key).cloned()
    }

    fn put_pnl_row(&mut self, row: MarketplaceProductPnl) {
        self.pnl.insert(row.key(), row);
    }

    fn pnl_rows(&self, company_id: CompanyId) -> Vec<MarketplaceProductPnl> {
        self.pnl
            .values()
            .filter(|r| r.company_id == company_id)
            .cloned()
            .collect()
    }

    fn bank_connection(&self, id: BankConnectionId) -> Option<BankConnection> {
        self.connections.get(&id).cloned()
    }

    fn bank_connections(&self, company_id: CompanyId) -> Vec<BankConnection> {
        self.connections
            .values()
            .filter(|c| c.company_id == company_id)
            .cloned()
            .collect()
    }

    fn put_bank_connection(&mut self, connection: BankConnection) {
        self.connections.insert(connection.id, connection);
    }

    fn find_bank_transaction(&self, connection_id: BankConnectionId, fingerprint: &str) -> Option<BankTransaction> {
        self.bank_transactions
            .iter()
            .find(|t| t.bank_connection_id == connection_id && t.fingerprint == fingerprint)
            .cloned()
    }

    fn bank_transaction(&self, id: BankTransactionId) -> Option<BankTransaction> {
        self.bank_transactions.iter().find(|t| t.id == id).cloned()
    }

    fn bank_transactions(&self, company_id: CompanyId) -> Vec<BankTransaction> {
        self.bank_transactions
            .iter()
            .filter(|t| t.company_id == company_id)
            .cloned()
            .collect()
    }

    fn insert_bank_transaction(&mut self, transaction: BankTransaction) -> Result<(), FintechError> {
        let key = (transaction.bank_connection_id, transaction.fingerprint.clone());
        if !self.fingerprints.insert(key) {
            return Err(FintechError::conflict(format!(
                "bank transaction with fingerprint {} already stored",
                transaction.fingerprint
            )));
        }
        self.bank_transactions.push(transaction);
        Ok(())
    }

    fn set_bank_transaction_status(
        &mut self,
        id: BankTransactionId,
        status: BankTransactionStatus,
    ) -> Result<(), FintechError> {
        let transaction = self
            .bank_transactions
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| FintechError::not_found("BankTransaction", id))?;
        transaction.status = status;
        Ok(())
    }

    fn active_rules(&self, company_id: CompanyId) -> Vec<MatchingRule> {
        let mut rules: Vec<MatchingRule> = self
            .rules
            .iter()
            .filter(|r| r.company_id == company_id && r.is_active)
            .cloned()
            .collect();
        rules.sort_by(|a, b| b.confidence.cmp(&a.confidence).then(a.created_at.cmp(&b.created_at)));
        rules
    }

    fn insert_rule(&mut self, rule: MatchingRule) {
        self.rules.push(rule);
    }

    fn match_for_transaction(&self, bank_transaction_id: BankTransactionId) -> Option<PaymentMatch> {
        self.matches
            .iter()
            .find(|m| m.bank_transaction_id == bank_transaction_id)
            .cloned()
    }

    fn insert_match(&mut self, payment_match: PaymentMatch) -> Result<(), FintechError> {
        if self.match_for_transaction(payment_match.bank_transaction_id).is_some() {
            return Err(FintechError::conflict(format!(
                "bank transaction {} already matched",
                payment_match.bank_transaction_id
            )));
        }
        self.matches.push(payment_match);
        Ok(())
    }

    fn update_match(&mut self, payment_match: PaymentMatch) -> Result<(), FintechError> {
        let slot = self
            .matches
            .iter_mut()
            .find(|m| m.id == payment_match.id)
            .ok_or_else(|| FintechError::not_found("PaymentMatch", payment_match.id))?;
        *slot = payment_match;
        Ok(())
    }

    fn matches_since(&self, company_id: CompanyId, since: DateTime<Utc>) -> Vec<PaymentMatch> {
        self.matches
            .iter()
            .filter(|m| m.company_id == company_id && m.created_at >= since)
            .cloned()
            .collect()
    }

    fn bank_statement(&self, id: BankStatementId) -> Option<BankStatement> {
        self.statements.get(&id).cloned()
    }

    fn put_bank_statement(&mut self, statement: BankStatement) {
        self.statements.insert(statement.id, statement);
    }

    fn settlement_by_reference(
        &self,
        company_id: CompanyId,
        marketplace: Marketplace,
        external_reference: &str,
    ) -> Option<SettlementRecord> {
        self.settlements
            .values()
            .find(|s| {
                s.company_id == company_id
                    && s.marketplace == marketplace
                    && s.external_reference == external_reference
            })
            .cloned()
    }

    fn settlements_for_entry(&self, entry_id: JournalEntryId) -> Vec<SettlementRecord> {
        self.settlements
            .values()
            .filter(|s| s.journal_entry_id == Some(entry_id))
            .cloned()
            .collect()
    }

    fn put_settlement(&mut self, record: SettlementRecord) {
        self.settlements.insert(record.id, record);
    }

    fn append_audit(&mut self, record: AuditRecord) {
        self.audit.push(record);
    }

    fn audit_records(&self, company_id: CompanyId) -> Vec<AuditRecord> {
        self.audit
            .iter()
            .filter(|a| a.company_id == company_id)
            .cloned()
            .collect()
    }

    fn autopilot_configs(&self, company_id: CompanyId) -> Vec<AutopilotConfig> {
        self.autopilot
            .iter()
            .filter(|c| c.company_id == company_id)
            .cloned()
            .collect()
    }

    fn put_autopilot_config(&mut self, config: AutopilotConfig) {
        match self
            .autopilot
            .iter_mut()
            .find(|c| c.company_id == config.company_id && c.name == config.name)
        {
            Some(slot) => *slot = config,
            None => self.autopilot.push(config),
        }
    }

    fn breaker_tripped(&self, company_id: CompanyId) -> bool {
        self.tripped.contains(&company_id)
    }

    fn set_breaker_tripped(&mut self, company_id: CompanyId, tripped: bool) {
        if tripped {
            self.tripped.insert(company_id);
        } else {
            self.tripped.remove(&company_id);
        }
    }

    fn queue_diary(&mut self, entry: DiaryEntry) {
        self.diary_outbox.push(entry);
    }

    fn take_diary(&mut self) -> Vec<DiaryEntry> {
        std::mem::take(&mut self.diary_outbox)
    }
}

/// `LedgerStore` over a shared `LedgerState`
#[derive(Debug, Clone, Default)]
pub struct MemoryLedgerStore {
    state: Arc<Mutex<LedgerState>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the committed state
    pub async fn snapshot(&self) -> LedgerState {
        self.state.lock().await.clone()
    }
}

struct MemoryUnit {
    guard: OwnedMutexGuard<LedgerState>,
    working: LedgerState,
}

#[async_trait]
impl LedgerUnit for MemoryUnit {
    fn tx(&mut self) -> &mut dyn LedgerTx {
        &mut self.working
    }

    async fn commit(self: Box<Self>) -> Result<(), FintechError> {
        let MemoryUnit { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerUnit>, FintechError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryUnit { guard, working }))
    }
}
