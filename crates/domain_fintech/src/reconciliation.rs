//! Settlement recording and bank statement reconciliation
//!
//! Marketplace settlement lines enter through `record_settled_transaction`,
//! which keeps a pre-accounting row per external reference and lets the
//! event log post the fee or sale to the ledger. When the marketplace payout
//! shows up on a bank statement, `reconcile_statement` compares it with the
//! receivable balance of every open 120.03 line of the company:
//!
//! | `payout - open`      | Status      | Ledger effect                                  |
//! |----------------------|-------------|------------------------------------------------|
//! | 0                    | FULL        | close lines                                    |
//! | within tolerance     | TOLERATED   | close lines, post 679.01 / 689.01 adjustment   |
//! | beyond tolerance     | MISMATCH    | lines stay open, payout parked on 397.01       |
//!
//! A statement is reconciled once; a matched statement is left untouched.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

use core_kernel::{
    BankConnectionId, BankStatementId, CompanyId, Currency, JournalEntryId, Marketplace,
    SettlementRecordId,
};

use crate::chart;
use crate::error::FintechError;
use crate::event_log::EventLog;
use crate::events::{AggregateType, EventKind, FeeType, NewEvent};
use crate::journal::{EntryDraft, LineDraft, OpenLineQuery};
use crate::poster::LedgerPoster;
use crate::store::LedgerTx;

/// Outcome class of a statement reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconciliationStatus {
    Full,
    Tolerated,
    Mismatch,
}

impl ReconciliationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconciliationStatus::Full => "FULL",
            ReconciliationStatus::Tolerated => "TOLERATED",
            ReconciliationStatus::Mismatch => "MISMATCH",
        }
    }
}

impl std::fmt::Display for ReconciliationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settlement-period summary row from the bank
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankStatement {
    pub id: BankStatementId,
    pub company_id: CompanyId,
    pub bank_connection_id: Option<BankConnectionId>,
    pub reference_no: String,
    /// Money received
    pub credit: Decimal,
    pub debit: Decimal,
    pub statement_date: DateTime<Utc>,
    pub is_matched: bool,
    pub reconciliation_status: Option<ReconciliationStatus>,
}

impl BankStatement {
    pub fn new(
        company_id: CompanyId,
        reference_no: impl Into<String>,
        credit: Decimal,
        statement_date: DateTime<Utc>,
    ) -> Self {
        Self {
            id: BankStatementId::new_v7(),
            company_id,
            bank_connection_id: None,
            reference_no: reference_no.into(),
            credit,
            debit: Decimal::ZERO,
            statement_date,
            is_matched: false,
            reconciliation_status: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingStatus {
    Pending,
    Matched,
    Reconciled,
}

/// Pre-accounting row for one marketplace settlement line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementRecord {
    pub id: SettlementRecordId,
    pub company_id: CompanyId,
    pub marketplace: Marketplace,
    pub external_reference: String,
    pub fee_type: FeeType,
    pub amount: Decimal,
    pub product_id: Option<String>,
    pub order_number: Option<String>,
    pub transaction_date: DateTime<Utc>,
    pub processing_status: ProcessingStatus,
    pub journal_entry_id: Option<JournalEntryId>,
    pub reconciliation_status: Option<ReconciliationStatus>,
    pub matched_bank_statement_id: Option<BankStatementId>,
    pub created_at: DateTime<Utc>,
}

/// Settlement line as delivered by a marketplace finance API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettledTransaction {
    /// Marketplace transaction id; unique per marketplace
    pub external_reference: String,
    pub fee_type: FeeType,
    pub amount: Decimal,
    pub product_id: Option<String>,
    pub order_number: Option<String>,
    #[serde(default)]
    pub currency: Currency,
    pub transaction_date: DateTime<Utc>,
}

/// Result of reconciling one statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationOutcome {
    pub statement_id: BankStatementId,
    pub status: ReconciliationStatus,
    pub open_total: Decimal,
    pub payout: Decimal,
    /// `payout - open_total`
    pub difference: Decimal,
    pub closed_lines: usize,
    /// Rounding or suspense entry, when one was posted
    pub adjustment_entry_id: Option<JournalEntryId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconciliationConfig {
    /// Largest absolute difference treated as rounding
    pub tolerance: Decimal,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self { tolerance: dec!(1.00) }
    }
}

pub struct SettlementReconciliationEngine {
    event_log: Arc<EventLog>,
    config: ReconciliationConfig,
}

impl SettlementReconciliationEngine {
    pub fn new(event_log: Arc<EventLog>, config: ReconciliationConfig) -> Self {
        Self { event_log, config }
    }

    /// Stores a settlement line and posts it through the event log
    ///
    /// Idempotent on `(company, marketplace, external_reference)`: a repeat
    /// returns the stored row without emitting anything.
    pub async fn record_settled_transaction(
        &self,
        company_id: CompanyId,
        marketplace: Marketplace,
        settled: SettledTransaction,
    ) -> Result<SettlementRecord, FintechError> {
        let now = self.event_log.clock().now();
        let event_log = &self.event_log;

        self.event_log
            .transaction(move |tx| {
                if let Some(existing) =
                    tx.settlement_by_reference(company_id, marketplace, &settled.external_reference)
                {
                    return Ok(existing);
                }

                let mut record = SettlementRecord {
                    id: SettlementRecordId::new_v7(),
                    company_id,
                    marketplace,
                    external_reference: settled.external_reference.clone(),
                    fee_type: settled.fee_type,
                    amount: settled.amount,
                    product_id: settled.product_id.clone(),
                    order_number: settled.order_number.clone(),
                    transaction_date: settled.transaction_date,
                    processing_status: ProcessingStatus::Pending,
                    journal_entry_id: None,
                    reconciliation_status: None,
                    matched_bank_statement_id: None,
                    created_at: now,
                };
                tx.put_settlement(record.clone());

                let event = event_log.emit_in(
                    tx,
                    NewEvent::new(
                        company_id,
                        AggregateType::Settlement,
                        record.id,
                        EventKind::MarketplaceTransactionRecorded {
                            marketplace,
                            settlement_id: record.id,
                            external_reference: settled.external_reference,
                            fee_type: settled.fee_type,
                            amount: settled.amount,
                            product_id: settled.product_id,
                            order_number: settled.order_number,
                            currency: settled.currency,
                        },
                    ),
                )?;

                if let Some(entry) = tx.find_entry_by_source(&event.id.to_string()) {
                    record.processing_status = ProcessingStatus::Matched;
                    record.journal_entry_id = Some(entry.id);
                    tx.put_settlement(record.clone());
                }
                Ok(record)
            })
            .await
    }

    /// Reconciles one bank statement against the open 120.03 lines
    ///
    /// Returns `None` when the statement was already matched.
    pub async fn reconcile_statement(
        &self,
        company_id: CompanyId,
        statement_id: BankStatementId,
    ) -> Result<Option<ReconciliationOutcome>, FintechError> {
        let now = self.event_log.clock().now();
        let event_log = &self.event_log;
        let tolerance = self.config.tolerance;

        let outcome = self
            .event_log
            .transaction(move |tx| {
                let mut statement = tx
                    .bank_statement(statement_id)
                    .filter(|s| s.company_id == company_id)
                    .ok_or_else(|| FintechError::not_found("BankStatement", statement_id))?;
                if statement.is_matched {
                    return Ok(None);
                }

                let outcome = Self::reconcile_in(tx, &statement, tolerance, now)?;

                statement.is_matched = true;
                statement.reconciliation_status = Some(outcome.status);
                tx.put_bank_statement(statement);

                event_log.emit_in(
                    tx,
                    NewEvent::new(
                        company_id,
                        AggregateType::Settlement,
                        statement_id,
                        EventKind::SettlementReconciled {
                            statement_id,
                            status: outcome.status,
                            open_total: outcome.open_total,
                            payout: outcome.payout,
                            difference: outcome.difference,
                        },
                    ),
                )?;
                Ok(Some(outcome))
            })
            .await?;

        match &outcome {
            Some(o) if o.status == ReconciliationStatus::Mismatch => warn!(
                statement_id = %statement_id,
                open_total = %o.open_total,
                payout = %o.payout,
                difference = %o.difference,
                "Statement mismatch; payout parked in suspense"
            ),
            Some(o) => info!(
                statement_id = %statement_id,
                status = %o.status,
                closed_lines = o.closed_lines,
                difference = %o.difference,
                "Statement reconciled"
            ),
            None => info!(statement_id = %statement_id, "Statement already matched"),
        }
        Ok(outcome)
    }

    fn reconcile_in(
        tx: &mut dyn LedgerTx,
        statement: &BankStatement,
        tolerance: Decimal,
        now: DateTime<Utc>,
    ) -> Result<ReconciliationOutcome, FintechError> {
        let open_lines = tx.open_lines(&OpenLineQuery::new(statement.company_id, chart::MARKETPLACE_RECEIVABLE));
        let open_total: Decimal = open_lines.iter().map(|l| l.net()).sum();
        let payout = statement.credit;
        let difference = payout - open_total;

        let status = if difference.is_zero() {
            ReconciliationStatus::Full
        } else if difference.abs() <= tolerance {
            ReconciliationStatus::Tolerated
        } else {
            ReconciliationStatus::Mismatch
        };

        let mut closed_lines = 0;
        let mut adjustment_entry_id = None;

        if status == ReconciliationStatus::Mismatch {
            if !payout.is_zero() {
                let draft = EntryDraft::new(
                    statement.company_id,
                    format!("RECON_SUSPENSE_{}", statement.id),
                    "SETTLEMENT_SUSPENSE",
                )
                .describe(format!("Suspense mismatch entry - Ref: {}", statement.reference_no))
                .line(LineDraft::debit(chart::BANK, payout))
                .line(LineDraft::credit(chart::SUSPENSE, payout).open());
                adjustment_entry_id = Some(LedgerPoster::post_draft(tx, draft, now)?.id);
            }
        } else {
            let mut entries = BTreeSet::new();
            for line in &open_lines {
                if tx.close_line(line.id)? {
                    closed_lines += 1;
                }
                entries.insert(line.entry_id);
            }
            for entry_id in entries {
                for mut record in tx.settlements_for_entry(entry_id) {
                    record.processing_status = ProcessingStatus::Reconciled;
                    record.reconciliation_status = Some(status);
                    record.matched_bank_statement_id = Some(statement.id);
                    tx.put_settlement(record);
                }
            }

            if status == ReconciliationStatus::Tolerated {
                let amount = difference.abs();
                let (debit, credit) = if difference > Decimal::ZERO {
                    (
                        LineDraft::debit(chart::MARKETPLACE_RECEIVABLE, amount),
                        LineDraft::credit(chart::ROUNDING_GAIN, amount),
                    )
                } else {
                    (
                        LineDraft::debit(chart::ROUNDING_LOSS, amount),
                        LineDraft::credit(chart::MARKETPLACE_RECEIVABLE, amount),
                    )
                };
                let draft = EntryDraft::new(
                    statement.company_id,
                    format!("TOLERANCE_{}", statement.id),
                    "SETTLEMENT_TOLERANCE",
                )
                .describe(format!("Tolerance adjustment - Ref: {}", statement.reference_no))
                .line(debit)
                .line(credit);
                adjustment_entry_id = Some(LedgerPoster::post_draft(tx, draft, now)?.id);
            }
        }

        Ok(ReconciliationOutcome {
            statement_id: statement.id,
            status,
            open_total,
            payout,
            difference,
            closed_lines,
            adjustment_entry_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::LedgerState;

    fn seed_open(state: &mut LedgerState, company: CompanyId, amount: Decimal) {
        let entry = EntryDraft::new(company, format!("seed-{amount}"), "SALE_COMPLETED")
            .line(LineDraft::debit(chart::MARKETPLACE_RECEIVABLE, amount).open())
            .line(LineDraft::credit(chart::SALES_REVENUE, amount))
            .into_entry(Utc::now())
            .unwrap();
        state.insert_entry(entry).unwrap();
    }

    fn statement(company: CompanyId, credit: Decimal) -> BankStatement {
        BankStatement::new(company, "REF-1", credit, Utc::now())
    }

    #[test]
    fn test_favorable_rounding_goes_to_gain() {
        let company = CompanyId::new();
        let mut state = LedgerState::default();
        seed_open(&mut state, company, dec!(500));

        let stmt = statement(company, dec!(500.40));
        let outcome = SettlementReconciliationEngine::reconcile_in(&mut state, &stmt, dec!(1), Utc::now()).unwrap();

        assert_eq!(outcome.status, ReconciliationStatus::Tolerated);
        assert_eq!(outcome.difference, dec!(0.40));
        let gain = state.account_totals(company, chart::ROUNDING_GAIN);
        assert_eq!(gain.credit, dec!(0.40));
        assert!(state.account_totals(company, chart::ROUNDING_LOSS).debit.is_zero());
    }

    #[test]
    fn test_tolerance_boundary_is_inclusive() {
        let company = CompanyId::new();
        let mut state = LedgerState::default();
        seed_open(&mut state, company, dec!(100));

        let stmt = statement(company, dec!(99.00));
        let outcome = SettlementReconciliationEngine::reconcile_in(&mut state, &stmt, dec!(1.00), Utc::now()).unwrap();
        assert_eq!(outcome.status, ReconciliationStatus::Tolerated);
        assert_eq!(outcome.closed_lines, 1);
    }

    #[test]
    fn test_zero_payout_mismatch_posts_nothing() {
        let company = CompanyId::new();
        let mut state = LedgerState::default();
        seed_open(&mut state, company, dec!(100));

        let stmt = statement(company, Decimal::ZERO);
        let outcome = SettlementReconciliationEngine::reconcile_in(&mut state, &stmt, dec!(1), Utc::now()).unwrap();
        assert_eq!(outcome.status, ReconciliationStatus::Mismatch);
        assert!(outcome.adjustment_entry_id.is_none());
        assert_eq!(state.entries_for_company(company).len(), 1);
    }
}
