//! Ledger poster
//!
//! Derives double-entry lines from events and posts them, at most once per
//! source key. Mapping (amounts are absolute):
//!
//! | Event                         | Debit             | Credit                          |
//! |-------------------------------|-------------------|---------------------------------|
//! | SALE_COMPLETED                | 120.03 gross open | 600.01 net, 391.01 VAT          |
//! | *_TRANSACTION_RECORDED comm.  | 760.01            | 120.03 open                     |
//! | *_TRANSACTION_RECORDED cargo  | 760.02            | 120.03 open                     |
//! | *_TRANSACTION_RECORDED fees   | 760.03            | 120.03 open                     |
//! | REFUND_COMPLETED              | 610.01            | 120.03 open                     |
//!
//! Any other event posts nothing.

use chrono::{DateTime, Utc};

use core_kernel::VatRate;

use crate::chart;
use crate::error::FintechError;
use crate::event_log::{EventHandler, ReactionContext};
use crate::events::{DomainEvent, EventKind, FeeType};
use crate::journal::{EntryDraft, JournalEntry, LineDraft};
use crate::store::LedgerTx;

#[derive(Debug, Default)]
pub struct LedgerPoster;

impl LedgerPoster {
    /// Posts the journal entry for an event, keyed by the event id
    ///
    /// Returns the existing entry when the event was already posted and
    /// `None` when the event type carries no accounting effect.
    pub fn post_to_ledger(
        tx: &mut dyn LedgerTx,
        event: &DomainEvent,
        now: DateTime<Utc>,
    ) -> Result<Option<JournalEntry>, FintechError> {
        let lines = Self::lines_for(event)?;
        if lines.is_empty() {
            return Ok(None);
        }

        let draft = EntryDraft::new(event.company_id, event.id.to_string(), event.event_type())
            .describe(format!("{} {}", event.event_type(), event.aggregate_id))
            .lines(lines);
        Self::post_draft(tx, draft, now).map(Some)
    }

    /// Posts a prepared entry; lookup-then-create on `source_key`
    pub fn post_draft(
        tx: &mut dyn LedgerTx,
        draft: EntryDraft,
        now: DateTime<Utc>,
    ) -> Result<JournalEntry, FintechError> {
        if let Some(existing) = tx.find_entry_by_source(&draft.source_key) {
            tracing::debug!(source_key = %draft.source_key, "Journal entry already posted");
            return Ok(existing);
        }

        let entry = draft.into_entry(now)?;
        tx.insert_entry(entry.clone())?;
        tracing::debug!(
            source_key = %entry.source_key,
            entry_id = %entry.id,
            amount = %entry.total_debits(),
            "Journal entry posted"
        );
        Ok(entry)
    }

    /// Deterministic line set for an event
    pub fn lines_for(event: &DomainEvent) -> Result<Vec<LineDraft>, FintechError> {
        let lines = match &event.kind {
            EventKind::SaleCompleted {
                order_number,
                gross_amount,
                tax_rate,
                currency,
                ..
            } => {
                let rate = match tax_rate {
                    Some(pct) => VatRate::from_percentage(*pct).map_err(core_kernel::CoreError::from)?,
                    None => VatRate::STANDARD,
                };
                let split = rate.split_gross(gross_amount.abs(), *currency);
                vec![
                    LineDraft::debit(chart::MARKETPLACE_RECEIVABLE, split.gross)
                        .open()
                        .with_reference(Some(order_number.clone())),
                    LineDraft::credit(chart::SALES_REVENUE, split.net),
                    LineDraft::credit(chart::VAT_PAYABLE, split.vat),
                ]
            }
            EventKind::MarketplaceTransactionRecorded {
                fee_type,
                amount,
                external_reference,
                ..
            } => {
                let expense = match fee_type {
                    FeeType::Commission => chart::COMMISSION_EXPENSE,
                    FeeType::Shipping => chart::SHIPPING_EXPENSE,
                    FeeType::ServiceFee | FeeType::OtherFee => chart::MARKETPLACE_FEES,
                    FeeType::Sale | FeeType::Other => return Ok(Vec::new()),
                };
                let amount = amount.abs();
                vec![
                    LineDraft::debit(expense, amount),
                    LineDraft::credit(chart::MARKETPLACE_RECEIVABLE, amount)
                        .open()
                        .with_reference(Some(external_reference.clone())),
                ]
            }
            EventKind::RefundCompleted {
                order_number,
                refund_amount,
                ..
            } => {
                let amount = refund_amount.abs();
                vec![
                    LineDraft::debit(chart::SALES_RETURNS, amount),
                    LineDraft::credit(chart::MARKETPLACE_RECEIVABLE, amount)
                        .open()
                        .with_reference(Some(order_number.clone())),
                ]
            }
            _ => Vec::new(),
        };
        Ok(lines)
    }
}

impl EventHandler for LedgerPoster {
    fn name(&self) -> &'static str {
        "ledger-poster"
    }

    fn handle(
        &self,
        tx: &mut dyn LedgerTx,
        event: &DomainEvent,
        ctx: &mut ReactionContext,
    ) -> Result<(), FintechError> {
        Self::post_to_ledger(tx, event, ctx.now()).map(|_| ())
    }
}
