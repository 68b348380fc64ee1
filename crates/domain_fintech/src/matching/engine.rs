//! Payment matching engine
//!
//! Reacts to `BANK_TRANSACTION_IMPORTED` inside the ingestion transaction:
//!
//! 1. an active rule whose pattern occurs in the description wins outright;
//! 2. otherwise a systematic match looks for exactly one open receivable
//!    (inbound) or payable (outbound) line carrying the same amount;
//! 3. the score is bucketed and the bucket decides what happens next.
//!
//! | Bucket | Live (`LIVE_ALL`)                     | Dry run / live pull |
//! |--------|---------------------------------------|---------------------|
//! | HIGH   | auto-confirm, post `MATCH_{id}` entry | match stays PENDING |
//! | MEDIUM | PENDING for manual review             | same                |
//! | LOW    | suspense entry + diary line           | diary line only     |

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use core_kernel::{BankTransactionId, CompanyId, JournalEntryId, JournalLineId, MatchingRuleId, PaymentMatchId};

use crate::banking::{BankTransactionStatus, Direction, TransactionTags};
use crate::chart;
use crate::error::FintechError;
use crate::event_log::{EventHandler, ReactionContext};
use crate::events::{AggregateType, DomainEvent, EventKind, NewEvent};
use crate::journal::{EntryDraft, JournalLine, LineDraft, OpenLineQuery};
use crate::poster::LedgerPoster;
use crate::store::LedgerTx;

use super::diary::DiaryEntry;
use super::rules::MatchingRule;

const FIRST_REAL_MONEY_RECEIVED: &str = "FIRST_REAL_MONEY_RECEIVED";

/// Confidence bucket; lower bounds are inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfidenceBucket {
    High,
    Medium,
    Low,
}

impl ConfidenceBucket {
    pub const HIGH_FLOOR: u8 = 85;
    pub const MEDIUM_FLOOR: u8 = 60;

    pub fn from_score(score: u8) -> Self {
        if score >= Self::HIGH_FLOOR {
            ConfidenceBucket::High
        } else if score >= Self::MEDIUM_FLOOR {
            ConfidenceBucket::Medium
        } else {
            ConfidenceBucket::Low
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchType {
    Rule,
    Systematic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    Pending,
    Confirmed,
}

/// Matching decision for one bank transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMatch {
    pub id: PaymentMatchId,
    pub company_id: CompanyId,
    pub bank_transaction_id: BankTransactionId,
    /// 0..=100
    pub confidence_score: u8,
    pub confidence_bucket: ConfidenceBucket,
    pub match_type: MatchType,
    pub status: MatchStatus,
    pub rule_id: Option<MatchingRuleId>,
    pub matched_line_id: Option<JournalLineId>,
    /// Account the bank amount is offset against
    pub counter_account: Option<String>,
    pub journal_entry_id: Option<JournalEntryId>,
    pub created_at: DateTime<Utc>,
}

/// Matching engine configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchingConfig {
    /// Score given to a unique amount match on an open line
    pub systematic_confidence: u8,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            systematic_confidence: 90,
        }
    }
}

enum Candidate {
    Rule(MatchingRule),
    Systematic(JournalLine),
    Nothing,
}

struct ImportedLine<'a> {
    company_id: CompanyId,
    bank_transaction_id: BankTransactionId,
    amount: Decimal,
    direction: Direction,
    description: &'a str,
    tags: &'a TransactionTags,
}

pub struct PaymentMatchingEngine {
    config: MatchingConfig,
}

impl PaymentMatchingEngine {
    pub fn new(config: MatchingConfig) -> Self {
        Self { config }
    }

    /// Scores and acts on an imported bank transaction
    ///
    /// Returns `None` for any other event. A transaction that already has a
    /// match returns that match unchanged.
    pub fn process_bank_transaction(
        &self,
        tx: &mut dyn LedgerTx,
        event: &DomainEvent,
        ctx: &mut ReactionContext,
    ) -> Result<Option<PaymentMatch>, FintechError> {
        let EventKind::BankTransactionImported {
            bank_transaction_id,
            amount,
            direction,
            description,
            tags,
            ..
        } = &event.kind
        else {
            return Ok(None);
        };
        let line = ImportedLine {
            company_id: event.company_id,
            bank_transaction_id: *bank_transaction_id,
            amount: *amount,
            direction: *direction,
            description,
            tags,
        };

        if let Some(existing) = tx.match_for_transaction(line.bank_transaction_id) {
            return Ok(Some(existing));
        }

        let candidate = self.find_candidate(tx, &line);
        let (score, match_type, rule_id, matched_line_id, counter_account) = match &candidate {
            Candidate::Rule(rule) => (rule.confidence, MatchType::Rule, Some(rule.id), None, Some(rule.account_code.clone())),
            Candidate::Systematic(open) => (
                self.config.systematic_confidence,
                MatchType::Systematic,
                None,
                Some(open.id),
                Some(open.account_code.clone()),
            ),
            Candidate::Nothing => (0, MatchType::Systematic, None, None, None),
        };
        let bucket = ConfidenceBucket::from_score(score);

        let mut payment_match = PaymentMatch {
            id: PaymentMatchId::new_v7(),
            company_id: line.company_id,
            bank_transaction_id: line.bank_transaction_id,
            confidence_score: score,
            confidence_bucket: bucket,
            match_type,
            status: MatchStatus::Pending,
            rule_id,
            matched_line_id,
            counter_account,
            journal_entry_id: None,
            created_at: ctx.now(),
        };
        tx.insert_match(payment_match.clone())?;

        let mode = ctx.mode();
        let live = mode.allows_ledger_side_effects();
        match bucket {
            ConfidenceBucket::High if !live => {
                debug!(match_id = %payment_match.id, mode = %mode, "HIGH match left pending outside live mode");
            }
            ConfidenceBucket::High if tx.breaker_tripped(line.company_id) => {
                warn!(match_id = %payment_match.id, company_id = %line.company_id, "Safety breaker tripped; auto-confirm skipped");
            }
            ConfidenceBucket::High => {
                self.auto_confirm(tx, &mut payment_match, &line, ctx)?;
            }
            ConfidenceBucket::Medium => {
                info!(
                    match_id = %payment_match.id,
                    score,
                    description = %line.description,
                    "Medium confidence match; manual review suggested"
                );
            }
            ConfidenceBucket::Low => {
                if live {
                    Self::post_suspense(tx, &line, ctx.now())?;
                }
                tx.queue_diary(Self::diary_entry(&line, score, mode, live, ctx.now()));
            }
        }

        Ok(Some(payment_match))
    }

    fn find_candidate(&self, tx: &dyn LedgerTx, line: &ImportedLine<'_>) -> Candidate {
        if let Some(rule) = tx
            .active_rules(line.company_id)
            .into_iter()
            .find(|r| r.matches(line.description))
        {
            return Candidate::Rule(rule);
        }

        let prefix = match line.direction {
            Direction::In => chart::RECEIVABLE_PREFIX,
            Direction::Out => chart::PAYABLE_PREFIX,
        };
        let mut open = tx.open_lines(&OpenLineQuery::new(line.company_id, prefix).with_amount(line.amount));
        if open.len() == 1 {
            open.pop().map_or(Candidate::Nothing, Candidate::Systematic)
        } else {
            if open.len() > 1 {
                debug!(candidates = open.len(), amount = %line.amount, "Ambiguous systematic match");
            }
            Candidate::Nothing
        }
    }

    fn auto_confirm(
        &self,
        tx: &mut dyn LedgerTx,
        payment_match: &mut PaymentMatch,
        line: &ImportedLine<'_>,
        ctx: &mut ReactionContext,
    ) -> Result<(), FintechError> {
        let counter = payment_match
            .counter_account
            .clone()
            .unwrap_or_else(|| chart::MARKETPLACE_RECEIVABLE.to_string());
        let (debit_account, credit_account) = match line.direction {
            Direction::In => (chart::BANK.to_string(), counter),
            Direction::Out => (counter, chart::BANK.to_string()),
        };

        let draft = EntryDraft::new(line.company_id, format!("MATCH_{}", payment_match.id), "BANK_MATCH_CONFIRMED")
            .describe(format!("Auto-confirmed bank match: {}", line.description))
            .line(LineDraft::debit(debit_account, line.amount))
            .line(LineDraft::credit(credit_account, line.amount));
        let entry = LedgerPoster::post_draft(tx, draft, ctx.now())?;

        if let Some(line_id) = payment_match.matched_line_id {
            tx.close_line(line_id)?;
        }

        payment_match.status = MatchStatus::Confirmed;
        payment_match.journal_entry_id = Some(entry.id);
        tx.update_match(payment_match.clone())?;
        tx.set_bank_transaction_status(line.bank_transaction_id, BankTransactionStatus::Reconciled)?;

        info!(
            match_id = %payment_match.id,
            journal_entry_id = %entry.id,
            amount = %line.amount,
            "Auto-confirmed HIGH confidence match"
        );

        ctx.emit(NewEvent::new(
            line.company_id,
            AggregateType::Journal,
            payment_match.id,
            EventKind::BankMatchConfirmed {
                match_id: payment_match.id,
                bank_transaction_id: line.bank_transaction_id,
                journal_entry_id: Some(entry.id),
                amount: line.amount,
                direction: line.direction,
            },
        ));

        if !tx.has_event_of_type(line.company_id, FIRST_REAL_MONEY_RECEIVED) {
            let currency = tx
                .bank_transaction(line.bank_transaction_id)
                .map(|t| t.currency)
                .unwrap_or_default();
            ctx.emit(NewEvent::new(
                line.company_id,
                AggregateType::Journal,
                line.bank_transaction_id,
                EventKind::FirstRealMoneyReceived {
                    bank_transaction_id: line.bank_transaction_id,
                    amount: line.amount,
                    currency,
                },
            ));
        }
        Ok(())
    }

    fn post_suspense(
        tx: &mut dyn LedgerTx,
        line: &ImportedLine<'_>,
        now: DateTime<Utc>,
    ) -> Result<(), FintechError> {
        let (debit, credit) = match line.direction {
            Direction::In => (
                LineDraft::debit(chart::BANK, line.amount),
                LineDraft::credit(chart::SUSPENSE, line.amount).open(),
            ),
            Direction::Out => (
                LineDraft::debit(chart::SUSPENSE, line.amount).open(),
                LineDraft::credit(chart::BANK, line.amount),
            ),
        };
        let draft = EntryDraft::new(
            line.company_id,
            format!("SUSPENSE_{}", line.bank_transaction_id),
            "BANK_TRANSACTION_SUSPENSE",
        )
        .describe(format!("Suspense: {}", line.description))
        .line(debit)
        .line(credit);

        LedgerPoster::post_draft(tx, draft, now)?;
        tx.set_bank_transaction_status(line.bank_transaction_id, BankTransactionStatus::Suspense)?;
        Ok(())
    }

    fn diary_entry(
        line: &ImportedLine<'_>,
        score: u8,
        mode: crate::mode::OperatingMode,
        posted_to_suspense: bool,
        now: DateTime<Utc>,
    ) -> DiaryEntry {
        DiaryEntry {
            company_id: line.company_id,
            bank_transaction_id: line.bank_transaction_id,
            description: line.description.to_string(),
            amount: line.amount,
            direction: line.direction,
            confidence_score: score,
            mode,
            posted_to_suspense,
            tags: line.tags.clone(),
            recorded_at: now,
        }
    }
}

impl EventHandler for PaymentMatchingEngine {
    fn name(&self) -> &'static str {
        "payment-matching"
    }

    fn handle(
        &self,
        tx: &mut dyn LedgerTx,
        event: &DomainEvent,
        ctx: &mut ReactionContext,
    ) -> Result<(), FintechError> {
        self.process_bank_transaction(tx, event, ctx).map(|_| ())
    }
}
