//! Journal entries and lines
//!
//! Entries are immutable once posted. The only later mutation is flipping a
//! line's `is_open` flag to false when a settlement or bank match closes it.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::{CompanyId, JournalEntryId, JournalLineId};

use crate::error::FintechError;

/// A single debit or credit line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalLine {
    pub id: JournalLineId,
    pub entry_id: JournalEntryId,
    pub company_id: CompanyId,
    pub account_code: String,
    pub debit: Decimal,
    pub credit: Decimal,
    /// Unsettled receivable/payable line eligible for reconciliation
    pub is_open: bool,
    pub external_reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl JournalLine {
    /// Receivable-side balance of this line (`debit - credit`)
    pub fn net(&self) -> Decimal {
        self.debit - self.credit
    }
}

/// A posted, balanced journal entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    pub id: JournalEntryId,
    pub company_id: CompanyId,
    /// Idempotency anchor: the source event id or a derived key such as `MATCH_{id}`
    pub source_key: String,
    pub event_type: String,
    pub description: String,
    pub lines: Vec<JournalLine>,
    pub created_at: DateTime<Utc>,
}

impl JournalEntry {
    pub fn total_debits(&self) -> Decimal {
        self.lines.iter().map(|l| l.debit).sum()
    }

    pub fn total_credits(&self) -> Decimal {
        self.lines.iter().map(|l| l.credit).sum()
    }

    pub fn lines_for(&self, account_code: &str) -> impl Iterator<Item = &JournalLine> {
        let code = account_code.to_string();
        self.lines.iter().filter(move |l| l.account_code == code)
    }
}

/// Line of an entry being built
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineDraft {
    pub account_code: String,
    pub debit: Decimal,
    pub credit: Decimal,
    pub is_open: bool,
    pub external_reference: Option<String>,
}

impl LineDraft {
    pub fn debit(account_code: impl Into<String>, amount: Decimal) -> Self {
        Self {
            account_code: account_code.into(),
            debit: amount,
            credit: Decimal::ZERO,
            is_open: false,
            external_reference: None,
        }
    }

    pub fn credit(account_code: impl Into<String>, amount: Decimal) -> Self {
        Self {
            account_code: account_code.into(),
            debit: Decimal::ZERO,
            credit: amount,
            is_open: false,
            external_reference: None,
        }
    }

    /// Marks the line as an open receivable/payable
    pub fn open(mut self) -> Self {
        self.is_open = true;
        self
    }

    pub fn with_reference(mut self, reference: Option<String>) -> Self {
        self.external_reference = reference;
        self
    }
}

/// Builder for a journal entry
///
/// # Example
///
/// ```rust,ignore
/// let draft = EntryDraft::new(company_id, "MATCH_42", "BANK_MATCH_CONFIRMED")
///     .describe("Auto-confirmed bank match")
///     .line(LineDraft::debit(chart::BANK, amount))
///     .line(LineDraft::credit(chart::MARKETPLACE_RECEIVABLE, amount));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDraft {
    pub company_id: CompanyId,
    pub source_key: String,
    pub event_type: String,
    pub description: String,
    pub lines: Vec<LineDraft>,
}

impl EntryDraft {
    pub fn new(company_id: CompanyId, source_key: impl Into<String>, event_type: impl Into<String>) -> Self {
        Self {
            company_id,
            source_key: source_key.into(),
            event_type: event_type.into(),
            description: String::new(),
            lines: Vec::new(),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn line(mut self, line: LineDraft) -> Self {
        self.lines.push(line);
        self
    }

    pub fn lines(mut self, lines: impl IntoIterator<Item = LineDraft>) -> Self {
        self.lines.extend(lines);
        self
    }

    /// Checks if the entry is balanced
    pub fn is_balanced(&self) -> bool {
        let (debits, credits) = self.totals();
        debits == credits
    }

    fn totals(&self) -> (Decimal, Decimal) {
        self.lines.iter().fold((Decimal::ZERO, Decimal::ZERO), |(d, c), line| {
            (d + line.debit, c + line.credit)
        })
    }

    /// Validates and stamps the entry
    ///
    /// Zero lines (e.g. VAT at a 0% rate) are dropped. An empty or
    /// unbalanced line set is rejected.
    pub fn into_entry(self, now: DateTime<Utc>) -> Result<JournalEntry, FintechError> {
        let (debits, credits) = self.totals();
        if debits != credits {
            return Err(FintechError::UnbalancedEntry { debits, credits });
        }

        let entry_id = JournalEntryId::new_v7();
        let company_id = self.company_id;
        let lines: Vec<JournalLine> = self
            .lines
            .into_iter()
            .filter(|l| !(l.debit.is_zero() && l.credit.is_zero()))
            .map(|l| JournalLine {
                id: JournalLineId::new_v7(),
                entry_id,
                company_id,
                account_code: l.account_code,
                debit: l.debit,
                credit: l.credit,
                is_open: l.is_open,
                external_reference: l.external_reference,
                created_at: now,
            })
            .collect();

        if lines.is_empty() {
            return Err(FintechError::EmptyEntry(self.source_key));
        }

        Ok(JournalEntry {
            id: entry_id,
            company_id,
            source_key: self.source_key,
            event_type: self.event_type,
            description: self.description,
            lines,
            created_at: now,
        })
    }
}

/// Filter for open journal lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenLineQuery {
    pub company_id: CompanyId,
    pub account_prefix: String,
    /// Matches lines whose debit or credit equals this amount
    pub amount: Option<Decimal>,
}

impl OpenLineQuery {
    pub fn new(company_id: CompanyId, account_prefix: impl Into<String>) -> Self {
        Self {
            company_id,
            account_prefix: account_prefix.into(),
            amount: None,
        }
    }

    pub fn with_amount(mut self, amount: Decimal) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn matches(&self, line: &JournalLine) -> bool {
        line.is_open
            && line.company_id == self.company_id
            && line.account_code.starts_with(&self.account_prefix)
            && self
                .amount
                .map_or(true, |amt| line.debit == amt || line.credit == amt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_unbalanced_entry_rejected() {
        let result = EntryDraft::new(CompanyId::new(), "evt", "SALE_COMPLETED")
            .line(LineDraft::debit("120.03", dec!(100)))
            .line(LineDraft::credit("600.01", dec!(90)))
            .into_entry(Utc::now());

        assert!(matches!(
            result,
            Err(FintechError::UnbalancedEntry { debits, credits }) if debits == dec!(100) && credits == dec!(90)
        ));
    }

    #[test]
    fn test_zero_lines_dropped() {
        let entry = EntryDraft::new(CompanyId::new(), "evt", "SALE_COMPLETED")
            .line(LineDraft::debit("120.03", dec!(100)).open())
            .line(LineDraft::credit("600.01", dec!(100)))
            .line(LineDraft::credit("391.01", dec!(0)))
            .into_entry(Utc::now())
            .unwrap();

        assert_eq!(entry.lines.len(), 2);
        assert!(entry.lines[0].is_open);
        assert_eq!(entry.total_debits(), entry.total_credits());
    }

    #[test]
    fn test_empty_entry_rejected() {
        let result = EntryDraft::new(CompanyId::new(), "evt", "NOOP").into_entry(Utc::now());
        assert!(matches!(result, Err(FintechError::EmptyEntry(_))));
    }

    #[test]
    fn test_open_line_query_amount_filter() {
        let company = CompanyId::new();
        let entry = EntryDraft::new(company, "evt", "SALE_COMPLETED")
            .line(LineDraft::debit("120.03", dec!(250)).open())
            .line(LineDraft::credit("600.01", dec!(250)))
            .into_entry(Utc::now())
            .unwrap();

        let query = OpenLineQuery::new(company, "120").with_amount(dec!(250));
        assert!(query.matches(&entry.lines[0]));
        assert!(!query.matches(&entry.lines[1]));
        assert!(!OpenLineQuery::new(company, "120").with_amount(dec!(1)).matches(&entry.lines[0]));
    }
}
