//! Custom Test Assertions
//!
//! Provides specialized assertion helpers for ledger types that give
//! more meaningful error messages than standard assertions.

use rust_decimal::Decimal;

use domain_fintech::{JournalEntry, LedgerState, LedgerTx, MarketplaceProductPnl};
use core_kernel::CompanyId;

/// Asserts that an entry's debits equal its credits
pub fn assert_balanced(entry: &JournalEntry) {
    assert_eq!(
        entry.total_debits(),
        entry.total_credits(),
        "Entry {} ({}) is unbalanced: debits={}, credits={}",
        entry.source_key,
        entry.event_type,
        entry.total_debits(),
        entry.total_credits()
    );
}

/// Asserts that every entry of the company is balanced and returns how many there are
pub fn assert_ledger_balanced(state: &LedgerState, company_id: CompanyId) -> usize {
    let entries = state.entries_for_company(company_id);
    for entry in &entries {
        assert_balanced(entry);
    }
    entries.len()
}

/// Asserts that the entry posted for `source_key` exists and returns it
pub fn assert_entry_posted(state: &LedgerState, source_key: &str) -> JournalEntry {
    match state.find_entry_by_source(source_key) {
        Some(entry) => {
            assert_balanced(&entry);
            entry
        }
        None => panic!("No journal entry posted for source key {source_key}"),
    }
}

/// Asserts that nothing was posted for `source_key`
pub fn assert_no_entry(state: &LedgerState, source_key: &str) {
    if let Some(entry) = state.find_entry_by_source(source_key) {
        panic!(
            "Unexpected journal entry {} for source key {source_key} ({} lines)",
            entry.id,
            entry.lines.len()
        );
    }
}

/// Asserts an account's normal-side balance
pub fn assert_account_balance(state: &LedgerState, company_id: CompanyId, account_code: &str, expected: Decimal) {
    let balance = state.account_totals(company_id, account_code).balance(account_code);
    assert_eq!(
        balance, expected,
        "Account {account_code} balance is {balance}, expected {expected}"
    );
}

/// Asserts that the company has `expected` events of `event_type`
pub fn assert_event_count(state: &LedgerState, company_id: CompanyId, event_type: &str, expected: usize) {
    let actual = state
        .events_for_company(company_id)
        .iter()
        .filter(|e| e.event_type() == event_type)
        .count();
    assert_eq!(
        actual, expected,
        "Expected {expected} {event_type} events, found {actual}"
    );
}

/// Asserts the P&L identity `net = gross - refunds - fifo - fees`
pub fn assert_pnl_identity(row: &MarketplaceProductPnl) {
    let expected = row.gross_revenue - row.refund_cost_total - row.fifo_cost_total - row.fees_total();
    assert_eq!(
        row.net_profit, expected,
        "P&L row {}/{} net profit {} does not match gross {} - refunds {} - fifo {} - fees {}",
        row.product_id,
        row.marketplace,
        row.net_profit,
        row.gross_revenue,
        row.refund_cost_total,
        row.fifo_cost_total,
        row.fees_total()
    );
}

/// Asserts that a decimal value is within a range
pub fn assert_decimal_in_range(value: Decimal, min: Decimal, max: Decimal) {
    assert!(
        value >= min && value <= max,
        "Decimal {} is not in range [{}, {}]",
        value,
        min,
        max
    );
}

/// Asserts that a decimal value is approximately equal to another
pub fn assert_decimal_approx_eq(actual: Decimal, expected: Decimal, tolerance: Decimal) {
    let diff = (actual - expected).abs();
    assert!(
        diff <= tolerance,
        "Decimals differ by more than tolerance: actual={}, expected={}, diff={}, tolerance={}",
        actual,
        expected,
        diff,
        tolerance
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_decimal_approx_eq() {
        assert_decimal_approx_eq(dec!(999.25), dec!(1000.00), dec!(1.00));
    }

    #[test]
    #[should_panic(expected = "Decimals differ by more than tolerance")]
    fn test_decimal_approx_eq_fails_outside_tolerance() {
        assert_decimal_approx_eq(dec!(9990), dec!(10000), dec!(1.00));
    }

    #[test]
    fn test_decimal_in_range() {
        assert_decimal_in_range(dec!(0.75), Decimal::ZERO, dec!(1.00));
    }
}
