//! Chart of accounts used by the poster and the reconciliation engines
//!
//! Codes follow the Turkish uniform chart (Tekdüzen Hesap Planı). Only the
//! accounts the automated pipeline touches are listed here.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Bank deposits
pub const BANK: &str = "102.01";
/// Marketplace receivables; open lines here are what settlements close
pub const MARKETPLACE_RECEIVABLE: &str = "120.03";
/// Prefix searched for inbound systematic matches
pub const RECEIVABLE_PREFIX: &str = "120";
/// Prefix searched for outbound systematic matches
pub const PAYABLE_PREFIX: &str = "320";
/// Output VAT payable
pub const VAT_PAYABLE: &str = "391.01";
/// Unidentified amounts awaiting manual attribution
pub const SUSPENSE: &str = "397.01";
/// Domestic sales revenue
pub const SALES_REVENUE: &str = "600.01";
/// Sales returns (contra revenue)
pub const SALES_RETURNS: &str = "610.01";
/// Favorable settlement rounding
pub const ROUNDING_GAIN: &str = "679.01";
/// Unfavorable settlement rounding
pub const ROUNDING_LOSS: &str = "689.01";
/// Marketplace commission expense
pub const COMMISSION_EXPENSE: &str = "760.01";
/// Cargo and shipping expense
pub const SHIPPING_EXPENSE: &str = "760.02";
/// Service and miscellaneous marketplace fees
pub const MARKETPLACE_FEES: &str = "760.03";
/// Rent
pub const RENT_EXPENSE: &str = "770.01";

/// Types of accounts in the chart of accounts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountType {
    /// Asset accounts (debit normal balance)
    Asset,
    /// Liability accounts (credit normal balance)
    Liability,
    /// Equity accounts (credit normal balance)
    Equity,
    /// Revenue accounts (credit normal balance)
    Revenue,
    /// Expense accounts (debit normal balance)
    Expense,
}

impl AccountType {
    /// Classifies a code by its leading digit
    pub fn for_code(code: &str) -> AccountType {
        match code.chars().next() {
            Some('1') | Some('2') => AccountType::Asset,
            Some('3') | Some('4') => AccountType::Liability,
            Some('5') => AccountType::Equity,
            Some('6') if ["60", "64", "67"].iter().any(|p| code.starts_with(p)) => AccountType::Revenue,
            _ => AccountType::Expense,
        }
    }

    /// Returns true if this account type has a debit normal balance
    pub fn is_debit_normal(&self) -> bool {
        matches!(self, AccountType::Asset | AccountType::Expense)
    }
}

/// Debit and credit sums for one account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccountTotals {
    pub debit: Decimal,
    pub credit: Decimal,
}

impl AccountTotals {
    /// Balance on the account's normal side
    pub fn balance(&self, account_code: &str) -> Decimal {
        if AccountType::for_code(account_code).is_debit_normal() {
            self.debit - self.credit
        } else {
            self.credit - self.debit
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_account_types() {
        assert_eq!(AccountType::for_code(BANK), AccountType::Asset);
        assert_eq!(AccountType::for_code(SUSPENSE), AccountType::Liability);
        assert_eq!(AccountType::for_code(SALES_REVENUE), AccountType::Revenue);
        assert_eq!(AccountType::for_code(SALES_RETURNS), AccountType::Expense);
        assert_eq!(AccountType::for_code(ROUNDING_GAIN), AccountType::Revenue);
        assert_eq!(AccountType::for_code(ROUNDING_LOSS), AccountType::Expense);
        assert_eq!(AccountType::for_code(COMMISSION_EXPENSE), AccountType::Expense);
    }

    #[test]
    fn test_suspense_balance_is_credit_normal() {
        let totals = AccountTotals { debit: dec!(100), credit: dec!(350) };
        assert_eq!(totals.balance(SUSPENSE), dec!(250));
        assert_eq!(totals.balance(BANK), dec!(-250));
    }
}
