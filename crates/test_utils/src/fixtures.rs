//! Pre-built Test Fixtures
//!
//! Provides ready-to-use test data shared by unit, integration and golden-run
//! tests. Values are fixed so assertions can name exact counts and amounts.

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use core_kernel::{CompanyId, Currency};
use domain_fintech::{MatchingRule, RawBankRecord, TargetType, chart};

/// Fixed instants used across the suite
pub struct TemporalFixtures;

impl TemporalFixtures {
    /// Wall clock the harnesses start at (12 Feb 2026, 09:00 UTC)
    pub fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 12, 9, 0, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }

    /// Booking date of the golden dataset
    pub fn booking_day() -> DateTime<Utc> {
        Self::now() - Duration::days(1)
    }
}

/// The nine-record mock bank dataset used by the golden run
///
/// Records 1 & 2 and 8 & 9 are exact duplicates that only differ in the
/// provider id, so ingestion must store 7 rows.
pub struct GoldenDataset;

impl GoldenDataset {
    pub const RECORDS: usize = 9;
    pub const UNIQUE: usize = 7;

    pub fn records() -> Vec<RawBankRecord> {
        let day = TemporalFixtures::booking_day();
        let rec = |id: &str, amount: Decimal, description: &str, reference: Option<&str>| RawBankRecord {
            id: id.to_string(),
            amount,
            currency: Currency::TRY,
            description: description.to_string(),
            date: day,
            reference: reference.map(str::to_string),
        };

        vec![
            rec("MOCK_TX_0", dec!(15400.50), "TRENDYOL HAKEDIS ODEMESI 11.02", Some("TY-20260211")),
            rec("MOCK_TX_1", dec!(15400.50), "TRENDYOL HAKEDIS ODEMESI 11.02", Some("TY-20260211")),
            rec("MOCK_TX_2", dec!(8230.10), "HEPSIBURADA HAKEDIŞ ÖDEMESİ", Some("HB-0211")),
            rec("MOCK_TX_3", dec!(-25000.00), "KIRA ODEMESI SUBAT 2026", None),
            rec("MOCK_TX_4", dec!(1200.00), "EFT GELEN ACME LTD SIPARIS#4411", None),
            rec("MOCK_TX_5", dec!(349.90), "POS SATIS 0211", None),
            rec("MOCK_TX_6", dec!(2150.00), "N11 HAKEDIS", Some("N11-0211")),
            rec("MOCK_TX_7", dec!(-845.20), "FAST GIDEN ELEKTRIK FATURASI", None),
            rec("MOCK_TX_8", dec!(-845.20), "FAST GIDEN ELEKTRIK FATURASI", None),
        ]
    }
}

/// The two rules the golden run seeds
pub fn seed_rules(company_id: CompanyId, now: DateTime<Utc>) -> Vec<MatchingRule> {
    vec![
        MatchingRule::new(company_id, "TRENDYOL", TargetType::Marketplace, chart::MARKETPLACE_RECEIVABLE, now),
        MatchingRule::new(company_id, "KIRA", TargetType::Expense, chart::RENT_EXPENSE, now),
    ]
}

/// Frequently used amounts
pub struct AmountFixtures;

impl AmountFixtures {
    /// Gross sale with 20% VAT inside: 1000 net + 200 VAT
    pub fn gross_sale() -> Decimal {
        dec!(1200.00)
    }

    pub fn fifo_cost() -> Decimal {
        dec!(600.00)
    }

    pub fn commission() -> Decimal {
        dec!(-150.00)
    }
}
