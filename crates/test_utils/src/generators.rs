//! Property-Based Test Generators
//!
//! Provides proptest strategies for generating random profitability traffic
//! and bank records that keep the inputs inside valid ranges.

use proptest::prelude::*;
use rust_decimal::Decimal;

use core_kernel::{CompanyId, Currency, Marketplace, SettlementRecordId};
use domain_fintech::{AggregateType, EventKind, FeeType, NewEvent, RawBankRecord};

use crate::fixtures::TemporalFixtures;

/// Strategy for generating marketplaces
pub fn marketplace_strategy() -> impl Strategy<Value = Marketplace> {
    proptest::sample::select(Marketplace::ALL.to_vec())
}

/// Strategy for positive kuruş-precision amounts up to 100 000 TRY
pub fn positive_amount_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..10_000_000i64).prop_map(|minor| Decimal::new(minor, 2))
}

/// Strategy for non-zero amounts of either sign, as upstream feeds send them
pub fn signed_amount_strategy() -> impl Strategy<Value = Decimal> {
    (positive_amount_strategy(), any::<bool>()).prop_map(|(amount, negative)| if negative { -amount } else { amount })
}

/// Strategy for VAT percentages the marketplaces use
pub fn tax_rate_strategy() -> impl Strategy<Value = Option<Decimal>> {
    prop_oneof![
        Just(None),
        Just(Some(Decimal::from(1))),
        Just(Some(Decimal::from(10))),
        Just(Some(Decimal::from(20))),
    ]
}

/// Strategy for fee types that touch P&L
pub fn fee_type_strategy() -> impl Strategy<Value = FeeType> {
    prop_oneof![
        Just(FeeType::Commission),
        Just(FeeType::Shipping),
        Just(FeeType::ServiceFee),
        Just(FeeType::OtherFee),
    ]
}

/// One profitability-relevant fact for a single product
#[derive(Debug, Clone)]
pub enum PnlInput {
    Sale {
        gross: Decimal,
        tax_rate: Option<Decimal>,
        fifo_cost: Decimal,
    },
    Fee {
        fee_type: FeeType,
        amount: Decimal,
    },
    Refund {
        amount: Decimal,
    },
}

impl PnlInput {
    /// Builds the event for this input; `seq` keeps references unique
    pub fn to_event(&self, company_id: CompanyId, marketplace: Marketplace, product_id: &str, seq: usize) -> NewEvent {
        let order_number = format!("PROP-{seq}");
        let (aggregate_type, kind) = match self {
            PnlInput::Sale { gross, tax_rate, fifo_cost } => (
                AggregateType::Order,
                EventKind::SaleCompleted {
                    order_number: order_number.clone(),
                    product_id: product_id.to_string(),
                    marketplace,
                    gross_amount: *gross,
                    tax_rate: *tax_rate,
                    fifo_cost: *fifo_cost,
                    currency: Currency::TRY,
                },
            ),
            PnlInput::Fee { fee_type, amount } => (
                AggregateType::Settlement,
                EventKind::MarketplaceTransactionRecorded {
                    marketplace,
                    settlement_id: SettlementRecordId::new(),
                    external_reference: format!("PROP-FEE-{seq}"),
                    fee_type: *fee_type,
                    amount: *amount,
                    product_id: Some(product_id.to_string()),
                    order_number: Some(order_number.clone()),
                    currency: Currency::TRY,
                },
            ),
            PnlInput::Refund { amount } => (
                AggregateType::Order,
                EventKind::RefundCompleted {
                    order_number: order_number.clone(),
                    product_id: product_id.to_string(),
                    marketplace,
                    refund_amount: *amount,
                    currency: Currency::TRY,
                },
            ),
        };
        NewEvent::new(company_id, aggregate_type, order_number, kind)
    }
}

/// Strategy for a single P&L input
pub fn pnl_input_strategy() -> impl Strategy<Value = PnlInput> {
    prop_oneof![
        3 => (signed_amount_strategy(), tax_rate_strategy(), signed_amount_strategy())
            .prop_map(|(gross, tax_rate, fifo_cost)| PnlInput::Sale { gross, tax_rate, fifo_cost }),
        2 => (fee_type_strategy(), signed_amount_strategy())
            .prop_map(|(fee_type, amount)| PnlInput::Fee { fee_type, amount }),
        1 => signed_amount_strategy().prop_map(|amount| PnlInput::Refund { amount }),
    ]
}

/// Strategy for a run of P&L inputs
pub fn pnl_sequence_strategy(max_len: usize) -> impl Strategy<Value = Vec<PnlInput>> {
    proptest::collection::vec(pnl_input_strategy(), 1..max_len.max(2))
}

/// Strategy for bank descriptions with Turkish characters and noise
pub fn bank_description_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("TRENDYOL HAKEDİŞ ÖDEMESİ".to_string()),
        Just("HEPSIBURADA HAKEDIS".to_string()),
        Just("KİRA ÖDEMESİ ŞUBAT".to_string()),
        Just("EFT GELEN ÇİÇEKSEPETİ".to_string()),
        "[A-Z ]{3,30}",
    ]
}

/// Strategy for raw bank records with distinct ids
pub fn raw_record_strategy() -> impl Strategy<Value = RawBankRecord> {
    (
        "[A-Z0-9]{6,12}",
        -5_000_000i64..5_000_000i64,
        bank_description_strategy(),
        proptest::option::of("[A-Z0-9-]{4,12}"),
    )
        .prop_map(|(id, minor, description, reference)| RawBankRecord {
            id,
            amount: Decimal::new(if minor == 0 { 1 } else { minor }, 2),
            currency: Currency::TRY,
            description,
            date: TemporalFixtures::booking_day(),
            reference,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn test_positive_amounts_have_two_decimals(amount in positive_amount_strategy()) {
            prop_assert!(amount > Decimal::ZERO);
            prop_assert!(amount.scale() <= 2);
        }

        #[test]
        fn test_signed_amounts_are_never_zero(amount in signed_amount_strategy()) {
            prop_assert!(!amount.is_zero());
            prop_assert!(amount.abs() <= Decimal::new(10_000_000, 2));
        }

        #[test]
        fn test_raw_records_are_never_zero(record in raw_record_strategy()) {
            prop_assert!(!record.amount.is_zero());
        }
    }
}
