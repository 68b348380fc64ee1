//! Test Data Builders
//!
//! Provides builder patterns for constructing test data with sensible defaults.
//! These builders allow tests to specify only the relevant fields while using
//! defaults for everything else.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value;

use core_kernel::{CompanyId, Currency, Marketplace};
use domain_actions::{ActionKind, ActionRequest};
use domain_fintech::{
    AggregateType, BankStatement, EventKind, FeeType, NewEvent, OperatingMode, RawBankRecord, SettledTransaction,
};

use crate::fixtures::{AmountFixtures, TemporalFixtures};

/// Builder for `SALE_COMPLETED` events
pub struct SaleEventBuilder {
    company_id: CompanyId,
    order_number: String,
    product_id: String,
    marketplace: Marketplace,
    gross_amount: Decimal,
    tax_rate: Option<Decimal>,
    fifo_cost: Decimal,
    mode: Option<OperatingMode>,
}

impl SaleEventBuilder {
    pub fn new(company_id: CompanyId) -> Self {
        Self {
            company_id,
            order_number: "TY-1001".to_string(),
            product_id: "SKU-1".to_string(),
            marketplace: Marketplace::Trendyol,
            gross_amount: AmountFixtures::gross_sale(),
            tax_rate: None,
            fifo_cost: AmountFixtures::fifo_cost(),
            mode: None,
        }
    }

    pub fn with_order_number(mut self, order_number: impl Into<String>) -> Self {
        self.order_number = order_number.into();
        self
    }

    pub fn with_product(mut self, product_id: impl Into<String>) -> Self {
        self.product_id = product_id.into();
        self
    }

    pub fn with_marketplace(mut self, marketplace: Marketplace) -> Self {
        self.marketplace = marketplace;
        self
    }

    pub fn with_gross_amount(mut self, amount: Decimal) -> Self {
        self.gross_amount = amount;
        self
    }

    pub fn with_tax_rate(mut self, percentage: Decimal) -> Self {
        self.tax_rate = Some(percentage);
        self
    }

    pub fn with_fifo_cost(mut self, cost: Decimal) -> Self {
        self.fifo_cost = cost;
        self
    }

    pub fn with_mode(mut self, mode: OperatingMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn build(self) -> NewEvent {
        let event = NewEvent::new(
            self.company_id,
            AggregateType::Order,
            &self.order_number,
            EventKind::SaleCompleted {
                order_number: self.order_number.clone(),
                product_id: self.product_id,
                marketplace: self.marketplace,
                gross_amount: self.gross_amount,
                tax_rate: self.tax_rate,
                fifo_cost: self.fifo_cost,
                currency: Currency::TRY,
            },
        );
        match self.mode {
            Some(mode) => event.with_mode(mode),
            None => event,
        }
    }
}

/// Builder for `REFUND_COMPLETED` events
pub fn refund_event(
    company_id: CompanyId,
    order_number: &str,
    product_id: &str,
    marketplace: Marketplace,
    refund_amount: Decimal,
) -> NewEvent {
    NewEvent::new(
        company_id,
        AggregateType::Order,
        order_number,
        EventKind::RefundCompleted {
            order_number: order_number.to_string(),
            product_id: product_id.to_string(),
            marketplace,
            refund_amount,
            currency: Currency::TRY,
        },
    )
}

/// Builder for marketplace settlement lines
pub struct SettledTransactionBuilder {
    external_reference: String,
    fee_type: FeeType,
    amount: Decimal,
    product_id: Option<String>,
    order_number: Option<String>,
    transaction_date: DateTime<Utc>,
}

impl SettledTransactionBuilder {
    pub fn commission(external_reference: impl Into<String>) -> Self {
        Self {
            external_reference: external_reference.into(),
            fee_type: FeeType::Commission,
            amount: AmountFixtures::commission(),
            product_id: Some("SKU-1".to_string()),
            order_number: Some("TY-1001".to_string()),
            transaction_date: TemporalFixtures::now(),
        }
    }

    pub fn with_fee_type(mut self, fee_type: FeeType) -> Self {
        self.fee_type = fee_type;
        self
    }

    pub fn with_amount(mut self, amount: Decimal) -> Self {
        self.amount = amount;
        self
    }

    pub fn with_product(mut self, product_id: Option<&str>) -> Self {
        self.product_id = product_id.map(str::to_string);
        self
    }

    pub fn with_order_number(mut self, order_number: impl Into<String>) -> Self {
        self.order_number = Some(order_number.into());
        self
    }

    pub fn build(self) -> SettledTransaction {
        SettledTransaction {
            external_reference: self.external_reference,
            fee_type: self.fee_type,
            amount: self.amount,
            product_id: self.product_id,
            order_number: self.order_number,
            currency: Currency::TRY,
            transaction_date: self.transaction_date,
        }
    }
}

/// Bank statement crediting `payout`
pub fn statement(company_id: CompanyId, reference_no: &str, payout: Decimal) -> BankStatement {
    BankStatement::new(company_id, reference_no, payout, TemporalFixtures::now())
}

/// Builder for raw bank records
pub struct RawRecordBuilder {
    record: RawBankRecord,
}

impl RawRecordBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            record: RawBankRecord {
                id: id.into(),
                amount: dec!(100.00),
                currency: Currency::TRY,
                description: "EFT GELEN".to_string(),
                date: TemporalFixtures::booking_day(),
                reference: None,
            },
        }
    }

    pub fn amount(mut self, amount: Decimal) -> Self {
        self.record.amount = amount;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.record.description = description.into();
        self
    }

    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.record.reference = Some(reference.into());
        self
    }

    pub fn date(mut self, date: DateTime<Utc>) -> Self {
        self.record.date = date;
        self
    }

    pub fn build(self) -> RawBankRecord {
        self.record
    }
}

/// Builder for action requests
pub struct ActionRequestBuilder {
    request: ActionRequest,
}

impl ActionRequestBuilder {
    pub fn new(company_id: CompanyId, marketplace: Marketplace, action: ActionKind) -> Self {
        let key = format!("{}-{}-1001", marketplace.code().to_lowercase(), action.as_str().to_lowercase());
        Self {
            request: ActionRequest::new(key, company_id, marketplace, action, "1001"),
        }
    }

    pub fn key(mut self, idempotency_key: impl Into<String>) -> Self {
        self.request.idempotency_key = idempotency_key.into();
        self
    }

    pub fn order_number(mut self, order_number: impl Into<String>) -> Self {
        self.request.order_number = order_number.into();
        self
    }

    pub fn payload(mut self, payload: Value) -> Self {
        self.request.payload = payload;
        self
    }

    pub fn build(self) -> ActionRequest {
        self.request
    }
}
