//! Incremental per-product profitability
//!
//! One row per `(company, product, marketplace)`. Counters only ever grow;
//! `net_profit` and `profit_margin` are recomputed from the counters after
//! every update, so incremental and from-scratch totals cannot drift apart.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use core_kernel::{CompanyId, Marketplace};

use crate::error::FintechError;
use crate::event_log::{EventHandler, ReactionContext};
use crate::events::{DomainEvent, EventKind, FeeType};
use crate::store::LedgerTx;

/// Row key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PnlKey {
    pub company_id: CompanyId,
    pub product_id: String,
    pub marketplace: Marketplace,
}

/// Profitability counters for one product on one marketplace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketplaceProductPnl {
    pub company_id: CompanyId,
    pub product_id: String,
    pub marketplace: Marketplace,
    pub gross_revenue: Decimal,
    pub commission_total: Decimal,
    pub shipping_total: Decimal,
    pub other_fees_total: Decimal,
    pub fifo_cost_total: Decimal,
    pub refund_cost_total: Decimal,
    pub sale_count: u64,
    pub refund_count: u64,
    pub net_profit: Decimal,
    /// Percentage of net revenue, 2 decimal places
    pub profit_margin: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl MarketplaceProductPnl {
    fn empty(key: &PnlKey, now: DateTime<Utc>) -> Self {
        Self {
            company_id: key.company_id,
            product_id: key.product_id.clone(),
            marketplace: key.marketplace,
            gross_revenue: Decimal::ZERO,
            commission_total: Decimal::ZERO,
            shipping_total: Decimal::ZERO,
            other_fees_total: Decimal::ZERO,
            fifo_cost_total: Decimal::ZERO,
            refund_cost_total: Decimal::ZERO,
            sale_count: 0,
            refund_count: 0,
            net_profit: Decimal::ZERO,
            profit_margin: Decimal::ZERO,
            updated_at: now,
        }
    }

    pub fn key(&self) -> PnlKey {
        PnlKey {
            company_id: self.company_id,
            product_id: self.product_id.clone(),
            marketplace: self.marketplace,
        }
    }

    pub fn fees_total(&self) -> Decimal {
        self.commission_total + self.shipping_total + self.other_fees_total
    }

    fn apply(&mut self, delta: &PnlDelta, now: DateTime<Utc>) {
        self.gross_revenue += delta.gross_revenue;
        self.commission_total += delta.commission;
        self.shipping_total += delta.shipping;
        self.other_fees_total += delta.other_fees;
        self.fifo_cost_total += delta.fifo_cost;
        self.refund_cost_total += delta.refund_cost;
        self.sale_count += delta.sales;
        self.refund_count += delta.refunds;
        self.recompute();
        self.updated_at = now;
    }

    /// `net = gross - refunds - fifo - fees`; margin is 0 when net revenue <= 0
    pub fn recompute(&mut self) {
        self.net_profit =
            self.gross_revenue - self.refund_cost_total - self.fifo_cost_total - self.fees_total();
        let net_revenue = self.gross_revenue - self.refund_cost_total;
        self.profit_margin = if net_revenue > Decimal::ZERO {
            (self.net_profit / net_revenue * dec!(100)).round_dp(2)
        } else {
            Decimal::ZERO
        };
    }
}

#[derive(Debug, Default)]
struct PnlDelta {
    gross_revenue: Decimal,
    commission: Decimal,
    shipping: Decimal,
    other_fees: Decimal,
    fifo_cost: Decimal,
    refund_cost: Decimal,
    sales: u64,
    refunds: u64,
}

/// Event reaction keeping the P&L rows current
#[derive(Debug, Default)]
pub struct PnlAggregator;

impl PnlAggregator {
    /// Applies the event to its row; returns the updated row if the event
    /// touched profitability
    pub fn update_pnl(
        tx: &mut dyn LedgerTx,
        event: &DomainEvent,
        now: DateTime<Utc>,
    ) -> Result<Option<MarketplaceProductPnl>, FintechError> {
        let Some((product_id, marketplace, delta)) = Self::delta_for(&event.kind) else {
            return Ok(None);
        };

        let key = PnlKey {
            company_id: event.company_id,
            product_id,
            marketplace,
        };
        let mut row = tx
            .pnl_row(&key)
            .unwrap_or_else(|| MarketplaceProductPnl::empty(&key, now));
        row.apply(&delta, now);
        tx.put_pnl_row(row.clone());

        tracing::debug!(
            product_id = %row.product_id,
            marketplace = %row.marketplace,
            net_profit = %row.net_profit,
            "P&L row updated"
        );
        Ok(Some(row))
    }

    fn delta_for(kind: &EventKind) -> Option<(String, Marketplace, PnlDelta)> {
        match kind {
            EventKind::SaleCompleted {
                product_id,
                marketplace,
                gross_amount,
                fifo_cost,
                ..
            } => Some((
                product_id.clone(),
                *marketplace,
                PnlDelta {
                    gross_revenue: gross_amount.abs(),
                    fifo_cost: fifo_cost.abs(),
                    sales: 1,
                    ..PnlDelta::default()
                },
            )),
            EventKind::MarketplaceTransactionRecorded {
                product_id: Some(product_id),
                marketplace,
                fee_type,
                amount,
                ..
            } => {
                let amount = amount.abs();
                let delta = match fee_type {
                    FeeType::Commission => PnlDelta { commission: amount, ..PnlDelta::default() },
                    FeeType::Shipping => PnlDelta { shipping: amount, ..PnlDelta::default() },
                    FeeType::ServiceFee | FeeType::OtherFee => {
                        PnlDelta { other_fees: amount, ..PnlDelta::default() }
                    }
                    FeeType::Sale | FeeType::Other => return None,
                };
                Some((product_id.clone(), *marketplace, delta))
            }
            EventKind::RefundCompleted {
                product_id,
                marketplace,
                refund_amount,
                ..
            } => Some((
                product_id.clone(),
                *marketplace,
                PnlDelta {
                    refund_cost: refund_amount.abs(),
                    refunds: 1,
                    ..PnlDelta::default()
                },
            )),
            _ => None,
        }
    }
}

impl EventHandler for PnlAggregator {
    fn name(&self) -> &'static str {
        "pnl-aggregator"
    }

    fn handle(
        &self,
        tx: &mut dyn LedgerTx,
        event: &DomainEvent,
        ctx: &mut ReactionContext,
    ) -> Result<(), FintechError> {
        Self::update_pnl(tx, event, ctx.now()).map(|_| ())
    }
}
