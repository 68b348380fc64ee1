//! Control-tower reconciliation metrics

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use core_kernel::CompanyId;

use crate::chart;
use crate::error::FintechError;
use crate::event_log::EventLog;
use crate::journal::{JournalLine, OpenLineQuery};
use crate::matching::ConfidenceBucket;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthGrade {
    Healthy,
    Warning,
    Risk,
}

impl HealthGrade {
    pub fn grade(suspense_amount: Decimal, failures: usize) -> Self {
        if failures > 10 || suspense_amount > dec!(50000) {
            HealthGrade::Risk
        } else if failures > 0 || suspense_amount > dec!(5000) {
            HealthGrade::Warning
        } else {
            HealthGrade::Healthy
        }
    }
}

/// Open receivable amount by age
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgingBucket {
    pub label: &'static str,
    pub amount: Decimal,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfidenceDistribution {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub open_receivable_total: Decimal,
    pub open_receivable_count: usize,
    pub suspense_amount: Decimal,
    pub failed_events_7d: usize,
    pub aging: Vec<AgingBucket>,
    pub confidence_today: ConfidenceDistribution,
    pub grade: HealthGrade,
    pub generated_at: DateTime<Utc>,
}

pub struct ReconciliationMetrics {
    event_log: Arc<EventLog>,
}

impl ReconciliationMetrics {
    pub fn new(event_log: Arc<EventLog>) -> Self {
        Self { event_log }
    }

    pub async fn snapshot(&self, company_id: CompanyId) -> Result<MetricsSnapshot, FintechError> {
        let now = self.event_log.clock().now();
        let start_of_day = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|d| d.and_utc())
            .unwrap_or(now);

        self.event_log
            .store()
            .read(move |tx| {
                let receivables = tx.open_lines(&OpenLineQuery::new(company_id, chart::MARKETPLACE_RECEIVABLE));
                let suspense_amount: Decimal = tx
                    .open_lines(&OpenLineQuery::new(company_id, chart::SUSPENSE))
                    .iter()
                    .map(|l| l.credit)
                    .sum();
                let failed_events_7d = tx.count_events_since(company_id, "FAIL", now - Duration::days(7));

                let mut confidence_today = ConfidenceDistribution::default();
                for m in tx.matches_since(company_id, start_of_day) {
                    match m.confidence_bucket {
                        ConfidenceBucket::High => confidence_today.high += 1,
                        ConfidenceBucket::Medium => confidence_today.medium += 1,
                        ConfidenceBucket::Low => confidence_today.low += 1,
                    }
                }

                Ok(MetricsSnapshot {
                    open_receivable_total: receivables.iter().map(|l| l.debit).sum(),
                    open_receivable_count: receivables.len(),
                    suspense_amount,
                    failed_events_7d,
                    aging: aging_buckets(&receivables, now),
                    confidence_today,
                    grade: HealthGrade::grade(suspense_amount, failed_events_7d),
                    generated_at: now,
                })
            })
            .await
    }
}

fn aging_buckets(lines: &[JournalLine], now: DateTime<Utc>) -> Vec<AgingBucket> {
    let mut buckets = vec![
        AgingBucket { label: "0-1 Day", amount: Decimal::ZERO, count: 0 },
        AgingBucket { label: "1-3 Days", amount: Decimal::ZERO, count: 0 },
        AgingBucket { label: "4-7 Days", amount: Decimal::ZERO, count: 0 },
        AgingBucket { label: "7+ Days", amount: Decimal::ZERO, count: 0 },
    ];
    for line in lines {
        let age = now - line.created_at;
        let idx = if age <= Duration::days(1) {
            0
        } else if age <= Duration::days(3) {
            1
        } else if age <= Duration::days(7) {
            2
        } else {
            3
        };
        buckets[idx].amount += line.debit;
        buckets[idx].count += 1;
    }
    buckets
}
