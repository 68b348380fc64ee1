//! Safety breaker for autonomous financial actions
//!
//! Trips when the suspense account grows past a limit or when too many
//! failure events pile up within an hour. A tripped breaker disables every
//! autopilot configuration of the company and blocks auto-confirmation in
//! the matching engine. It stays tripped until an operator re-arms it;
//! re-arming does not re-enable autopilot.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

use core_kernel::CompanyId;

use crate::audit::{actions, AuditRecord};
use crate::chart;
use crate::error::FintechError;
use crate::event_log::EventLog;
use crate::events::{AggregateType, EventKind, NewEvent};

const BREAKER_ACTOR: &str = "system:safety-breaker";

/// An automated decision loop that can be switched off
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutopilotConfig {
    pub company_id: CompanyId,
    pub name: String,
    pub enabled: bool,
    pub updated_at: DateTime<Utc>,
}

impl AutopilotConfig {
    pub fn enabled(company_id: CompanyId, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            company_id,
            name: name.into(),
            enabled: true,
            updated_at: now,
        }
    }
}

/// Trip limits; both are strict (`>`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerThresholds {
    pub suspense_limit: Decimal,
    pub failed_event_limit: usize,
}

impl Default for BreakerThresholds {
    fn default() -> Self {
        Self {
            suspense_limit: dec!(50000),
            failed_event_limit: 10,
        }
    }
}

/// Inputs the breaker decided on
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReading {
    pub suspense_balance: Decimal,
    pub failed_events: usize,
}

impl HealthReading {
    /// Why these readings trip the breaker, if they do
    pub fn breach(&self, thresholds: &BreakerThresholds) -> Option<String> {
        if self.suspense_balance > thresholds.suspense_limit {
            Some(format!(
                "suspense balance {} exceeds {}",
                self.suspense_balance, thresholds.suspense_limit
            ))
        } else if self.failed_events > thresholds.failed_event_limit {
            Some(format!(
                "{} failed events in the last hour exceed {}",
                self.failed_events, thresholds.failed_event_limit
            ))
        } else {
            None
        }
    }
}

pub struct SafetyBreaker {
    event_log: Arc<EventLog>,
    thresholds: BreakerThresholds,
}

impl SafetyBreaker {
    pub fn new(event_log: Arc<EventLog>, thresholds: BreakerThresholds) -> Self {
        Self {
            event_log,
            thresholds,
        }
    }

    /// Returns `true` when autonomous actions may continue
    ///
    /// A breach disables every autopilot config, writes audit rows and emits a
    /// CRITICAL `SAFETY_BREAKER_TRIPPED` event, all in one transaction. An
    /// already tripped breaker returns `false` without re-emitting.
    pub async fn check_health(&self, company_id: CompanyId) -> Result<bool, FintechError> {
        let now = self.event_log.clock().now();
        let since = now - Duration::hours(1);
        let thresholds = self.thresholds;
        let event_log = &self.event_log;

        self.event_log
            .transaction(move |tx| {
                if tx.breaker_tripped(company_id) {
                    return Ok(false);
                }

                let reading = HealthReading {
                    suspense_balance: tx.account_totals(company_id, chart::SUSPENSE).balance(chart::SUSPENSE),
                    failed_events: tx.count_events_since(company_id, "FAILED", since),
                };
                let Some(reason) = reading.breach(&thresholds) else {
                    return Ok(true);
                };

                let mut disabled = Vec::new();
                for mut config in tx.autopilot_configs(company_id) {
                    if config.enabled {
                        config.enabled = false;
                        config.updated_at = now;
                        disabled.push(config.name.clone());
                        tx.put_autopilot_config(config);
                    }
                }
                tx.set_breaker_tripped(company_id, true);

                tx.append_audit(
                    AuditRecord::new(company_id, BREAKER_ACTOR, actions::SAFETY_BREAKER_TRIPPED, now)
                        .change(json!({ "tripped": false }), json!({ "tripped": true }))
                        .with_details(json!({
                            "reason": reason,
                            "suspenseBalance": reading.suspense_balance,
                            "failedEvents": reading.failed_events,
                        })),
                );
                tx.append_audit(
                    AuditRecord::new(company_id, BREAKER_ACTOR, actions::AUTOPILOT_DISABLED, now)
                        .with_details(json!({ "configs": disabled })),
                );

                event_log.emit_in(
                    tx,
                    NewEvent::new(
                        company_id,
                        AggregateType::Journal,
                        company_id,
                        EventKind::SafetyBreakerTripped {
                            suspense_balance: reading.suspense_balance,
                            failed_events: reading.failed_events,
                            reason: reason.clone(),
                        },
                    )
                    .with_actor(BREAKER_ACTOR),
                )?;

                error!(
                    company_id = %company_id,
                    suspense_balance = %reading.suspense_balance,
                    failed_events = reading.failed_events,
                    reason = %reason,
                    "Safety breaker tripped; autopilot disabled"
                );
                Ok(false)
            })
            .await
    }

    /// Clears the tripped latch; autopilot configs stay disabled
    pub async fn rearm(&self, company_id: CompanyId, who: &str) -> Result<(), FintechError> {
        let now = self.event_log.clock().now();
        self.event_log
            .transaction(move |tx| {
                if !tx.breaker_tripped(company_id) {
                    return Ok(());
                }
                tx.set_breaker_tripped(company_id, false);
                tx.append_audit(
                    AuditRecord::new(company_id, who, actions::SAFETY_BREAKER_REARMED, now)
                        .change(json!({ "tripped": true }), json!({ "tripped": false })),
                );
                Ok(())
            })
            .await?;
        info!(company_id = %company_id, who, "Safety breaker re-armed");
        Ok(())
    }

    pub async fn is_tripped(&self, company_id: CompanyId) -> Result<bool, FintechError> {
        self.event_log
            .store()
            .read(move |tx| Ok(tx.breaker_tripped(company_id)))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_are_strict() {
        let t = BreakerThresholds::default();
        let at_limit = HealthReading {
            suspense_balance: dec!(50000),
            failed_events: 10,
        };
        assert!(at_limit.breach(&t).is_none());

        let over = HealthReading {
            suspense_balance: dec!(50000.01),
            failed_events: 0,
        };
        assert!(over.breach(&t).unwrap().contains("suspense"));

        let failing = HealthReading {
            suspense_balance: Decimal::ZERO,
            failed_events: 11,
        };
        assert!(failing.breach(&t).unwrap().contains("failed events"));
    }
}
