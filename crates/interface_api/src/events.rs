//! Bridges terminal action outcomes into the domain event log

use async_trait::async_trait;
use std::sync::Arc;
use tracing::error;

use domain_actions::{ActionAudit, ActionEventSink};
use domain_fintech::{AggregateType, EventKind, EventLog, NewEvent};

/// Records `MARKETPLACE_ACTION_COMPLETED` / `MARKETPLACE_ACTION_FAILED`
///
/// Append failures are logged and swallowed; the action result stands.
pub struct EventLogActionSink {
    event_log: Arc<EventLog>,
}

impl EventLogActionSink {
    pub fn new(event_log: Arc<EventLog>) -> Self {
        Self { event_log }
    }

    async fn record(&self, audit: &ActionAudit, kind: EventKind) {
        let event = NewEvent::new(audit.company_id, AggregateType::Order, &audit.order_number, kind)
            .with_actor("system:actions")
            .with_correlation_id(audit.idempotency_key.clone());
        if let Err(e) = self.event_log.emit(event).await {
            error!(
                idempotency_key = %audit.idempotency_key,
                company_id = %audit.company_id,
                error = %e,
                "Failed to record action event"
            );
        }
    }
}

#[async_trait]
impl ActionEventSink for EventLogActionSink {
    async fn completed(&self, audit: &ActionAudit) {
        let kind = EventKind::MarketplaceActionCompleted {
            idempotency_key: audit.idempotency_key.clone(),
            action: audit.action.as_str().to_string(),
            marketplace: audit.marketplace,
            order_number: audit.order_number.clone(),
        };
        self.record(audit, kind).await;
    }

    async fn failed(&self, audit: &ActionAudit) {
        let kind = EventKind::MarketplaceActionFailed {
            idempotency_key: audit.idempotency_key.clone(),
            action: audit.action.as_str().to_string(),
            marketplace: audit.marketplace,
            error_code: audit
                .error_code
                .map(|c| c.as_str().to_string())
                .unwrap_or_else(|| "E_UNKNOWN".to_string()),
            message: audit.error_message.clone().unwrap_or_default(),
        };
        self.record(audit, kind).await;
    }
}
