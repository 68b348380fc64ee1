//! Terminal action notifications

use async_trait::async_trait;

use crate::model::ActionAudit;

/// Told about every action that reached `SUCCESS` or `FAILED`
///
/// Implementations must not fail the action; they log their own errors.
#[async_trait]
pub trait ActionEventSink: Send + Sync {
    async fn completed(&self, audit: &ActionAudit);

    async fn failed(&self, audit: &ActionAudit);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

#[async_trait]
impl ActionEventSink for NoopEventSink {
    async fn completed(&self, _audit: &ActionAudit) {}

    async fn failed(&self, _audit: &ActionAudit) {}
}
