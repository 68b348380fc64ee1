//! Matching rules and the self-learning path

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use core_kernel::{CompanyId, MatchingRuleId};

use crate::audit::{actions, AuditRecord};
use crate::banking::TransactionNormalizer;
use crate::error::FintechError;
use crate::event_log::EventLog;
use crate::events::{AggregateType, EventKind, NewEvent};

/// What a rule's counter-account represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TargetType {
    Marketplace,
    Expense,
    Customer,
    Supplier,
}

/// A description pattern mapped to a counter-account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchingRule {
    pub id: MatchingRuleId,
    pub company_id: CompanyId,
    /// Normalized upper-case substring
    pub pattern: String,
    pub target_type: TargetType,
    pub account_code: String,
    /// 0..=100
    pub confidence: u8,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl MatchingRule {
    pub fn new(
        company_id: CompanyId,
        pattern: &str,
        target_type: TargetType,
        account_code: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MatchingRuleId::new_v7(),
            company_id,
            pattern: TransactionNormalizer::normalize(pattern),
            target_type,
            account_code: account_code.into(),
            confidence: 100,
            is_active: true,
            created_at: now,
        }
    }

    /// Case-insensitive substring match against a description
    pub fn matches(&self, description: &str) -> bool {
        !self.pattern.is_empty()
            && TransactionNormalizer::normalize(description).contains(&self.pattern)
    }

    /// First three words of the description, upper-cased
    pub fn pattern_from(description: &str) -> String {
        TransactionNormalizer::normalize(description)
            .split(' ')
            .take(3)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Learns rules from human-confirmed matches
pub struct RuleLearner {
    event_log: Arc<EventLog>,
}

impl RuleLearner {
    pub fn new(event_log: Arc<EventLog>) -> Self {
        Self { event_log }
    }

    /// Persists a confidence-100 rule derived from the description and emits
    /// `MATCHING_RULE_LEARNED`
    pub async fn learn_pattern(
        &self,
        company_id: CompanyId,
        description: &str,
        target_type: TargetType,
        account_code: &str,
        who: &str,
    ) -> Result<MatchingRule, FintechError> {
        let pattern = MatchingRule::pattern_from(description);
        if pattern.is_empty() {
            return Err(FintechError::validation("cannot learn a rule from an empty description"));
        }

        let now = self.event_log.clock().now();
        let rule = MatchingRule::new(company_id, &pattern, target_type, account_code, now);
        let event_log = &self.event_log;

        let stored = rule.clone();
        self.event_log
            .transaction(move |tx| {
                tx.insert_rule(stored.clone());
                tx.append_audit(
                    AuditRecord::new(company_id, who, actions::MATCHING_RULE_LEARNED, now)
                        .with_details(json!({ "ruleId": stored.id, "pattern": stored.pattern, "accountCode": stored.account_code })),
                );
                event_log.emit_in(
                    tx,
                    NewEvent::new(
                        company_id,
                        AggregateType::Journal,
                        stored.id,
                        EventKind::MatchingRuleLearned {
                            rule_id: stored.id,
                            pattern: stored.pattern.clone(),
                            target_type: stored.target_type,
                            account_code: stored.account_code.clone(),
                        },
                    )
                    .with_actor(who),
                )?;
                Ok(())
            })
            .await?;

        tracing::info!(company_id = %company_id, pattern = %rule.pattern, "Matching rule learned");
        Ok(rule)
    }
}
