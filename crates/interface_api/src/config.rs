//! Runtime configuration
//!
//! Loaded from `BACKOFFICE_*` environment variables on top of the defaults
//! below. The domain engines take their own plain config structs; the
//! `*_config` helpers build them from here.

use chrono::Duration;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use core_kernel::Marketplace;
use domain_actions::{BackoffKind, ExecutorConfig, QueueConfig};
use domain_fintech::{BreakerThresholds, MatchingConfig, OperatingMode, ReconciliationConfig};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackofficeConfig {
    pub host: String,
    pub port: u16,
    /// Log level: trace, debug, info, warn, error
    pub log_level: String,
    /// Emit JSON log lines instead of the human format
    pub log_json: bool,
    /// PostgreSQL for action audits and leases; in-memory stores when unset
    pub database_url: Option<String>,
    pub operating_mode: OperatingMode,
    pub lock_ttl_secs: i64,
    pub queue_attempts: u32,
    pub queue_backoff_ms: i64,
    pub worker_concurrency: usize,
    pub breaker_suspense_limit: Decimal,
    pub breaker_failed_event_limit: usize,
    pub reconciliation_tolerance: Decimal,
    pub edge_case_diary_path: String,
}

impl Default for BackofficeConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            log_level: "info".to_string(),
            log_json: false,
            database_url: None,
            operating_mode: OperatingMode::DryRun,
            lock_ttl_secs: 60,
            queue_attempts: 3,
            queue_backoff_ms: 1000,
            worker_concurrency: 4,
            breaker_suspense_limit: dec!(50000),
            breaker_failed_event_limit: 10,
            reconciliation_tolerance: dec!(1.00),
            edge_case_diary_path: "var/edge-case-diary.jsonl".to_string(),
        }
    }
}

impl BackofficeConfig {
    /// Loads configuration from the environment (after `.env`, if present)
    pub fn from_env() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_source(config::Environment::with_prefix("BACKOFFICE"))
    }

    /// Defaults overlaid with `source`
    pub fn from_source<S>(source: S) -> Result<Self, config::ConfigError>
    where
        S: config::Source + Send + Sync + 'static,
    {
        config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?)
            .add_source(source)
            .build()?
            .try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn matching_config(&self) -> MatchingConfig {
        MatchingConfig::default()
    }

    pub fn breaker_thresholds(&self) -> BreakerThresholds {
        BreakerThresholds {
            suspense_limit: self.breaker_suspense_limit,
            failed_event_limit: self.breaker_failed_event_limit,
        }
    }

    pub fn reconciliation_config(&self) -> ReconciliationConfig {
        ReconciliationConfig {
            tolerance: self.reconciliation_tolerance,
        }
    }

    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            attempts: self.queue_attempts,
            backoff_ms: self.queue_backoff_ms,
            backoff: BackoffKind::Exponential,
            ..QueueConfig::default()
        }
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            lock_ttl: Duration::seconds(self.lock_ttl_secs),
            queued_marketplaces: HashSet::from([Marketplace::Trendyol]),
        }
    }
}
