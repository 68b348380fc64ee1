//! Bank connection lifecycle
//!
//! ```text
//! DRAFT ──► PENDING_ACTIVATION ──► ACTIVE ⇄ ERROR ⇄ EXPIRED
//! ```
//!
//! Every status change goes through `ConnectionService::update_status`,
//! which enforces the legality table, maintains the failure counter and
//! backoff, and writes an audit row.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;

use core_kernel::{BankConnectionId, CompanyId, Currency};

use crate::audit::{actions, AuditRecord};
use crate::error::FintechError;
use crate::store::LedgerTx;

/// Bank connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    Draft,
    PendingActivation,
    Active,
    Error,
    Expired,
}

impl ConnectionStatus {
    fn legal_targets(&self) -> &'static [ConnectionStatus] {
        use ConnectionStatus::*;
        match self {
            Draft => &[PendingActivation, Error],
            PendingActivation => &[Active, Error, Draft],
            Active => &[Error, Expired, PendingActivation],
            Error => &[Active, Expired, PendingActivation],
            Expired => &[Active, Error, PendingActivation],
        }
    }

    /// Same-state moves are always allowed (they refresh error info)
    pub fn can_transition_to(&self, to: ConnectionStatus) -> bool {
        *self == to || self.legal_targets().contains(&to)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Draft => "DRAFT",
            ConnectionStatus::PendingActivation => "PENDING_ACTIVATION",
            ConnectionStatus::Active => "ACTIVE",
            ConnectionStatus::Error => "ERROR",
            ConnectionStatus::Expired => "EXPIRED",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified bank connectivity failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BankErrorCode {
    IpNotWhitelisted,
    AuthFailed,
    NoPermission,
    FormatMismatch,
    RateLimit,
    BankDown,
    Timeout,
    Unknown,
}

impl BankErrorCode {
    /// Fallback classification for opaque errors, by message pattern
    pub fn classify_message(message: &str) -> BankErrorCode {
        let msg = message.to_uppercase();
        let has = |needles: &[&str]| needles.iter().any(|n| msg.contains(n));

        if has(&["WHITELIST", "IP ACCESS"]) {
            BankErrorCode::IpNotWhitelisted
        } else if has(&["AUTH", "PASSWORD", "CREDENTIAL"]) {
            BankErrorCode::AuthFailed
        } else if has(&["PERMISSION", "NOT AUTHORIZED", "FORBIDDEN"]) {
            BankErrorCode::NoPermission
        } else if has(&["FORMAT", "PARSING", "DESERIALIZATION"]) {
            BankErrorCode::FormatMismatch
        } else if has(&["RATE LIMIT", "TOO MANY REQUESTS"]) {
            BankErrorCode::RateLimit
        } else if has(&["DOWN", "MAINTENANCE", "503"]) {
            BankErrorCode::BankDown
        } else if has(&["TIMEOUT", "ETIMEDOUT", "ABORTED"]) {
            BankErrorCode::Timeout
        } else {
            BankErrorCode::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BankErrorCode::IpNotWhitelisted => "IP_NOT_WHITELISTED",
            BankErrorCode::AuthFailed => "AUTH_FAILED",
            BankErrorCode::NoPermission => "NO_PERMISSION",
            BankErrorCode::FormatMismatch => "FORMAT_MISMATCH",
            BankErrorCode::RateLimit => "RATE_LIMIT",
            BankErrorCode::BankDown => "BANK_DOWN",
            BankErrorCode::Timeout => "TIMEOUT",
            BankErrorCode::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for BankErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A company's link to one bank account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankConnection {
    pub id: BankConnectionId,
    pub company_id: CompanyId,
    pub bank_name: String,
    pub iban: String,
    pub currency: Currency,
    pub status: ConnectionStatus,
    pub consecutive_failures: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_error_code: Option<BankErrorCode>,
    pub last_error_message: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl BankConnection {
    pub fn new(
        company_id: CompanyId,
        bank_name: impl Into<String>,
        iban: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: BankConnectionId::new_v7(),
            company_id,
            bank_name: bank_name.into(),
            iban: iban.into(),
            currency: Currency::TRY,
            status: ConnectionStatus::Draft,
            consecutive_failures: 0,
            next_retry_at: None,
            last_error_code: None,
            last_error_message: None,
            last_error_at: None,
            last_sync_at: None,
            updated_at: now,
        }
    }

    /// Whether `sync_all` should pick this connection up now
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            ConnectionStatus::Active => true,
            ConnectionStatus::Error => self.next_retry_at.map_or(true, |at| at <= now),
            _ => false,
        }
    }
}

/// Context for a status change
#[derive(Debug, Clone, Default)]
pub struct StatusChange {
    pub actor: String,
    pub reason_code: Option<String>,
    pub error_code: Option<BankErrorCode>,
    pub error_message: Option<String>,
}

impl StatusChange {
    pub fn by(actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            ..Self::default()
        }
    }

    pub fn reason(mut self, reason_code: impl Into<String>) -> Self {
        self.reason_code = Some(reason_code.into());
        self
    }

    pub fn error(mut self, code: BankErrorCode, message: impl Into<String>) -> Self {
        self.error_code = Some(code);
        self.error_message = Some(message.into());
        self
    }
}

pub struct ConnectionService;

impl ConnectionService {
    const SYSTEM_ACTOR: &'static str = "system:bank-sync";

    /// Backoff in minutes for the given failure count (taken before increment)
    ///
    /// 5, 10, 20, 40, then capped at 60.
    pub fn backoff_minutes(consecutive_failures: u32) -> i64 {
        let factor = 2i64.saturating_pow(consecutive_failures.min(16));
        (factor * 5).min(60)
    }

    /// Moves a connection to `to`, enforcing the legality table
    ///
    /// # Errors
    ///
    /// - `NotFound` if the connection does not exist
    /// - `InvalidTransition` for an illegal move
    pub fn update_status(
        tx: &mut dyn LedgerTx,
        connection_id: BankConnectionId,
        to: ConnectionStatus,
        change: StatusChange,
        now: DateTime<Utc>,
    ) -> Result<BankConnection, FintechError> {
        let mut connection = tx
            .bank_connection(connection_id)
            .ok_or_else(|| FintechError::not_found("BankConnection", connection_id))?;

        let from = connection.status;
        if !from.can_transition_to(to) {
            return Err(FintechError::InvalidTransition { from, to });
        }

        connection.status = to;
        connection.updated_at = now;

        if let Some(code) = change.error_code {
            connection.last_error_code = Some(code);
            connection.last_error_at = Some(now);
            if matches!(to, ConnectionStatus::Error | ConnectionStatus::Expired) {
                let delay = Self::backoff_minutes(connection.consecutive_failures);
                connection.consecutive_failures += 1;
                connection.next_retry_at = Some(now + Duration::minutes(delay));
            }
        }
        if to == ConnectionStatus::Active {
            connection.consecutive_failures = 0;
            connection.next_retry_at = None;
        }
        if let Some(message) = &change.error_message {
            connection.last_error_message = Some(message.clone());
        }

        tx.put_bank_connection(connection.clone());
        tx.append_audit(
            AuditRecord::new(
                connection.company_id,
                change.actor.clone(),
                actions::BANK_CONNECTION_STATUS_CHANGED,
                now,
            )
            .change(
                json!({ "status": from }),
                json!({ "status": to, "errorCode": change.error_code }),
            )
            .with_details(json!({
                "reasonCode": change.reason_code,
                "errorMessage": change.error_message,
                "connectionId": connection_id,
            })),
        );

        tracing::info!(
            connection_id = %connection_id,
            from = %from,
            to = %to,
            failures = connection.consecutive_failures,
            "Bank connection status changed"
        );

        Ok(connection)
    }

    /// Records a failed sync: ERROR with classified code and backoff
    pub fn record_failure(
        tx: &mut dyn LedgerTx,
        connection_id: BankConnectionId,
        code: BankErrorCode,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<BankConnection, FintechError> {
        Self::update_status(
            tx,
            connection_id,
            ConnectionStatus::Error,
            StatusChange::by(Self::SYSTEM_ACTOR)
                .reason("SYNC_FAILED")
                .error(code, message),
            now,
        )
    }

    /// Records a successful sync: ACTIVE, counters reset
    pub fn record_success(
        tx: &mut dyn LedgerTx,
        connection_id: BankConnectionId,
        now: DateTime<Utc>,
    ) -> Result<BankConnection, FintechError> {
        let mut connection = Self::update_status(
            tx,
            connection_id,
            ConnectionStatus::Active,
            StatusChange::by(Self::SYSTEM_ACTOR).reason("SYNC_OK"),
            now,
        )?;
        connection.last_sync_at = Some(now);
        tx.put_bank_connection(connection.clone());
        Ok(connection)
    }
}
