//! Action execution errors
//!
//! Every failure that reaches a caller or the queue worker carries an
//! [`ActionErrorCode`]. Adapters set the code at origin through
//! [`PortError`]; the message/HTTP-status classifier is only the fallback
//! for opaque errors.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use core_kernel::PortError;

/// Caller-facing failure class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionErrorCode {
    #[serde(rename = "E_CONFIG_MISSING")]
    ConfigMissing,
    #[serde(rename = "E_VALIDATION")]
    Validation,
    #[serde(rename = "E_RATE_LIMIT")]
    RateLimit,
    #[serde(rename = "E_PROVIDER_AUTH")]
    ProviderAuth,
    #[serde(rename = "E_NETWORK")]
    Network,
    #[serde(rename = "E_REMOTE_API_ERROR")]
    RemoteApiError,
    #[serde(rename = "E_UNKNOWN")]
    Unknown,
}

impl ActionErrorCode {
    pub const ALL: [ActionErrorCode; 7] = [
        ActionErrorCode::ConfigMissing,
        ActionErrorCode::Validation,
        ActionErrorCode::RateLimit,
        ActionErrorCode::ProviderAuth,
        ActionErrorCode::Network,
        ActionErrorCode::RemoteApiError,
        ActionErrorCode::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionErrorCode::ConfigMissing => "E_CONFIG_MISSING",
            ActionErrorCode::Validation => "E_VALIDATION",
            ActionErrorCode::RateLimit => "E_RATE_LIMIT",
            ActionErrorCode::ProviderAuth => "E_PROVIDER_AUTH",
            ActionErrorCode::Network => "E_NETWORK",
            ActionErrorCode::RemoteApiError => "E_REMOTE_API_ERROR",
            ActionErrorCode::Unknown => "E_UNKNOWN",
        }
    }

    /// Whether the queue may try the job again
    ///
    /// Missing configuration, invalid input and rejected credentials fail the
    /// same way on every attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            ActionErrorCode::ConfigMissing | ActionErrorCode::Validation | ActionErrorCode::ProviderAuth
        )
    }

    /// Classifies an opaque error from its message and optional HTTP status
    pub fn classify(message: &str, status: Option<u16>) -> Self {
        if let Some(status) = status {
            match status {
                401 | 403 => return ActionErrorCode::ProviderAuth,
                429 => return ActionErrorCode::RateLimit,
                400 | 422 => return ActionErrorCode::Validation,
                408 | 502 | 503 | 504 => return ActionErrorCode::Network,
                s if s >= 400 => return ActionErrorCode::RemoteApiError,
                _ => {}
            }
        }

        let msg = message.to_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| msg.contains(n));

        if has(&["rate limit", "too many requests", "429"]) {
            ActionErrorCode::RateLimit
        } else if has(&["unauthorized", "forbidden", "invalid credentials", "authentication", "401", "403"]) {
            ActionErrorCode::ProviderAuth
        } else if has(&["timeout", "timed out", "econnrefused", "econnreset", "enotfound", "network", "socket", "dns"]) {
            ActionErrorCode::Network
        } else if has(&["config", "not configured", "credentials missing"]) {
            ActionErrorCode::ConfigMissing
        } else if has(&["required", "invalid", "validation", "missing"]) {
            ActionErrorCode::Validation
        } else if has(&["api error", "http ", "status"]) {
            ActionErrorCode::RemoteApiError
        } else {
            ActionErrorCode::Unknown
        }
    }
}

impl fmt::Display for ActionErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionErrorCode {
    type Err = ActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionErrorCode::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ActionError::Storage(format!("unknown action error code: {s}")))
    }
}

impl From<&PortError> for ActionErrorCode {
    fn from(error: &PortError) -> Self {
        match error {
            PortError::NotFound { .. } | PortError::Validation { .. } => ActionErrorCode::Validation,
            PortError::Unauthorized { .. } => ActionErrorCode::ProviderAuth,
            PortError::RateLimited { .. } => ActionErrorCode::RateLimit,
            PortError::Connection { .. }
            | PortError::Timeout { .. }
            | PortError::ServiceUnavailable { .. } => ActionErrorCode::Network,
            PortError::RemoteApi { status, message } => ActionErrorCode::classify(message, Some(*status)),
            PortError::Conflict { .. } | PortError::Transformation { .. } => ActionErrorCode::RemoteApiError,
            PortError::Internal { message, .. } => ActionErrorCode::classify(message, None),
        }
    }
}

/// Errors raised while executing or scheduling an action
#[derive(Debug, Error)]
pub enum ActionError {
    /// The action itself failed; surfaced to the caller with its code
    #[error("{code}: {message}")]
    Failed {
        code: ActionErrorCode,
        message: String,
    },

    /// No audit row exists for the idempotency key
    #[error("Action audit not found: {0}")]
    AuditNotFound(String),

    /// Queue backend failure
    #[error("Queue error: {0}")]
    Queue(String),

    /// Audit, lease or label store failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Payload could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ActionError {
    pub fn failed(code: ActionErrorCode, message: impl Into<String>) -> Self {
        ActionError::Failed {
            code,
            message: message.into(),
        }
    }

    pub fn config_missing(message: impl Into<String>) -> Self {
        Self::failed(ActionErrorCode::ConfigMissing, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::failed(ActionErrorCode::Validation, message)
    }

    /// Builds a failure from an untyped message, classifying it
    pub fn opaque(message: impl Into<String>) -> Self {
        let message = message.into();
        let code = ActionErrorCode::classify(&message, None);
        ActionError::Failed { code, message }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        ActionError::Storage(message.into())
    }

    /// Caller-facing code; infrastructure failures are `E_UNKNOWN`
    pub fn code(&self) -> ActionErrorCode {
        match self {
            ActionError::Failed { code, .. } => *code,
            ActionError::AuditNotFound(_) => ActionErrorCode::Validation,
            _ => ActionErrorCode::Unknown,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.code().is_retryable()
    }

    /// Message without the code prefix
    pub fn message(&self) -> String {
        match self {
            ActionError::Failed { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<PortError> for ActionError {
    fn from(error: PortError) -> Self {
        ActionError::Failed {
            code: ActionErrorCode::from(&error),
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryability() {
        assert!(!ActionErrorCode::ConfigMissing.is_retryable());
        assert!(!ActionErrorCode::Validation.is_retryable());
        assert!(!ActionErrorCode::ProviderAuth.is_retryable());
        assert!(ActionErrorCode::RateLimit.is_retryable());
        assert!(ActionErrorCode::Network.is_retryable());
        assert!(ActionErrorCode::RemoteApiError.is_retryable());
        assert!(ActionErrorCode::Unknown.is_retryable());
    }

    #[test]
    fn test_status_wins_over_message() {
        assert_eq!(ActionErrorCode::classify("boom", Some(401)), ActionErrorCode::ProviderAuth);
        assert_eq!(ActionErrorCode::classify("boom", Some(429)), ActionErrorCode::RateLimit);
        assert_eq!(ActionErrorCode::classify("timeout", Some(500)), ActionErrorCode::RemoteApiError);
        assert_eq!(ActionErrorCode::classify("x", Some(503)), ActionErrorCode::Network);
    }

    #[test]
    fn test_message_classification() {
        assert_eq!(ActionErrorCode::classify("connect ECONNREFUSED 10.0.0.1", None), ActionErrorCode::Network);
        assert_eq!(ActionErrorCode::classify("Too Many Requests", None), ActionErrorCode::RateLimit);
        assert_eq!(ActionErrorCode::classify("Trendyol config not configured", None), ActionErrorCode::ConfigMissing);
        assert_eq!(ActionErrorCode::classify("shipmentPackageId required", None), ActionErrorCode::Validation);
        assert_eq!(ActionErrorCode::classify("something odd", None), ActionErrorCode::Unknown);
    }

    #[test]
    fn test_port_error_mapping() {
        let err: ActionError = PortError::unauthorized("bad key").into();
        assert_eq!(err.code(), ActionErrorCode::ProviderAuth);
        assert!(!err.is_retryable());

        let err: ActionError = PortError::remote_api(500, "internal").into();
        assert_eq!(err.code(), ActionErrorCode::RemoteApiError);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(serde_json::to_string(&ActionErrorCode::RateLimit).unwrap(), "\"E_RATE_LIMIT\"");
        assert_eq!("E_NETWORK".parse::<ActionErrorCode>().unwrap(), ActionErrorCode::Network);
    }
}
