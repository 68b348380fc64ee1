//! Dead-letter administration DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::Marketplace;
use domain_actions::{ActionKind, DeadLetteredJob, ReplayTarget};

use crate::error::ApiError;

/// `{ "jobIds": [...] }` or `{ "all": true }`
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayRequest {
    #[serde(default)]
    pub job_ids: Vec<String>,
    #[serde(default)]
    pub all: bool,
}

impl ReplayRequest {
    pub fn into_target(self) -> Result<ReplayTarget, ApiError> {
        match (self.all, self.job_ids.is_empty()) {
            (true, true) => Ok(ReplayTarget::All),
            (false, false) => Ok(ReplayTarget::Ids(self.job_ids)),
            (true, false) => Err(ApiError::BadRequest("give either jobIds or all, not both".to_string())),
            (false, true) => Err(ApiError::BadRequest("jobIds must not be empty".to_string())),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterView {
    pub job_id: String,
    pub marketplace: Marketplace,
    pub action: ActionKind,
    pub order_number: String,
    pub attempts_made: u32,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

impl From<DeadLetteredJob> for DeadLetterView {
    fn from(dead: DeadLetteredJob) -> Self {
        Self {
            job_id: dead.job.id,
            marketplace: dead.job.request.marketplace,
            action: dead.job.request.action,
            order_number: dead.job.request.order_number,
            attempts_made: dead.job.attempts_made,
            error: dead.error,
            failed_at: dead.failed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replay_target_from_body() {
        let all: ReplayRequest = serde_json::from_str(r#"{"all": true}"#).unwrap();
        assert_eq!(all.into_target().unwrap(), ReplayTarget::All);

        let ids: ReplayRequest = serde_json::from_str(r#"{"jobIds": ["a", "b"]}"#).unwrap();
        assert_eq!(
            ids.into_target().unwrap(),
            ReplayTarget::Ids(vec!["a".to_string(), "b".to_string()])
        );

        let empty: ReplayRequest = serde_json::from_str("{}").unwrap();
        assert!(matches!(empty.into_target(), Err(ApiError::BadRequest(_))));
    }
}
