//! Operating mode gate for side-effecting automation

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::FintechError;

/// How much of the pipeline is allowed to touch real state
///
/// `DryRun` and `LivePull` run every decision but never post ledger entries
/// from the matching engine. `LivePull` only differs in that ingestion uses
/// real bank data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperatingMode {
    #[default]
    DryRun,
    LivePull,
    LiveAll,
}

impl OperatingMode {
    /// Whether auto-confirm and suspense postings may write to the ledger
    pub fn allows_ledger_side_effects(&self) -> bool {
        matches!(self, OperatingMode::LiveAll)
    }

    /// Event-level mode wins over the process default
    pub fn resolve(event_mode: Option<OperatingMode>, default: OperatingMode) -> OperatingMode {
        event_mode.unwrap_or(default)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperatingMode::DryRun => "DRY_RUN",
            OperatingMode::LivePull => "LIVE_PULL",
            OperatingMode::LiveAll => "LIVE_ALL",
        }
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperatingMode {
    type Err = FintechError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "DRY_RUN" => Ok(OperatingMode::DryRun),
            "LIVE_PULL" => Ok(OperatingMode::LivePull),
            "LIVE_ALL" => Ok(OperatingMode::LiveAll),
            other => Err(FintechError::validation(format!("unknown operating mode: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_live_all_posts() {
        assert!(!OperatingMode::DryRun.allows_ledger_side_effects());
        assert!(!OperatingMode::LivePull.allows_ledger_side_effects());
        assert!(OperatingMode::LiveAll.allows_ledger_side_effects());
    }

    #[test]
    fn test_event_mode_overrides_default() {
        let mode = OperatingMode::resolve(Some(OperatingMode::LiveAll), OperatingMode::DryRun);
        assert_eq!(mode, OperatingMode::LiveAll);
        assert_eq!(OperatingMode::resolve(None, OperatingMode::LivePull), OperatingMode::LivePull);
    }

    #[test]
    fn test_parse() {
        assert_eq!("live-all".parse::<OperatingMode>().unwrap(), OperatingMode::LiveAll);
        assert!("yolo".parse::<OperatingMode>().is_err());
    }
}
