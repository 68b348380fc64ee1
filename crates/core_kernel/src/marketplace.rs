//! Marketplaces the back office settles with

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// A sales channel whose settlements, orders and labels flow through the core
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Marketplace {
    Trendyol,
    Hepsiburada,
    N11,
    Pazarama,
    Amazon,
    Ciceksepeti,
}

impl Marketplace {
    pub const ALL: [Marketplace; 6] = [
        Marketplace::Trendyol,
        Marketplace::Hepsiburada,
        Marketplace::N11,
        Marketplace::Pazarama,
        Marketplace::Amazon,
        Marketplace::Ciceksepeti,
    ];

    /// Upper-case code used in event types and bank descriptions
    pub fn code(&self) -> &'static str {
        match self {
            Marketplace::Trendyol => "TRENDYOL",
            Marketplace::Hepsiburada => "HEPSIBURADA",
            Marketplace::N11 => "N11",
            Marketplace::Pazarama => "PAZARAMA",
            Marketplace::Amazon => "AMAZON",
            Marketplace::Ciceksepeti => "CICEKSEPETI",
        }
    }
}

impl fmt::Display for Marketplace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Marketplace {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        Marketplace::ALL
            .into_iter()
            .find(|m| m.code() == wanted)
            .ok_or_else(|| CoreError::validation(format!("unknown marketplace: {s}")))
    }
}
