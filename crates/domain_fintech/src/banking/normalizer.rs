//! Free-text tagging of bank descriptions
//!
//! Turkish bank exports mix dotted/dotless letters, irregular spacing and
//! ad-hoc order number formats. `TransactionNormalizer` folds all of that
//! into a canonical upper-case string and pulls out the few tags the
//! matching engine and the edge-case diary care about.

use serde::{Deserialize, Serialize};

use core_kernel::Marketplace;

/// Channel the money moved through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransferChannel {
    Eft,
    Havale,
    Fast,
    Pos,
}

/// Tags extracted from a description
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionTags {
    pub normalized: String,
    pub marketplace: Option<Marketplace>,
    pub channel: Option<TransferChannel>,
    pub order_number: Option<String>,
    /// Marketplace settlement payout (HAKEDIS)
    pub is_settlement_payout: bool,
    pub is_rent: bool,
}

pub struct TransactionNormalizer;

impl TransactionNormalizer {
    /// Upper-cases with Turkish folding and collapses whitespace
    pub fn normalize(description: &str) -> String {
        let folded: String = description
            .chars()
            .map(|c| match c {
                'ç' | 'Ç' => 'C',
                'ğ' | 'Ğ' => 'G',
                'ı' | 'İ' | 'i' => 'I',
                'ö' | 'Ö' => 'O',
                'ş' | 'Ş' => 'S',
                'ü' | 'Ü' => 'U',
                other => other.to_ascii_uppercase(),
            })
            .collect();
        folded.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    pub fn parse(description: &str) -> TransactionTags {
        let normalized = Self::normalize(description);
        let words: Vec<&str> = normalized
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        let marketplace = Marketplace::ALL
            .into_iter()
            .find(|m| words.iter().any(|w| *w == m.code()));

        let channel = words.iter().find_map(|w| match *w {
            "EFT" => Some(TransferChannel::Eft),
            "HAVALE" => Some(TransferChannel::Havale),
            "FAST" => Some(TransferChannel::Fast),
            "POS" => Some(TransferChannel::Pos),
            _ => None,
        });

        TransactionTags {
            order_number: Self::order_number(&words),
            is_settlement_payout: words.iter().any(|w| w.starts_with("HAKEDIS")),
            is_rent: words.iter().any(|w| *w == "KIRA"),
            marketplace,
            channel,
            normalized,
        }
    }

    /// Finds `SIPARIS#1234`, `SIPARIS NO 1234` or `SIP NO: 1234`
    fn order_number(words: &[&str]) -> Option<String> {
        let start = words
            .iter()
            .position(|w| *w == "SIPARIS" || *w == "SIP")?;
        words[start + 1..]
            .iter()
            .take(2)
            .find(|w| w.chars().all(|c| c.is_ascii_digit()))
            .map(|w| w.to_string())
    }
}
