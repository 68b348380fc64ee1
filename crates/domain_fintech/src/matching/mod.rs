//! Payment matching: learned rules, confidence scoring and the edge-case diary

pub mod diary;
pub mod engine;
pub mod rules;

pub use diary::{DiaryEntry, DiaryError, EdgeCaseDiary, JsonlDiary, MemoryDiary};
pub use engine::{
    ConfidenceBucket, MatchStatus, MatchType, MatchingConfig, PaymentMatch, PaymentMatchingEngine,
};
pub use rules::{MatchingRule, RuleLearner, TargetType};
