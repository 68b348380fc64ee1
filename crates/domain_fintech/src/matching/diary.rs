//! Edge-case diary
//!
//! Every low-confidence bank line is appended here as one JSON line so that
//! new matching patterns can be discovered offline. Lines are written after
//! the ledger transaction commits, so a rolled-back import leaves no line.
//! The diary is advisory: a write failure is logged and nothing more.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

use core_kernel::{BankTransactionId, CompanyId};

use crate::banking::{Direction, TransactionTags};
use crate::mode::OperatingMode;

/// Diary write failure
#[derive(Debug, Error)]
pub enum DiaryError {
    #[error("diary io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("diary serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One diary line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiaryEntry {
    pub company_id: CompanyId,
    pub bank_transaction_id: BankTransactionId,
    pub description: String,
    pub amount: Decimal,
    pub direction: Direction,
    pub confidence_score: u8,
    pub mode: OperatingMode,
    pub posted_to_suspense: bool,
    pub tags: TransactionTags,
    pub recorded_at: DateTime<Utc>,
}

pub trait EdgeCaseDiary: Send + Sync {
    fn record(&self, entry: &DiaryEntry) -> Result<(), DiaryError>;
}

/// Appends JSON lines to a file, creating parent directories on first use
pub struct JsonlDiary {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlDiary {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EdgeCaseDiary for JsonlDiary {
    fn record(&self, entry: &DiaryEntry) -> Result<(), DiaryError> {
        let line = serde_json::to_string(entry)?;
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        Ok(())
    }
}

/// In-memory diary for tests and dry runs
#[derive(Default)]
pub struct MemoryDiary {
    entries: Mutex<Vec<DiaryEntry>>,
}

impl MemoryDiary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<DiaryEntry> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl EdgeCaseDiary for MemoryDiary {
    fn record(&self, entry: &DiaryEntry) -> Result<(), DiaryError> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn entry() -> DiaryEntry {
        DiaryEntry {
            company_id: CompanyId::new(),
            bank_transaction_id: BankTransactionId::new(),
            description: "EFT: ALI VELI".into(),
            amount: dec!(850),
            direction: Direction::In,
            confidence_score: 0,
            mode: OperatingMode::DryRun,
            posted_to_suspense: false,
            tags: TransactionTags::default(),
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn test_jsonl_appends_one_line_per_entry() {
        let dir = std::env::temp_dir().join(format!("diary-{}", uuid::Uuid::new_v4()));
        let diary = JsonlDiary::new(dir.join("nested").join("edge-cases.jsonl"));

        diary.record(&entry()).unwrap();
        diary.record(&entry()).unwrap();

        let contents = fs::read_to_string(diary.path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: DiaryEntry = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed.amount, dec!(850));

        let _ = fs::remove_dir_all(dir);
    }
}
