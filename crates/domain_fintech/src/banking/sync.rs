//! Bank sync engine
//!
//! Pulls normalized records from an injected `TransactionSource` and feeds
//! them through the event log. The fetch happens outside any store
//! transaction; each record is then stored in its own transaction together
//! with its `BANK_TRANSACTION_IMPORTED` event and the matching reaction.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use core_kernel::{BankConnectionId, CompanyId, DomainPort, PortError};

use crate::error::FintechError;
use crate::event_log::EventLog;
use crate::events::{AggregateType, EventKind, NewEvent};

use super::connection::{BankConnection, BankErrorCode, ConnectionService, ConnectionStatus};
use super::fingerprint::fingerprint;
use super::normalizer::TransactionNormalizer;
use super::transaction::{BankTransaction, RawBankRecord};

/// Failure reported by a transaction source
///
/// Sources that know what went wrong set `code` at origin; anything else is
/// classified from the message text.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct SourceError {
    code: Option<BankErrorCode>,
    message: String,
}

impl SourceError {
    pub fn classified(code: BankErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }

    pub fn opaque(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn code(&self) -> BankErrorCode {
        self.code
            .unwrap_or_else(|| BankErrorCode::classify_message(&self.message))
    }
}

impl From<PortError> for SourceError {
    fn from(err: PortError) -> Self {
        let code = match &err {
            PortError::Unauthorized { .. } => Some(BankErrorCode::AuthFailed),
            PortError::RateLimited { .. } => Some(BankErrorCode::RateLimit),
            PortError::Timeout { .. } => Some(BankErrorCode::Timeout),
            PortError::ServiceUnavailable { .. } => Some(BankErrorCode::BankDown),
            PortError::Transformation { .. } => Some(BankErrorCode::FormatMismatch),
            PortError::RemoteApi { status, .. } => match status {
                401 => Some(BankErrorCode::AuthFailed),
                403 => Some(BankErrorCode::NoPermission),
                429 => Some(BankErrorCode::RateLimit),
                502..=504 => Some(BankErrorCode::BankDown),
                _ => None,
            },
            _ => None,
        };
        Self {
            code,
            message: err.to_string(),
        }
    }
}

/// Provider of bank transactions for one connection
#[async_trait]
pub trait TransactionSource: DomainPort {
    async fn fetch(&self, connection: &BankConnection) -> Result<Vec<RawBankRecord>, SourceError>;
}

/// Counts from one sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub connection_id: BankConnectionId,
    pub fetched: usize,
    pub imported: usize,
    pub duplicates: usize,
    pub failed: usize,
}

/// Per-connection result of `sync_all`
#[derive(Debug)]
pub struct SyncOutcome {
    pub connection_id: BankConnectionId,
    pub result: Result<SyncReport, FintechError>,
}

pub struct BankSyncEngine {
    event_log: Arc<EventLog>,
}

impl BankSyncEngine {
    pub fn new(event_log: Arc<EventLog>) -> Self {
        Self { event_log }
    }

    /// Syncs one connection
    ///
    /// Returns the number of newly stored rows in the report. A fetch failure
    /// is recorded on the connection (ERROR + backoff + `BANK_SYNC_FAILED`)
    /// and returned as `FintechError::BankSync`.
    pub async fn sync_connection(
        &self,
        connection_id: BankConnectionId,
        source: &dyn TransactionSource,
    ) -> Result<SyncReport, FintechError> {
        let store = self.event_log.store();
        let connection = store
            .read(|tx| {
                tx.bank_connection(connection_id)
                    .ok_or_else(|| FintechError::not_found("BankConnection", connection_id))
            })
            .await?;

        if connection.status == ConnectionStatus::Draft {
            return Err(FintechError::InvalidTransition {
                from: ConnectionStatus::Draft,
                to: ConnectionStatus::Active,
            });
        }

        info!(connection_id = %connection_id, bank = %connection.bank_name, "Starting bank sync");

        let records = match source.fetch(&connection).await {
            Ok(records) => records,
            Err(err) => {
                let code = err.code();
                let message = err.to_string();
                warn!(connection_id = %connection_id, code = %code, error = %message, "Bank fetch failed");
                self.record_failure(&connection, code, &message).await?;
                return Err(FintechError::BankSync { code, message });
            }
        };

        let mut report = SyncReport {
            connection_id,
            fetched: records.len(),
            imported: 0,
            duplicates: 0,
            failed: 0,
        };

        for record in &records {
            match self.import_record(&connection, record).await {
                Ok(true) => report.imported += 1,
                Ok(false) => report.duplicates += 1,
                Err(e) if e.is_conflict() => report.duplicates += 1,
                Err(e) => {
                    error!(connection_id = %connection_id, provider_id = %record.id, error = %e, "Failed to import bank record");
                    report.failed += 1;
                }
            }
        }

        let now = self.event_log.clock().now();
        store
            .transaction(|tx| ConnectionService::record_success(tx, connection_id, now).map(|_| ()))
            .await?;

        info!(
            connection_id = %connection_id,
            fetched = report.fetched,
            imported = report.imported,
            duplicates = report.duplicates,
            "Bank sync finished"
        );
        Ok(report)
    }

    /// Syncs every due connection of a company, sequentially
    ///
    /// One connection failing does not stop the rest.
    pub async fn sync_all(
        &self,
        company_id: CompanyId,
        source: &dyn TransactionSource,
    ) -> Result<Vec<SyncOutcome>, FintechError> {
        let now = self.event_log.clock().now();
        let due: Vec<BankConnectionId> = self
            .event_log
            .store()
            .read(|tx| {
                Ok(tx
                    .bank_connections(company_id)
                    .into_iter()
                    .filter(|c| c.is_due(now))
                    .map(|c| c.id)
                    .collect())
            })
            .await?;

        let mut outcomes = Vec::with_capacity(due.len());
        for connection_id in due {
            let result = self.sync_connection(connection_id, source).await;
            outcomes.push(SyncOutcome {
                connection_id,
                result,
            });
        }
        Ok(outcomes)
    }

    async fn import_record(
        &self,
        connection: &BankConnection,
        record: &RawBankRecord,
    ) -> Result<bool, FintechError> {
        let fp = fingerprint(connection.id, record);
        let now = self.event_log.clock().now();
        let event_log = &self.event_log;

        self.event_log
            .transaction(|tx| {
                if tx.find_bank_transaction(connection.id, &fp).is_some() {
                    return Ok(false);
                }

                let bank_tx = BankTransaction::from_raw(connection.company_id, connection.id, fp.clone(), record, now);
                tx.insert_bank_transaction(bank_tx.clone())?;

                let event = NewEvent::new(
                    connection.company_id,
                    AggregateType::Journal,
                    bank_tx.id,
                    EventKind::BankTransactionImported {
                        bank_transaction_id: bank_tx.id,
                        bank_connection_id: connection.id,
                        amount: bank_tx.amount,
                        currency: bank_tx.currency,
                        direction: bank_tx.direction,
                        description: bank_tx.description.clone(),
                        tags: TransactionNormalizer::parse(&bank_tx.description),
                    },
                );
                event_log.emit_in(tx, event)?;
                Ok(true)
            })
            .await
    }

    async fn record_failure(
        &self,
        connection: &BankConnection,
        code: BankErrorCode,
        message: &str,
    ) -> Result<(), FintechError> {
        let now = self.event_log.clock().now();
        let event_log = &self.event_log;

        self.event_log
            .transaction(|tx| {
                ConnectionService::record_failure(tx, connection.id, code, message, now)?;
                event_log.emit_in(
                    tx,
                    NewEvent::new(
                        connection.company_id,
                        AggregateType::Journal,
                        connection.id,
                        EventKind::BankSyncFailed {
                            bank_connection_id: connection.id,
                            error_code: code,
                            message: message.to_string(),
                        },
                    ),
                )?;
                Ok(())
            })
            .await
    }
}
