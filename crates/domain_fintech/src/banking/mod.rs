//! Bank ingestion: fingerprinting, description tagging, connection
//! lifecycle and the sync loop that feeds imported lines into the event log.

pub mod connection;
pub mod fingerprint;
pub mod normalizer;
pub mod sync;
pub mod transaction;

pub use connection::{BankConnection, BankErrorCode, ConnectionService, ConnectionStatus, StatusChange};
pub use fingerprint::fingerprint;
pub use normalizer::{TransactionNormalizer, TransactionTags, TransferChannel};
pub use sync::{BankSyncEngine, SourceError, SyncOutcome, SyncReport, TransactionSource};
pub use transaction::{BankTransaction, BankTransactionStatus, Direction, RawBankRecord};
