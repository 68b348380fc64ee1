//! Test Utilities Crate
//!
//! Provides shared test infrastructure, fixtures, and helpers for the
//! back-office test suite.
//!
//! # Modules
//!
//! - `fixtures`: The golden bank dataset, seed rules and fixed instants
//! - `builders`: Builder patterns for events, settlements, statements and action requests
//! - `fakes`: Scriptable collaborators (transaction source, marketplace gateway, storage)
//! - `harness`: Ready-wired ledger and action stacks on in-memory stores
//! - `assertions`: Custom assertion helpers for ledger types
//! - `generators`: Property-based test data generators

pub mod fixtures;
pub mod builders;
pub mod fakes;
pub mod harness;
pub mod assertions;
pub mod generators;

pub use fixtures::*;
pub use builders::*;
pub use fakes::*;
pub use harness::*;
pub use assertions::*;
pub use generators::*;
