//! Infrastructure Database Layer
//!
//! PostgreSQL adapters for the ports that must survive a process restart
//! and be shared between API and worker processes: the action audit store
//! and the lease provider. The rest of the relational model lives in
//! `migrations/0001_backoffice.sql`, applied with [`run_migrations`].
//!
//! Queries are checked at runtime (`sqlx::query` with binds), so building
//! the crate needs no live database.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, run_migrations, DatabaseConfig, PgActionAuditStore};
//!
//! let pool = create_pool(DatabaseConfig::new("postgres://localhost/backoffice")).await?;
//! run_migrations(&pool).await?;
//! let audits = PgActionAuditStore::new(pool.clone());
//! ```

pub mod action_audit;
pub mod error;
pub mod lease;
pub mod pool;

pub use action_audit::PgActionAuditStore;
pub use error::DatabaseError;
pub use lease::PgLeaseProvider;
pub use pool::{create_pool, create_pool_from_url, ping, run_migrations, DatabaseConfig, DatabasePool};
