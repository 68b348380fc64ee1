//! PostgreSQL lease provider
//!
//! `action_leases` holds one row per lease key. Acquisition is a single
//! upsert that only overwrites an expired row, so two processes can never
//! both hold a live lease. Expiry is judged against the injected clock.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use core_kernel::Clock;
use domain_actions::{ActionError, Lease, LeaseProvider};

use crate::error::DatabaseError;

pub struct PgLeaseProvider {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl PgLeaseProvider {
    pub fn new(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    /// Deletes expired rows; returns how many went
    pub async fn purge_expired(&self) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM action_leases WHERE expires_at <= $1")
            .bind(self.clock.now())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl LeaseProvider for PgLeaseProvider {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<Option<Lease>, ActionError> {
        let now = self.clock.now();
        let row = sqlx::query(
            "INSERT INTO action_leases (key, token, expires_at) VALUES ($1, $2, $3) \
             ON CONFLICT (key) DO UPDATE SET token = EXCLUDED.token, expires_at = EXCLUDED.expires_at \
             WHERE action_leases.expires_at <= $4 \
             RETURNING key, token, expires_at",
        )
        .bind(key)
        .bind(Uuid::new_v4())
        .bind(now + ttl)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from)?;

        if row.is_none() {
            debug!(lease_key = key, "Lease held by another caller");
        }
        Ok(row.map(|r| row_to_lease(&r)).transpose()?)
    }

    async fn renew(&self, lease: &Lease, ttl: Duration) -> Result<Option<Lease>, ActionError> {
        let now = self.clock.now();
        let row = sqlx::query(
            "UPDATE action_leases SET expires_at = $3 \
             WHERE key = $1 AND token = $2 AND expires_at > $4 \
             RETURNING key, token, expires_at",
        )
        .bind(&lease.key)
        .bind(lease.token)
        .bind(now + ttl)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from)?;
        Ok(row.map(|r| row_to_lease(&r)).transpose()?)
    }

    async fn release(&self, lease: &Lease) -> Result<bool, ActionError> {
        let result = sqlx::query("DELETE FROM action_leases WHERE key = $1 AND token = $2")
            .bind(&lease.key)
            .bind(lease.token)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from)?;
        Ok(result.rows_affected() > 0)
    }
}

fn row_to_lease(row: &sqlx::postgres::PgRow) -> Result<Lease, DatabaseError> {
    let expires_at: DateTime<Utc> = row.try_get("expires_at")?;
    Ok(Lease {
        key: row.try_get("key")?,
        token: row.try_get("token")?,
        expires_at,
    })
}
