//! Advisory leases with a TTL
//!
//! A lease is the only exclusion primitive of the action path. It is keyed
//! by idempotency key and expires on its own when the holder dies, after
//! which the next caller may take it over. Release and renewal check the
//! holder's token so a stale holder cannot drop somebody else's lease.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use core_kernel::Clock;

use crate::error::ActionError;

/// Lease key for an action's idempotency key
pub fn action_lease_key(idempotency_key: &str) -> String {
    format!("action:{idempotency_key}")
}

/// A held lease
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub key: String,
    pub token: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// Set-if-not-exists with expiry
#[async_trait]
pub trait LeaseProvider: Send + Sync {
    /// Takes the lease unless a live one exists
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<Option<Lease>, ActionError>;

    /// Extends a lease still held under the same token
    async fn renew(&self, lease: &Lease, ttl: Duration) -> Result<Option<Lease>, ActionError>;

    /// Drops the lease; `false` when it had expired or changed hands
    async fn release(&self, lease: &Lease) -> Result<bool, ActionError>;
}

/// Process-local lease table
pub struct MemoryLeaseProvider {
    clock: Arc<dyn Clock>,
    leases: Mutex<HashMap<String, Lease>>,
}

impl MemoryLeaseProvider {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            leases: Mutex::new(HashMap::new()),
        }
    }

    fn table(&self) -> std::sync::MutexGuard<'_, HashMap<String, Lease>> {
        self.leases.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl LeaseProvider for MemoryLeaseProvider {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<Option<Lease>, ActionError> {
        let now = self.clock.now();
        let mut table = self.table();
        if let Some(current) = table.get(key) {
            if current.expires_at > now {
                return Ok(None);
            }
        }
        let lease = Lease {
            key: key.to_string(),
            token: Uuid::new_v4(),
            expires_at: now + ttl,
        };
        table.insert(key.to_string(), lease.clone());
        Ok(Some(lease))
    }

    async fn renew(&self, lease: &Lease, ttl: Duration) -> Result<Option<Lease>, ActionError> {
        let now = self.clock.now();
        let mut table = self.table();
        match table.get_mut(&lease.key) {
            Some(current) if current.token == lease.token && current.expires_at > now => {
                current.expires_at = now + ttl;
                Ok(Some(current.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn release(&self, lease: &Lease) -> Result<bool, ActionError> {
        let mut table = self.table();
        match table.get(&lease.key) {
            Some(current) if current.token == lease.token => {
                table.remove(&lease.key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
