//! Label store-and-hash
//!
//! A fetched label is hashed (SHA-256), written to object storage and
//! recorded under `(company, marketplace, shipment package)`. Fetching the
//! same package again overwrites the record. A storage failure is logged and
//! the label record is kept without a storage key.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use core_kernel::{Clock, CompanyId, DomainPort, LabelId, Marketplace, PortError};

use crate::error::ActionError;
use crate::gateway::LabelDocument;

/// Blob storage for label documents
#[async_trait]
pub trait ObjectStorage: DomainPort {
    /// Writes the object and returns its key
    async fn store(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<String, PortError>;

    async fn signed_url(&self, key: &str, ttl: Duration) -> Result<String, PortError>;
}

#[derive(Default)]
pub struct MemoryObjectStorage {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryObjectStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap_or_else(|e| e.into_inner()).get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DomainPort for MemoryObjectStorage {}

#[async_trait]
impl ObjectStorage for MemoryObjectStorage {
    async fn store(&self, key: &str, bytes: &[u8], _content_type: &str) -> Result<String, PortError> {
        let mut objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
        objects.insert(key.to_string(), bytes.to_vec());
        Ok(key.to_string())
    }

    async fn signed_url(&self, key: &str, ttl: Duration) -> Result<String, PortError> {
        if self.get(key).is_none() {
            return Err(PortError::not_found("Object", key));
        }
        Ok(format!("memory://{key}?expires={}", ttl.num_seconds()))
    }
}

/// Stored label metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelRecord {
    pub id: LabelId,
    pub company_id: CompanyId,
    pub marketplace: Marketplace,
    pub shipment_package_id: String,
    pub storage_key: Option<String>,
    pub sha256: String,
    pub size: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait LabelRepository: Send + Sync {
    /// Inserts or overwrites by `(company, marketplace, shipment package)`
    async fn upsert(&self, record: LabelRecord) -> Result<LabelRecord, ActionError>;

    async fn find(
        &self,
        company_id: CompanyId,
        marketplace: Marketplace,
        shipment_package_id: &str,
    ) -> Result<Option<LabelRecord>, ActionError>;
}

type LabelKey = (CompanyId, Marketplace, String);

#[derive(Default)]
pub struct MemoryLabelRepository {
    labels: Mutex<HashMap<LabelKey, LabelRecord>>,
}

impl MemoryLabelRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LabelRepository for MemoryLabelRepository {
    async fn upsert(&self, record: LabelRecord) -> Result<LabelRecord, ActionError> {
        let mut labels = self.labels.lock().unwrap_or_else(|e| e.into_inner());
        let key = (record.company_id, record.marketplace, record.shipment_package_id.clone());
        let stored = match labels.get(&key) {
            Some(existing) => LabelRecord {
                id: existing.id,
                created_at: existing.created_at,
                ..record
            },
            None => record,
        };
        labels.insert(key, stored.clone());
        Ok(stored)
    }

    async fn find(
        &self,
        company_id: CompanyId,
        marketplace: Marketplace,
        shipment_package_id: &str,
    ) -> Result<Option<LabelRecord>, ActionError> {
        let labels = self.labels.lock().unwrap_or_else(|e| e.into_inner());
        Ok(labels
            .get(&(company_id, marketplace, shipment_package_id.to_string()))
            .cloned())
    }
}

/// Hex SHA-256 of a document
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Object key for a company's label
pub fn label_storage_key(company_id: CompanyId, marketplace: Marketplace, shipment_package_id: &str) -> String {
    format!("labels/{}/{}/{}.pdf", company_id.as_uuid(), marketplace.code().to_lowercase(), shipment_package_id)
}

pub struct LabelStore {
    storage: Arc<dyn ObjectStorage>,
    repository: Arc<dyn LabelRepository>,
    clock: Arc<dyn Clock>,
}

impl LabelStore {
    pub fn new(storage: Arc<dyn ObjectStorage>, repository: Arc<dyn LabelRepository>, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            repository,
            clock,
        }
    }

    pub async fn store(
        &self,
        company_id: CompanyId,
        marketplace: Marketplace,
        shipment_package_id: &str,
        document: &LabelDocument,
    ) -> Result<LabelRecord, ActionError> {
        let now = self.clock.now();
        let sha256 = content_hash(&document.content);
        let key = label_storage_key(company_id, marketplace, shipment_package_id);

        let storage_key = match self.storage.store(&key, &document.content, &document.content_type).await {
            Ok(stored) => Some(stored),
            Err(e) => {
                warn!(
                    company_id = %company_id,
                    marketplace = %marketplace,
                    shipment_package_id,
                    error = %e,
                    "Label upload failed; keeping hash only"
                );
                None
            }
        };

        let record = self
            .repository
            .upsert(LabelRecord {
                id: LabelId::new_v7(),
                company_id,
                marketplace,
                shipment_package_id: shipment_package_id.to_string(),
                storage_key,
                sha256,
                size: document.content.len(),
                created_at: now,
                updated_at: now,
            })
            .await?;

        info!(
            company_id = %company_id,
            marketplace = %marketplace,
            shipment_package_id,
            size = record.size,
            "Label stored"
        );
        Ok(record)
    }
}
