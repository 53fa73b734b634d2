//! Local repository of connection records

use std::path::PathBuf;

use async_trait::async_trait;
use lockstep_core::{ConnectionRecord, DeviceId, RecordStore};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::ServiceError;

#[async_trait]
pub trait LocalRepository: Send + Sync {
    /// Look up a record by identifier (MAC address or thing-name)
    async fn get(&self, identifier: &DeviceId) -> Result<Option<ConnectionRecord>, ServiceError>;

    async fn delete(&self, record: &ConnectionRecord) -> Result<(), ServiceError>;

    /// Insert or replace a record
    async fn save(&self, record: ConnectionRecord) -> Result<(), ServiceError>;

    async fn list(&self) -> Result<Vec<ConnectionRecord>, ServiceError>;
}

/// [`LocalRepository`] over a [`RecordStore`] JSON file
pub struct JsonFileRepository {
    store: RwLock<RecordStore>,
}

impl JsonFileRepository {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ServiceError> {
        let store = RecordStore::open(path)?;
        debug!(path = %store.path().display(), records = store.len(), "Opened record store");
        Ok(Self {
            store: RwLock::new(store),
        })
    }
}

#[async_trait]
impl LocalRepository for JsonFileRepository {
    async fn get(&self, identifier: &DeviceId) -> Result<Option<ConnectionRecord>, ServiceError> {
        let store = self.store.read().await;
        let record = store
            .get(identifier)
            .or_else(|| store.find_by_thing_name(identifier.as_str()));
        Ok(record.cloned())
    }

    async fn delete(&self, record: &ConnectionRecord) -> Result<(), ServiceError> {
        let mut store = self.store.write().await;
        if !store.remove(&record.identifier)? {
            return Err(ServiceError::NotFound(record.identifier.to_string()));
        }
        debug!(device = %record.identifier, "Deleted connection record");
        Ok(())
    }

    async fn save(&self, record: ConnectionRecord) -> Result<(), ServiceError> {
        let mut store = self.store.write().await;
        debug!(device = %record.identifier, "Saving connection record");
        store.save(record)?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ConnectionRecord>, ServiceError> {
        let store = self.store.read().await;
        Ok(store.records().cloned().collect())
    }
}
