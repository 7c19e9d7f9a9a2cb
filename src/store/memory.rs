use super::{StorageDriver, StorageKey, StoreResult, error::StoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Thread-safe in-memory driver
///
/// Blobs live in a `HashMap` wrapped in `Arc<RwLock<_>>`. Cloning the driver
/// shares the map, so a clone observes every write of the original.
///
/// Readers proceed concurrently; a save takes the write lock only for the
/// map insert, which also makes it atomic per key.
#[derive(Default, Clone)]
pub struct MemoryDriver {
    data: Arc<RwLock<HashMap<StorageKey, Vec<u8>>>>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of stored blobs
    pub fn len(&self) -> StoreResult<usize> {
        let data = self
            .data
            .read()
            .map_err(|_| StoreError::lock_error("Failed to acquire read lock on store"))?;
        Ok(data.len())
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        self.len().map(|len| len == 0)
    }
}

#[async_trait]
impl StorageDriver for MemoryDriver {
    async fn save(&self, key: &StorageKey, bytes: &[u8]) -> StoreResult<()> {
        let mut data = self
            .data
            .write()
            .map_err(|_| StoreError::lock_error("Failed to acquire write lock on store"))?;

        data.insert(key.clone(), bytes.to_vec());
        Ok(())
    }

    async fn load(&self, key: &StorageKey) -> StoreResult<Vec<u8>> {
        let data = self
            .data
            .read()
            .map_err(|_| StoreError::lock_error("Failed to acquire read lock on store"))?;

        data.get(key)
            .cloned()
            .ok_or_else(|| StoreError::key_not_found(key.to_string()))
    }

    async fn exists(&self, key: &StorageKey) -> StoreResult<bool> {
        let data = self
            .data
            .read()
            .map_err(|_| StoreError::lock_error("Failed to acquire read lock on store"))?;

        Ok(data.contains_key(key))
    }
}
