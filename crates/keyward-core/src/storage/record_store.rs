use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use thiserror::Error;

/// Errors produced by record store implementations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordStoreError {
    /// Requested key does not exist.
    #[error("entry not found for key: {key}")]
    NotFound { key: String },
    /// Underlying storage failure.
    #[error("storage failure: {reason}")]
    Storage { reason: String },
}

/// Storage collaborator for inventory tables: opaque bytes under string keys.
/// Secret columns arrive here already sealed by a `FieldCipher`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist a value under a key, overwriting any existing entry.
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), RecordStoreError>;

    /// Retrieve the value for a key.
    async fn get(&self, key: &str) -> Result<Vec<u8>, RecordStoreError>;

    /// Remove a key and its value (idempotent).
    async fn delete(&self, key: &str) -> Result<(), RecordStoreError>;
}

/// In-memory record store for tests and dry runs.
#[derive(Debug, Default, Clone)]
pub struct InMemoryRecordStore {
    inner: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys currently held, sorted.
    pub fn keys(&self) -> Result<Vec<String>, RecordStoreError> {
        let map = self.lock()?;
        let mut keys: Vec<String> = map.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>, RecordStoreError> {
        self.inner.lock().map_err(|err| RecordStoreError::Storage {
            reason: format!("lock poisoned: {err}"),
        })
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), RecordStoreError> {
        self.lock()?.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, RecordStoreError> {
        self.lock()?
            .get(key)
            .cloned()
            .ok_or_else(|| RecordStoreError::NotFound {
                key: key.to_string(),
            })
    }

    async fn delete(&self, key: &str) -> Result<(), RecordStoreError> {
        self.lock()?.remove(key);
        Ok(())
    }
}
