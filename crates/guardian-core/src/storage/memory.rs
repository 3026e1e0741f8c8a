//! In-memory key-value store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use super::{KvStore, Mutation};
use crate::error::StorageError;

/// Volatile store backed by a `HashMap`; used by tests and embedders that
/// persist state elsewhere.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn update(&self, key: &str, mutate: Mutation) -> Result<String, StorageError> {
        // Lock held across the mutation: this is what makes update atomic.
        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        let next = mutate(entries.get(key).cloned())?;
        entries.insert(key.to_string(), next.clone());
        Ok(next)
    }
}
