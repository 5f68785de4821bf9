use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::{BlockStore, StorageError};

/// In-memory store for tests and dry runs. Nothing is persisted.
#[derive(Clone, Default)]
pub struct MemoryBlockStore {
    records: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<String> {
        self.records
            .read()
            .map(|records| records.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl BlockStore for MemoryBlockStore {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, StorageError> {
        let records = self
            .records
            .read()
            .expect("memory store read lock poisoned");
        Ok(records.get(key).cloned())
    }

    async fn put_raw(&self, key: &str, value: String) -> Result<(), StorageError> {
        let mut records = self
            .records
            .write()
            .expect("memory store write lock poisoned");
        records.insert(key.to_string(), value);
        Ok(())
    }
}
