pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::models::{Block, Checkpoint, Transaction};

pub use memory::MemoryBlockStore;
pub use sqlite::SqliteStore;

pub const CHECKPOINT_KEY: &str = "checkpoint";

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("database error")]
    Database(#[from] sqlx::Error),
    #[error("failed to (de)serialize record `{key}`")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("record `{0}` is missing from storage")]
    MissingRecord(String),
}

#[async_trait]
pub trait BlockStore: Send + Sync {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn put_raw(&self, key: &str, value: String) -> Result<(), StorageError>;

    async fn contains(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.get_raw(key).await?.is_some())
    }
}

#[async_trait]
impl<T: BlockStore + ?Sized> BlockStore for Arc<T> {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get_raw(key).await
    }

    async fn put_raw(&self, key: &str, value: String) -> Result<(), StorageError> {
        (**self).put_raw(key, value).await
    }

    async fn contains(&self, key: &str) -> Result<bool, StorageError> {
        (**self).contains(key).await
    }
}

pub async fn get_record<T, S>(store: &S, key: &str) -> Result<Option<T>, StorageError>
where
    T: DeserializeOwned,
    S: BlockStore + ?Sized,
{
    match store.get_raw(key).await? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| StorageError::Serialization {
                key: key.to_string(),
                source,
            }),
        None => Ok(None),
    }
}

pub async fn put_record<T, S>(store: &S, key: &str, record: &T) -> Result<(), StorageError>
where
    T: Serialize + ?Sized,
    S: BlockStore + ?Sized,
{
    let raw = serde_json::to_string(record).map_err(|source| StorageError::Serialization {
        key: key.to_string(),
        source,
    })?;
    store.put_raw(key, raw).await
}

pub async fn get_block<S: BlockStore + ?Sized>(
    store: &S,
    hash: &str,
) -> Result<Option<Block>, StorageError> {
    get_record(store, hash).await
}

pub async fn require_block<S: BlockStore + ?Sized>(
    store: &S,
    hash: &str,
) -> Result<Block, StorageError> {
    get_block(store, hash)
        .await?
        .ok_or_else(|| StorageError::MissingRecord(hash.to_string()))
}

pub async fn put_block<S: BlockStore + ?Sized>(
    store: &S,
    block: &Block,
) -> Result<(), StorageError> {
    put_record(store, &block.hash, block).await
}

pub async fn put_transaction<S: BlockStore + ?Sized>(
    store: &S,
    transaction: &Transaction,
) -> Result<(), StorageError> {
    put_record(store, &transaction.transaction_id, transaction).await
}

pub async fn get_checkpoint<S: BlockStore + ?Sized>(
    store: &S,
) -> Result<Option<Checkpoint>, StorageError> {
    get_record(store, CHECKPOINT_KEY).await
}

pub async fn put_checkpoint<S: BlockStore + ?Sized>(
    store: &S,
    checkpoint: &Checkpoint,
) -> Result<(), StorageError> {
    put_record(store, CHECKPOINT_KEY, checkpoint).await
}
