use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::models::BlockReference;
use crate::storage::sqlite::{unix_now, DbPool};
use crate::storage::StorageError;

pub const POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const MESSAGE_TIME_TO_LIVE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub id: i64,
    pub reference: BlockReference,
    pub attempt: u32,
}

#[async_trait]
pub trait BlockQueue: Send + Sync {
    async fn push(&self, reference: &BlockReference) -> Result<(), StorageError>;

    async fn try_pop(&self) -> Result<Option<Delivery>, StorageError>;

    async fn ack(&self, delivery: &Delivery) -> Result<(), StorageError>;

    async fn pop(&self) -> Result<Delivery, StorageError> {
        loop {
            if let Some(delivery) = self.try_pop().await? {
                return Ok(delivery);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl<T: BlockQueue + ?Sized> BlockQueue for Arc<T> {
    async fn push(&self, reference: &BlockReference) -> Result<(), StorageError> {
        (**self).push(reference).await
    }

    async fn try_pop(&self) -> Result<Option<Delivery>, StorageError> {
        (**self).try_pop().await
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), StorageError> {
        (**self).ack(delivery).await
    }

    async fn pop(&self) -> Result<Delivery, StorageError> {
        (**self).pop().await
    }
}

#[derive(Clone)]
pub struct SqliteQueue {
    pool: DbPool,
    visibility_timeout: Duration,
}

impl SqliteQueue {
    pub fn new(pool: DbPool, visibility_timeout: Duration) -> Self {
        Self {
            pool,
            visibility_timeout,
        }
    }

    pub async fn len(&self) -> Result<u64, StorageError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM block_queue;")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}

#[async_trait]
impl BlockQueue for SqliteQueue {
    async fn push(&self, reference: &BlockReference) -> Result<(), StorageError> {
        let now = unix_now();
        sqlx::query(
            r#"
            INSERT INTO block_queue (block_hash, enqueued_at, visible_at)
            VALUES (?1, ?2, ?2);
            "#,
        )
        .bind(&reference.hash)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn try_pop(&self) -> Result<Option<Delivery>, StorageError> {
        let now = unix_now();
        let expired_before = now - MESSAGE_TIME_TO_LIVE.as_secs() as i64;

        let purged = sqlx::query("DELETE FROM block_queue WHERE enqueued_at <= ?1;")
            .bind(expired_before)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if purged > 0 {
            tracing::warn!("dropped {} expired block references", purged);
        }

        // Select and lease in one statement so concurrent consumers never
        // receive the same lease.
        let row = sqlx::query_as::<_, (i64, String, i64)>(
            r#"
            UPDATE block_queue
            SET visible_at = ?2, delivery_count = delivery_count + 1
            WHERE id = (
                SELECT id FROM block_queue
                WHERE visible_at <= ?1
                ORDER BY id
                LIMIT 1
            )
            RETURNING id, block_hash, delivery_count;
            "#,
        )
        .bind(now)
        .bind(now + self.visibility_timeout.as_secs() as i64)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, hash, attempt)| Delivery {
            id,
            reference: BlockReference::new(hash),
            attempt: attempt as u32,
        }))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM block_queue WHERE id = ?1;")
            .bind(delivery.id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[derive(Default)]
struct MemoryQueueState {
    next_id: i64,
    ready: VecDeque<Delivery>,
    in_flight: HashMap<i64, Delivery>,
}

/// Process-local queue. Unacknowledged messages stay in flight and are never
/// redelivered.
#[derive(Clone, Default)]
pub struct MemoryQueue {
    state: Arc<Mutex<MemoryQueueState>>,
    available: Arc<Notify>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> Vec<BlockReference> {
        let state = self.state.lock().expect("memory queue lock poisoned");
        state.ready.iter().map(|d| d.reference.clone()).collect()
    }

    pub fn in_flight(&self) -> usize {
        let state = self.state.lock().expect("memory queue lock poisoned");
        state.in_flight.len()
    }
}

#[async_trait]
impl BlockQueue for MemoryQueue {
    async fn push(&self, reference: &BlockReference) -> Result<(), StorageError> {
        {
            let mut state = self.state.lock().expect("memory queue lock poisoned");
            state.next_id += 1;
            let id = state.next_id;
            state.ready.push_back(Delivery {
                id,
                reference: reference.clone(),
                attempt: 0,
            });
        }
        self.available.notify_one();
        Ok(())
    }

    async fn try_pop(&self) -> Result<Option<Delivery>, StorageError> {
        let mut state = self.state.lock().expect("memory queue lock poisoned");
        let Some(mut delivery) = state.ready.pop_front() else {
            return Ok(None);
        };
        delivery.attempt += 1;
        state.in_flight.insert(delivery.id, delivery.clone());
        Ok(Some(delivery))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), StorageError> {
        let mut state = self.state.lock().expect("memory queue lock poisoned");
        state.in_flight.remove(&delivery.id);
        Ok(())
    }

    async fn pop(&self) -> Result<Delivery, StorageError> {
        loop {
            let notified = self.available.notified();
            if let Some(delivery) = self.try_pop().await? {
                return Ok(delivery);
            }
            notified.await;
        }
    }
}
