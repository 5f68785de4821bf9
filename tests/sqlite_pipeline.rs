mod common;

use std::time::Duration;

use bitcoin_chain_stats::ingest::{EngineOptions, IngestionEngine};
use bitcoin_chain_stats::models::BlockReference;
use bitcoin_chain_stats::queue::{BlockQueue, SqliteQueue};
use bitcoin_chain_stats::stats::StatisticsAggregator;
use bitcoin_chain_stats::storage::{self, BlockStore, SqliteStore};

use common::{assert_continuous, main_hash, MockChainNode};

fn temp_db_url(name: &str) -> String {
    let dir = std::env::temp_dir();
    let _ = std::fs::create_dir_all(&dir);
    let file = format!(
        "bitcoin_chain_stats_{}_{}_{}.sqlite",
        name,
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    );
    let path = dir.join(file);
    format!("sqlite://{}", path.to_string_lossy())
}

async fn open(name: &str, visibility: Duration) -> (SqliteStore, SqliteQueue) {
    let store = SqliteStore::connect(&temp_db_url(name)).await.unwrap();
    let queue = SqliteQueue::new(store.pool().clone(), visibility);
    (store, queue)
}

#[tokio::test]
async fn records_overwrite_on_put() {
    let (store, _queue) = open("records", Duration::from_secs(60)).await;
    assert!(store.get_raw("k").await.unwrap().is_none());
    assert!(!store.contains("k").await.unwrap());

    store.put_raw("k", "1".to_string()).await.unwrap();
    store.put_raw("k", "2".to_string()).await.unwrap();
    assert_eq!(store.get_raw("k").await.unwrap().as_deref(), Some("2"));
    assert!(store.contains("k").await.unwrap());
}

#[tokio::test]
async fn queue_leases_and_acknowledges_in_order() {
    let (_store, queue) = open("queue", Duration::from_secs(60)).await;
    queue.push(&BlockReference::new("a")).await.unwrap();
    queue.push(&BlockReference::new("b")).await.unwrap();

    let first = queue.try_pop().await.unwrap().unwrap();
    assert_eq!(first.reference.hash, "a");
    assert_eq!(first.attempt, 1);

    // "a" is leased, so "b" comes next and then nothing.
    let second = queue.try_pop().await.unwrap().unwrap();
    assert_eq!(second.reference.hash, "b");
    assert!(queue.try_pop().await.unwrap().is_none());

    queue.ack(&first).await.unwrap();
    queue.ack(&second).await.unwrap();
    assert_eq!(queue.len().await.unwrap(), 0);
}

#[tokio::test]
async fn unacknowledged_reference_is_redelivered() {
    let (_store, queue) = open("redelivery", Duration::ZERO).await;
    queue.push(&BlockReference::new("a")).await.unwrap();

    let first = queue.try_pop().await.unwrap().unwrap();
    let again = queue.try_pop().await.unwrap().unwrap();
    assert_eq!(first.id, again.id);
    assert_eq!(again.attempt, 2);

    queue.ack(&again).await.unwrap();
    assert!(queue.try_pop().await.unwrap().is_none());
}

#[tokio::test]
async fn ingestion_feeds_aggregator_through_sqlite() {
    let (store, queue) = open("pipeline", Duration::from_secs(60)).await;
    let node = MockChainNode::linear(30);
    let options = EngineOptions {
        max_blocks_in_storage: 0,
        starting_block_hash: Some(main_hash(20)),
    };

    let mut engine =
        IngestionEngine::resume_or_start(node.clone(), store.clone(), queue.clone(), &options)
            .await
            .unwrap();
    engine.sync_to_tip().await.unwrap();
    assert_eq!(queue.len().await.unwrap(), 11);
    assert_continuous(&store, &main_hash(30), 20).await;

    let aggregator = StatisticsAggregator::new(store.clone(), queue.clone());
    aggregator.initialize().await.unwrap();
    let mut processed = 0;
    while aggregator.try_process_next().await.unwrap().is_some() {
        processed += 1;
    }
    assert_eq!(processed, 11);
    assert_eq!(queue.len().await.unwrap(), 0);

    let stats = aggregator.load_statistics().await.unwrap();
    assert_eq!(stats.number_of_blocks, 11);
    assert_eq!(stats.number_of_transactions, 22);
    assert!((stats.amount.average - 4.0).abs() < 1e-9);

    // Restart resumes from the persisted checkpoint.
    let checkpoint = storage::get_checkpoint(&store).await.unwrap().unwrap();
    let resumed = IngestionEngine::resume_or_start(node, store.clone(), queue, &options)
        .await
        .unwrap();
    assert_eq!(resumed.checkpoint(), &checkpoint);
    assert_eq!(resumed.last_block().hash, main_hash(30));
}
