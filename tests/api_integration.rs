use std::net::SocketAddr;
use std::sync::Arc;

use reqwest::Client;
use tokio::task::JoinHandle;

use bitcoin_chain_stats::api::{app_router, AppState};
use bitcoin_chain_stats::ingest_stats::INGEST_STATS;
use bitcoin_chain_stats::models::Checkpoint;
use bitcoin_chain_stats::storage::{self, MemoryBlockStore};

#[tokio::test]
async fn health_endpoint_works() {
    let (base_url, handle) = spawn_app(MemoryBlockStore::new()).await;
    let client = Client::new();
    let res = client
        .get(format!("{}/health", base_url))
        .send()
        .await
        .unwrap();
    assert!(res.status().is_success());
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body.get("status").and_then(|s| s.as_str()), Some("ok"));
    handle.abort();
}

#[tokio::test]
async fn ingest_stats_returns_counters() {
    let (base_url, handle) = spawn_app(MemoryBlockStore::new()).await;
    INGEST_STATS.inc_blocks_admitted(1);
    INGEST_STATS.inc_transactions_admitted(2);
    let client = Client::new();
    let res = client
        .get(format!("{}/stats/ingest", base_url))
        .send()
        .await
        .unwrap();
    assert!(res.status().is_success());
    let body: serde_json::Value = res.json().await.unwrap();
    assert!(body.get("blocks_admitted").and_then(|v| v.as_u64()).unwrap_or(0) >= 1);
    assert!(body.get("transactions_admitted").is_some());
    assert!(body.get("blocks_aggregated").is_some());
    assert!(body.get("failed_cycles").is_some());
    handle.abort();
}

#[tokio::test]
async fn checkpoint_is_not_found_before_first_run() {
    let (base_url, handle) = spawn_app(MemoryBlockStore::new()).await;
    let res = Client::new()
        .get(format!("{}/checkpoint", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::NOT_FOUND);
    handle.abort();
}

#[tokio::test]
async fn checkpoint_returns_stored_record() {
    let store = MemoryBlockStore::new();
    let checkpoint = Checkpoint {
        max_blocks_in_storage: 10,
        blocks_stored: 3,
        first_block_hash: "00aa".to_string(),
        last_block_hash: "00cc".to_string(),
        minimal_height: 700_000,
        pending_gap: None,
    };
    storage::put_checkpoint(&store, &checkpoint).await.unwrap();

    let (base_url, handle) = spawn_app(store).await;
    let res = Client::new()
        .get(format!("{}/checkpoint", base_url))
        .send()
        .await
        .unwrap();
    assert!(res.status().is_success());
    let body: Checkpoint = res.json().await.unwrap();
    assert_eq!(body, checkpoint);
    handle.abort();
}

async fn spawn_app(store: MemoryBlockStore) -> (String, JoinHandle<()>) {
    let state = AppState {
        store: Arc::new(store),
    };
    let app = app_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    let base_url = format!("http://{}", addr);
    let server = axum::serve(listener, app);
    let handle = tokio::spawn(async move {
        let _ = server.await;
    });

    (base_url, handle)
}
