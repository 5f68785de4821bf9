use std::sync::Arc;

use anyhow::Result;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;

use crate::ingest_stats::{IngestSnapshot, INGEST_STATS};
use crate::storage::{self, BlockStore};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn BlockStore>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn ingest_stats() -> Json<IngestSnapshot> {
    Json(INGEST_STATS.snapshot())
}

async fn checkpoint(State(state): State<AppState>) -> impl IntoResponse {
    match storage::get_checkpoint(state.store.as_ref()).await {
        Ok(Some(checkpoint)) => Json(checkpoint).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            tracing::warn!("failed to read checkpoint: {}", err);
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stats/ingest", get(ingest_stats))
        .route("/checkpoint", get(checkpoint))
        .with_state(state)
}

pub async fn run_http_server(addr: &str, state: AppState) -> Result<()> {
    let app = app_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("HTTP server listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
