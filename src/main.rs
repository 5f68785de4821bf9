mod cli;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;

use bitcoin_chain_stats::api::{self, AppState};
use bitcoin_chain_stats::config::Config;
use bitcoin_chain_stats::ingest::IngestionEngine;
use bitcoin_chain_stats::node::BitcoinRpcClient;
use bitcoin_chain_stats::queue::SqliteQueue;
use bitcoin_chain_stats::stats::{Outcome, StatisticsAggregator};
use bitcoin_chain_stats::storage::{self, SqliteStore};
use bitcoin_chain_stats::worker;

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = Config::from_env().context("failed to load configuration")?;

    let store = SqliteStore::connect(&config.database_url)
        .await
        .context("failed to open block store")?;
    let queue = SqliteQueue::new(store.pool().clone(), config.queue_visibility_timeout);

    match cli.command {
        Commands::Run => run(&config, store, queue).await?,
        Commands::SyncOnce => {
            let node = rpc_client(&config)?;
            let mut engine =
                IngestionEngine::resume_or_start(node, store, queue, &config.engine_options())
                    .await
                    .context("failed to initialise ingestion engine")?;
            let report = engine.sync_to_tip().await.context("sync cycle failed")?;
            tracing::info!(
                "sync-once: tip {:?}, admitted {}, gap-filled {}, retention exhausted {}",
                report.tip_height,
                report.admitted,
                report.gap_filled,
                report.retention_exhausted
            );
        }
        Commands::AggregateOnce { limit } => {
            let aggregator = StatisticsAggregator::new(store, queue);
            aggregator.initialize().await?;
            let mut aggregated = 0;
            for _ in 0..limit {
                match aggregator.try_process_next().await? {
                    Some(Outcome::Aggregated { .. }) => aggregated += 1,
                    Some(Outcome::Duplicate { .. }) => {}
                    None => break,
                }
            }
            tracing::info!("aggregate-once: folded {} blocks", aggregated);
        }
        Commands::Checkpoint => match storage::get_checkpoint(&store).await? {
            Some(checkpoint) => println!("{}", serde_json::to_string_pretty(&checkpoint)?),
            None => println!("no checkpoint stored yet"),
        },
        Commands::Serve { addr } => {
            let bind = addr.unwrap_or_else(|| config.http_bind_addr.clone());
            let state = AppState {
                store: Arc::new(store),
            };
            api::run_http_server(&bind, state).await?;
        }
    }

    Ok(())
}

async fn run(config: &Config, store: SqliteStore, queue: SqliteQueue) -> anyhow::Result<()> {
    let node = rpc_client(config)?;
    let engine = IngestionEngine::resume_or_start(
        node,
        store.clone(),
        queue.clone(),
        &config.engine_options(),
    )
    .await
    .context("failed to initialise ingestion engine")?;

    let aggregator = Arc::new(StatisticsAggregator::new(store.clone(), queue));
    aggregator.initialize().await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut workers = Vec::new();
    workers.push(tokio::spawn(worker::run_ingestion(
        engine,
        config.sync_interval,
        shutdown_rx.clone(),
    )));
    for id in 0..config.aggregator_workers {
        workers.push(tokio::spawn(worker::run_aggregator(
            id,
            aggregator.clone(),
            shutdown_rx.clone(),
        )));
    }

    let state = AppState {
        store: Arc::new(store),
    };
    tokio::select! {
        result = api::run_http_server(&config.http_bind_addr, state) => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("shutdown requested"),
    }

    shutdown_tx.send(true).ok();
    for handle in workers {
        if let Err(err) = handle.await {
            tracing::warn!("worker task ended abnormally: {}", err);
        }
    }
    Ok(())
}

fn rpc_client(config: &Config) -> anyhow::Result<BitcoinRpcClient> {
    BitcoinRpcClient::new(
        &config.bitcoin_rpc_url,
        config.bitcoin_rpc_user.clone(),
        config.bitcoin_rpc_password.clone(),
    )
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();
}
