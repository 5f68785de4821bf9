use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::ingest::IngestionEngine;
use crate::ingest_stats::INGEST_STATS;
use crate::node::ChainNode;
use crate::queue::BlockQueue;
use crate::stats::StatisticsAggregator;
use crate::storage::BlockStore;

const AGGREGATOR_RETRY_DELAY: Duration = Duration::from_secs(5);

/// A failed cycle is logged and skipped; the next tick resumes from the
/// checkpoint.
pub async fn run_ingestion<N, S, Q>(
    mut engine: IngestionEngine<N, S, Q>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) where
    N: ChainNode,
    S: BlockStore,
    Q: BlockQueue,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }
        if *shutdown.borrow() {
            break;
        }

        match engine.sync_to_tip().await {
            Ok(report) if report.admitted > 0 || report.gap_filled > 0 => {
                tracing::info!(
                    tip = ?report.tip_height,
                    admitted = report.admitted,
                    gap_filled = report.gap_filled,
                    "sync cycle complete"
                );
            }
            Ok(report) => {
                tracing::debug!(
                    tip = ?report.tip_height,
                    halted = report.retention_exhausted,
                    "nothing to sync"
                );
            }
            Err(err) => {
                INGEST_STATS.inc_failed_cycles(1);
                tracing::warn!("sync cycle failed: {:#}", anyhow::Error::from(err));
            }
        }
    }

    tracing::info!("ingestion worker stopped");
}

/// Shutdown is only observed while waiting for a reference; a reference
/// already taken is always folded in and acknowledged first.
pub async fn run_aggregator<S, Q>(
    worker: usize,
    aggregator: Arc<StatisticsAggregator<S, Q>>,
    mut shutdown: watch::Receiver<bool>,
) where
    S: BlockStore,
    Q: BlockQueue,
{
    while !*shutdown.borrow() {
        let delivery = tokio::select! {
            delivery = aggregator.next_delivery() => delivery,
            _ = shutdown.changed() => break,
        };

        let result = match delivery {
            Ok(delivery) => aggregator.handle(delivery).await.map(|_| ()),
            Err(err) => Err(err),
        };

        if let Err(err) = result {
            INGEST_STATS.inc_failed_cycles(1);
            tracing::warn!(worker, "aggregation failed: {:#}", anyhow::Error::from(err));
            tokio::select! {
                _ = tokio::time::sleep(AGGREGATOR_RETRY_DELAY) => {}
                _ = shutdown.changed() => break,
            }
        }
    }

    tracing::info!(worker, "aggregator worker stopped");
}
