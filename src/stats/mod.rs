pub mod running;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::Result;
use crate::ingest_stats::INGEST_STATS;
use crate::models::BlockReference;
use crate::queue::{BlockQueue, Delivery};
use crate::storage::{self, BlockStore};

pub use running::{ChartSeries, RecencyWindow, RunningStatistics, SeriesStatistics};

pub const STATISTICS_KEY: &str = "general_statistics";
pub const RECENT_BLOCKS_KEY: &str = "last_blocks";
pub const CHART_TRANSACTIONS_KEY: &str = "charts_number_of_transactions";
pub const CHART_AMOUNT_KEY: &str = "charts_amount";
pub const CHART_HEIGHT_KEY: &str = "charts_height";
pub const CHART_TIME_KEY: &str = "charts_time";

fn aggregated_marker(hash: &str) -> String {
    format!("aggregated:{hash}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Aggregated { hash: String, height: u64 },
    Duplicate { hash: String },
}

pub struct StatisticsAggregator<S, Q> {
    store: S,
    queue: Q,
    write_lock: Mutex<()>,
}

impl<S, Q> StatisticsAggregator<S, Q>
where
    S: BlockStore,
    Q: BlockQueue,
{
    pub fn new(store: S, queue: Q) -> Self {
        Self {
            store,
            queue,
            write_lock: Mutex::new(()),
        }
    }

    pub async fn initialize(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if !self.store.contains(STATISTICS_KEY).await? {
            storage::put_record(&self.store, STATISTICS_KEY, &RunningStatistics::default()).await?;
        }
        if !self.store.contains(RECENT_BLOCKS_KEY).await? {
            storage::put_record(&self.store, RECENT_BLOCKS_KEY, &RecencyWindow::default()).await?;
        }
        for key in [
            CHART_TRANSACTIONS_KEY,
            CHART_AMOUNT_KEY,
            CHART_HEIGHT_KEY,
            CHART_TIME_KEY,
        ] {
            if !self.store.contains(key).await? {
                storage::put_record(&self.store, key, &Vec::<u64>::new()).await?;
            }
        }
        Ok(())
    }

    pub async fn process_next(&self) -> Result<Outcome> {
        let delivery = self.next_delivery().await?;
        self.handle(delivery).await
    }

    /// Waits for the next reference. Dropping the future before it resolves
    /// loses nothing: a lease taken but never handled simply expires.
    pub async fn next_delivery(&self) -> Result<Delivery> {
        Ok(self.queue.pop().await?)
    }

    pub async fn try_process_next(&self) -> Result<Option<Outcome>> {
        match self.queue.try_pop().await? {
            Some(delivery) => self.handle(delivery).await.map(Some),
            None => Ok(None),
        }
    }

    pub async fn handle(&self, delivery: Delivery) -> Result<Outcome> {
        if delivery.attempt > 1 {
            debug!(
                hash = %delivery.reference.hash,
                attempt = delivery.attempt,
                "redelivered block reference"
            );
        }
        // Not acknowledged on failure: the lease expires and the reference is
        // delivered again.
        let outcome = self.apply_reference(&delivery.reference).await?;
        self.queue.ack(&delivery).await?;
        Ok(outcome)
    }

    pub async fn apply_reference(&self, reference: &BlockReference) -> Result<Outcome> {
        let _guard = self.write_lock.lock().await;

        let marker = aggregated_marker(&reference.hash);
        if self.store.contains(&marker).await? {
            INGEST_STATS.inc_duplicate_references(1);
            debug!(hash = %reference.hash, "skipping already aggregated block");
            return Ok(Outcome::Duplicate {
                hash: reference.hash.clone(),
            });
        }

        let block = storage::require_block(&self.store, &reference.hash).await?;

        let mut statistics = self.load_statistics().await?;
        statistics.record(&block);

        let mut charts = self.load_charts().await?;
        charts.push(&block);

        let mut window = self.load_recent_blocks().await?;
        window.insert(block.clone());

        storage::put_record(&self.store, STATISTICS_KEY, &statistics).await?;
        self.store_charts(&charts).await?;
        storage::put_record(&self.store, RECENT_BLOCKS_KEY, &window).await?;
        storage::put_record(&self.store, &marker, &block.height).await?;

        INGEST_STATS.inc_blocks_aggregated(1);
        info!(
            hash = %block.hash,
            height = block.height,
            blocks = statistics.number_of_blocks,
            "aggregated block"
        );
        Ok(Outcome::Aggregated {
            hash: block.hash,
            height: block.height,
        })
    }

    pub async fn load_statistics(&self) -> Result<RunningStatistics> {
        Ok(storage::get_record(&self.store, STATISTICS_KEY)
            .await?
            .unwrap_or_default())
    }

    pub async fn load_recent_blocks(&self) -> Result<RecencyWindow> {
        Ok(storage::get_record(&self.store, RECENT_BLOCKS_KEY)
            .await?
            .unwrap_or_default())
    }

    pub async fn load_charts(&self) -> Result<ChartSeries> {
        Ok(ChartSeries {
            transactions: storage::get_record(&self.store, CHART_TRANSACTIONS_KEY)
                .await?
                .unwrap_or_default(),
            amount: storage::get_record(&self.store, CHART_AMOUNT_KEY)
                .await?
                .unwrap_or_default(),
            height: storage::get_record(&self.store, CHART_HEIGHT_KEY)
                .await?
                .unwrap_or_default(),
            time: storage::get_record(&self.store, CHART_TIME_KEY)
                .await?
                .unwrap_or_default(),
        })
    }

    async fn store_charts(&self, charts: &ChartSeries) -> Result<()> {
        storage::put_record(&self.store, CHART_TRANSACTIONS_KEY, &charts.transactions).await?;
        storage::put_record(&self.store, CHART_AMOUNT_KEY, &charts.amount).await?;
        storage::put_record(&self.store, CHART_HEIGHT_KEY, &charts.height).await?;
        storage::put_record(&self.store, CHART_TIME_KEY, &charts.time).await?;
        Ok(())
    }
}
