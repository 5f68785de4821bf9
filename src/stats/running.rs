use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::models::Block;

/// Seconds between the Unix epoch and 3 January 2009.
pub const BITCOIN_EPOCH_SECS: u64 = 1_230_940_800;

pub const RECENCY_WINDOW_CAPACITY: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesStatistics {
    pub total: f64,
    pub average: f64,
    pub variance: f64,
    pub standard_deviation: f64,
    #[serde(default)]
    pub sum_squared_deviations: f64,
}

impl SeriesStatistics {
    pub fn record(&mut self, value: f64, count: u64) {
        let n = count as f64;
        let previous_average = self.average;
        self.total += value;
        self.average = self.total / n;
        self.sum_squared_deviations += (value - previous_average) * (value - self.average);
        self.variance = self.sum_squared_deviations / n;
        self.standard_deviation = self.variance.sqrt();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunningStatistics {
    pub number_of_blocks: u64,
    pub number_of_transactions: u64,
    pub time: SeriesStatistics,
    pub amount: SeriesStatistics,
    pub transactions_per_block: SeriesStatistics,
}

impl RunningStatistics {
    pub fn record(&mut self, block: &Block) {
        let transactions = block.number_of_transactions() as u64;
        self.number_of_blocks += 1;
        self.number_of_transactions += transactions;

        let n = self.number_of_blocks;
        self.time.record(elapsed_since_epoch(block), n);
        self.amount.record(block.amount, n);
        self.transactions_per_block.record(transactions as f64, n);
    }
}

pub fn elapsed_since_epoch(block: &Block) -> f64 {
    block.time as f64 - BITCOIN_EPOCH_SECS as f64
}

/// Starts as [`RECENCY_WINDOW_CAPACITY`] empty slots; each insert sorts empty
/// slots first and drops the first entry, so placeholders are consumed before
/// real blocks are evicted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecencyWindow {
    slots: Vec<Option<Block>>,
}

impl Default for RecencyWindow {
    fn default() -> Self {
        Self {
            slots: vec![None; RECENCY_WINDOW_CAPACITY],
        }
    }
}

impl RecencyWindow {
    pub fn insert(&mut self, block: Block) {
        self.slots.push(Some(block));
        // Stable, so among equal timestamps the earlier arrival is evicted.
        self.slots.sort_by(compare_slots);
        self.slots.remove(0);
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.slots.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.blocks().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn compare_slots(a: &Option<Block>, b: &Option<Block>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => a.time.cmp(&b.time),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    pub transactions: Vec<u64>,
    pub amount: Vec<f64>,
    pub height: Vec<u64>,
    pub time: Vec<u64>,
}

impl ChartSeries {
    pub fn push(&mut self, block: &Block) {
        self.transactions.push(block.number_of_transactions() as u64);
        self.amount.push(block.amount);
        self.height.push(block.height);
        self.time.push(block.time);
    }

    pub fn len(&self) -> usize {
        self.height.len()
    }

    pub fn is_empty(&self) -> bool {
        self.height.is_empty()
    }
}
