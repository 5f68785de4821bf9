use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug)]
pub struct IngestStats {
    blocks_admitted: AtomicU64,
    gap_blocks_admitted: AtomicU64,
    transactions_admitted: AtomicU64,
    blocks_aggregated: AtomicU64,
    duplicate_references: AtomicU64,
    failed_cycles: AtomicU64,
}

impl Default for IngestStats {
    fn default() -> Self {
        Self::new()
    }
}

impl IngestStats {
    pub const fn new() -> Self {
        Self {
            blocks_admitted: AtomicU64::new(0),
            gap_blocks_admitted: AtomicU64::new(0),
            transactions_admitted: AtomicU64::new(0),
            blocks_aggregated: AtomicU64::new(0),
            duplicate_references: AtomicU64::new(0),
            failed_cycles: AtomicU64::new(0),
        }
    }

    pub fn inc_blocks_admitted(&self, n: u64) {
        self.blocks_admitted.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_gap_blocks_admitted(&self, n: u64) {
        self.gap_blocks_admitted.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_transactions_admitted(&self, n: u64) {
        self.transactions_admitted.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_blocks_aggregated(&self, n: u64) {
        self.blocks_aggregated.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_duplicate_references(&self, n: u64) {
        self.duplicate_references.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_failed_cycles(&self, n: u64) {
        self.failed_cycles.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> IngestSnapshot {
        IngestSnapshot {
            blocks_admitted: self.blocks_admitted.load(Ordering::Relaxed),
            gap_blocks_admitted: self.gap_blocks_admitted.load(Ordering::Relaxed),
            transactions_admitted: self.transactions_admitted.load(Ordering::Relaxed),
            blocks_aggregated: self.blocks_aggregated.load(Ordering::Relaxed),
            duplicate_references: self.duplicate_references.load(Ordering::Relaxed),
            failed_cycles: self.failed_cycles.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct IngestSnapshot {
    pub blocks_admitted: u64,
    pub gap_blocks_admitted: u64,
    pub transactions_admitted: u64,
    pub blocks_aggregated: u64,
    pub duplicate_references: u64,
    pub failed_cycles: u64,
}

pub static INGEST_STATS: IngestStats = IngestStats::new();
