use tracing::{debug, info, warn};

use crate::error::Result;
use crate::ingest_stats::INGEST_STATS;
use crate::models::{Block, BlockReference, Checkpoint, Transaction};
use crate::node::ChainNode;
use crate::queue::BlockQueue;
use crate::storage::{self, BlockStore};

#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    /// `0` means unbounded.
    pub max_blocks_in_storage: u64,
    pub starting_block_hash: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub tip_height: Option<u64>,
    pub admitted: u64,
    pub gap_filled: u64,
    pub retention_exhausted: bool,
}

pub struct IngestionEngine<N, S, Q> {
    node: N,
    store: S,
    queue: Q,
    checkpoint: Checkpoint,
    first_block: Block,
    last_block: Block,
}

impl<N, S, Q> IngestionEngine<N, S, Q>
where
    N: ChainNode,
    S: BlockStore,
    Q: BlockQueue,
{
    pub async fn cold_start(node: N, store: S, queue: Q, options: &EngineOptions) -> Result<Self> {
        let hash = match &options.starting_block_hash {
            Some(hash) => hash.clone(),
            None => node.since_block(None, None).await?,
        };
        let block = node.block(&hash).await?;
        info!(
            hash = %block.hash,
            height = block.height,
            max_blocks = options.max_blocks_in_storage,
            "cold start of ingestion engine"
        );

        let checkpoint = Checkpoint {
            max_blocks_in_storage: options.max_blocks_in_storage,
            blocks_stored: 0,
            first_block_hash: block.hash.clone(),
            last_block_hash: block.hash.clone(),
            minimal_height: block.height,
            pending_gap: None,
        };

        let mut engine = Self {
            node,
            store,
            queue,
            checkpoint,
            first_block: block.clone(),
            last_block: block.clone(),
        };

        let block = engine.admit_transactions(block).await?;
        engine.admit(&block, |_| {}).await?;
        engine.first_block = block.clone();
        engine.last_block = block;
        Ok(engine)
    }

    /// Makes no node calls. An interrupted ancestry walk recorded in the
    /// checkpoint resumes on the next `sync_to_tip`.
    pub async fn warm_start(node: N, store: S, queue: Q, checkpoint: Checkpoint) -> Result<Self> {
        let first_block = storage::require_block(&store, &checkpoint.first_block_hash).await?;
        let last_block = storage::require_block(&store, &checkpoint.last_block_hash).await?;
        info!(
            first = %first_block.hash,
            last = %last_block.hash,
            last_height = last_block.height,
            blocks_stored = checkpoint.blocks_stored,
            pending_gap = ?checkpoint.pending_gap,
            "warm start of ingestion engine"
        );

        Ok(Self {
            node,
            store,
            queue,
            checkpoint,
            first_block,
            last_block,
        })
    }

    pub async fn resume_or_start(
        node: N,
        store: S,
        queue: Q,
        options: &EngineOptions,
    ) -> Result<Self> {
        match storage::get_checkpoint(&store).await? {
            Some(checkpoint) => Self::warm_start(node, store, queue, checkpoint).await,
            None => Self::cold_start(node, store, queue, options).await,
        }
    }

    pub fn checkpoint(&self) -> &Checkpoint {
        &self.checkpoint
    }

    pub fn first_block(&self) -> &Block {
        &self.first_block
    }

    pub fn last_block(&self) -> &Block {
        &self.last_block
    }

    pub async fn sync_to_tip(&mut self) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        if let Some(hash) = self.checkpoint.pending_gap.clone() {
            info!(%hash, "resuming interrupted gap walk");
            report.gap_filled += self.reconstruct_gap(&hash).await?;
        }

        if self.checkpoint.retention_exhausted() {
            debug!(
                blocks_stored = self.checkpoint.blocks_stored,
                "retention cap reached, ingestion halted"
            );
            report.retention_exhausted = true;
            return Ok(report);
        }

        let tip = self.node.tip_height().await?;
        report.tip_height = Some(tip);

        while tip > self.last_block.height && !self.checkpoint.retention_exhausted() {
            let distance = tip - self.last_block.height;
            let next_hash = self
                .node
                .since_block(Some(self.last_block.hash.as_str()), Some(distance))
                .await?;
            let candidate = self.node.block(&next_hash).await?;

            self.refresh_forward_links().await?;
            let gap_start = if self.last_block.next_blocks.is_empty() {
                candidate.previous_block.clone()
            } else {
                None
            };

            let candidate = self.admit_transactions(candidate).await?;
            // Walk start and new last block land in one checkpoint write.
            let pending = gap_start.clone();
            self.admit(&candidate, |checkpoint| {
                checkpoint.last_block_hash = candidate.hash.clone();
                checkpoint.pending_gap = pending;
            })
            .await?;
            report.admitted += 1;
            info!(hash = %candidate.hash, height = candidate.height, "admitted block");
            self.last_block = candidate;

            if let Some(parent) = gap_start {
                warn!(
                    hash = %self.last_block.hash,
                    height = self.last_block.height,
                    "new block is disconnected from known chain, reconstructing ancestry"
                );
                report.gap_filled += self.reconstruct_gap(&parent).await?;
            }
        }

        report.retention_exhausted = self.checkpoint.retention_exhausted();
        Ok(report)
    }

    /// Walks back from `hash` through parent links, admitting every block until
    /// one is already stored, one sits at or below the minimal height, or one
    /// has no parent. Progress is checkpointed per block; the pending walk is
    /// cleared only once it finishes.
    pub async fn reconstruct_gap(&mut self, hash: &str) -> Result<u64> {
        if self.checkpoint.pending_gap.as_deref() != Some(hash) {
            let start = hash.to_string();
            self.update_checkpoint(|checkpoint| checkpoint.pending_gap = Some(start))
                .await?;
        }

        let mut admitted = 0;
        let mut hash = hash.to_string();

        loop {
            if self.store.contains(&hash).await? {
                debug!(%hash, "gap walk reconnected with stored chain");
                break;
            }

            let block = self.node.block(&hash).await?;
            if block.height <= self.checkpoint.minimal_height {
                debug!(%hash, height = block.height, "gap walk reached minimal height");
                break;
            }

            let block = self.admit_transactions(block).await?;
            let parent = block.previous_block.clone();
            let next = parent.clone();
            self.admit(&block, |checkpoint| checkpoint.pending_gap = next)
                .await?;
            admitted += 1;
            INGEST_STATS.inc_gap_blocks_admitted(1);
            info!(hash = %block.hash, height = block.height, "admitted gap block");

            match parent {
                Some(parent) => hash = parent,
                None => {
                    debug!(hash = %block.hash, "gap walk reached block without parent");
                    break;
                }
            }
        }

        if self.checkpoint.pending_gap.is_some() {
            self.update_checkpoint(|checkpoint| checkpoint.pending_gap = None)
                .await?;
        }
        Ok(admitted)
    }

    async fn refresh_forward_links(&mut self) -> Result<()> {
        let current = self.node.block(&self.last_block.hash).await?;
        self.last_block.next_blocks = current.next_blocks;
        storage::put_block(&self.store, &self.last_block).await?;
        Ok(())
    }

    /// Nothing is persisted unless every transaction decodes.
    async fn admit_transactions(&self, mut block: Block) -> Result<Block> {
        let mut transactions = Vec::with_capacity(block.transaction_ids.len());
        for txid in &block.transaction_ids {
            let raw = self.node.raw_transaction(txid).await?;
            let decoded = self.node.decode_transaction(&raw).await?;
            let amount = decoded.total_output_amount(txid)?;
            transactions.push(Transaction {
                transaction_id: txid.clone(),
                version: decoded.version,
                lock_time: decoded.lock_time,
                amount,
            });
        }

        for transaction in &transactions {
            storage::put_transaction(&self.store, transaction).await?;
        }
        INGEST_STATS.inc_transactions_admitted(transactions.len() as u64);

        block.amount = transactions.iter().map(|t| t.amount).sum();
        Ok(block)
    }

    async fn admit<F>(&mut self, block: &Block, update: F) -> Result<()>
    where
        F: FnOnce(&mut Checkpoint) + Send,
    {
        storage::put_block(&self.store, block).await?;
        self.queue.push(&BlockReference::new(&block.hash)).await?;

        self.update_checkpoint(|checkpoint| {
            checkpoint.blocks_stored += 1;
            update(checkpoint);
        })
        .await?;
        INGEST_STATS.inc_blocks_admitted(1);
        Ok(())
    }

    async fn update_checkpoint<F>(&mut self, update: F) -> Result<()>
    where
        F: FnOnce(&mut Checkpoint) + Send,
    {
        let mut checkpoint = self.checkpoint.clone();
        update(&mut checkpoint);
        storage::put_checkpoint(&self.store, &checkpoint).await?;
        self.checkpoint = checkpoint;
        Ok(())
    }
}
