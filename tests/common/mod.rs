#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use bitcoin_chain_stats::models::Block;
use bitcoin_chain_stats::node::{ChainNode, DecodedTransaction, NodeError};
use bitcoin_chain_stats::storage::{self, BlockStore};
use bitcoin_chain_stats::Result;

pub const GENESIS_TIME: u64 = 1_231_006_505;

pub fn main_hash(height: u64) -> String {
    format!("{height:064x}")
}

pub fn fork_hash(height: u64) -> String {
    format!("f{height:063x}")
}

pub fn txid(block_hash: &str, index: usize) -> String {
    format!("tx-{index}-{block_hash}")
}

/// Scripted node: a main chain indexed by height plus any stale blocks left
/// behind by [`MockChainNode::reorg`].
#[derive(Clone, Default)]
pub struct MockChainNode {
    inner: Arc<Mutex<MockChain>>,
    calls: Arc<AtomicUsize>,
}

#[derive(Default)]
struct MockChain {
    blocks: HashMap<String, Block>,
    main_chain: Vec<String>,
    transactions: HashMap<String, serde_json::Value>,
    since_marker: Option<u64>,
}

impl MockChain {
    fn add_block(&mut self, hash: String, height: u64, previous: Option<String>) {
        let ids: Vec<String> = (0..2).map(|i| txid(&hash, i)).collect();
        for id in &ids {
            self.transactions.insert(
                id.clone(),
                json!({
                    "version": 1,
                    "locktime": 0,
                    "vout": [{ "value": 1.5 }, { "value": 0.5 }],
                }),
            );
        }
        self.blocks.insert(
            hash.clone(),
            Block {
                hash,
                version: 1,
                previous_block: previous,
                next_blocks: Vec::new(),
                merkle_root: format!("merkle-{height}"),
                time: GENESIS_TIME + height * 600,
                nonce: height,
                transaction_ids: ids,
                size: 1_000 + height,
                height,
                amount: 0.0,
            },
        );
    }

    fn height_of(&self, hash: &str) -> Option<u64> {
        self.blocks.get(hash).map(|b| b.height)
    }
}

impl MockChainNode {
    /// Main chain with blocks at heights `0..=tip`.
    pub fn linear(tip: u64) -> Self {
        let node = Self::default();
        node.extend_to(tip);
        node
    }

    pub fn extend_to(&self, tip: u64) {
        let mut chain = self.inner.lock().unwrap();
        let start = chain.main_chain.len() as u64;
        for height in start..=tip {
            let previous = chain.main_chain.last().cloned();
            let hash = main_hash(height);
            chain.add_block(hash.clone(), height, previous);
            chain.main_chain.push(hash);
        }
    }

    /// Replaces every main-chain block from `from_height` up with fork blocks
    /// and grows the new branch to `new_tip`.
    pub fn reorg(&self, from_height: u64, new_tip: u64) {
        let mut chain = self.inner.lock().unwrap();
        chain.main_chain.truncate(from_height as usize);
        for height in from_height..=new_tip {
            let previous = chain.main_chain.last().cloned();
            let hash = fork_hash(height);
            chain.add_block(hash.clone(), height, previous);
            chain.main_chain.push(hash);
        }
    }

    /// Drops the parent link of the main-chain block at `height`.
    pub fn detach(&self, height: u64) {
        let mut chain = self.inner.lock().unwrap();
        let hash = chain.main_chain[height as usize].clone();
        if let Some(block) = chain.blocks.get_mut(&hash) {
            block.previous_block = None;
        }
    }

    /// Cold starts without a hash resolve to this height instead of the tip.
    pub fn set_since_marker(&self, height: u64) {
        self.inner.lock().unwrap().since_marker = Some(height);
    }

    pub fn set_output_value(&self, txid: &str, value: serde_json::Value) {
        let mut chain = self.inner.lock().unwrap();
        chain.transactions.insert(
            txid.to_string(),
            json!({ "version": 1, "locktime": 0, "vout": [{ "value": value }] }),
        );
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

fn not_found(method: &str, what: &str) -> bitcoin_chain_stats::Error {
    NodeError::Rpc {
        method: method.to_string(),
        code: -5,
        message: format!("{what} not found"),
    }
    .into()
}

#[async_trait]
impl ChainNode for MockChainNode {
    async fn tip_height(&self) -> Result<u64> {
        self.record_call();
        let chain = self.inner.lock().unwrap();
        Ok(chain.main_chain.len() as u64 - 1)
    }

    async fn block(&self, hash: &str) -> Result<Block> {
        self.record_call();
        let chain = self.inner.lock().unwrap();
        let mut block = chain
            .blocks
            .get(hash)
            .cloned()
            .ok_or_else(|| not_found("getblock", "block"))?;
        let on_main = chain.main_chain.get(block.height as usize).map(String::as_str) == Some(hash);
        if on_main {
            if let Some(next) = chain.main_chain.get(block.height as usize + 1) {
                block.next_blocks = vec![next.clone()];
            }
        }
        Ok(block)
    }

    async fn since_block(
        &self,
        last_known: Option<&str>,
        target_confirmations: Option<u64>,
    ) -> Result<String> {
        self.record_call();
        let chain = self.inner.lock().unwrap();
        let tip = chain.main_chain.len() as u64 - 1;
        if let Some(hash) = last_known {
            chain
                .height_of(hash)
                .ok_or_else(|| not_found("listsinceblock", "block"))?;
        }
        let height = match (last_known, chain.since_marker) {
            (None, Some(marker)) => marker,
            _ => (tip + 1).saturating_sub(target_confirmations.unwrap_or(1).max(1)),
        };
        Ok(chain.main_chain[height as usize].clone())
    }

    async fn raw_transaction(&self, txid: &str) -> Result<String> {
        self.record_call();
        let chain = self.inner.lock().unwrap();
        if chain.transactions.contains_key(txid) {
            Ok(format!("raw:{txid}"))
        } else {
            Err(not_found("getrawtransaction", "transaction"))
        }
    }

    async fn decode_transaction(&self, raw: &str) -> Result<DecodedTransaction> {
        self.record_call();
        let chain = self.inner.lock().unwrap();
        let txid = raw.trim_start_matches("raw:");
        let value = chain
            .transactions
            .get(txid)
            .cloned()
            .ok_or_else(|| not_found("decoderawtransaction", "transaction"))?;
        Ok(serde_json::from_value(value).expect("mock transaction decodes"))
    }
}

/// Follows previous-block links from `hash` down to `minimal_height`,
/// asserting every hop is stored and exactly one height lower.
pub async fn assert_continuous<S: BlockStore>(store: &S, hash: &str, minimal_height: u64) -> usize {
    let mut block = storage::require_block(store, hash).await.unwrap();
    let mut visited = 1;
    while block.height > minimal_height {
        let parent_hash = block
            .previous_block
            .clone()
            .expect("stored block above the floor has a parent");
        let parent = storage::require_block(store, &parent_hash)
            .await
            .unwrap_or_else(|_| panic!("parent {parent_hash} of {} is stored", block.height));
        assert_eq!(parent.height + 1, block.height);
        block = parent;
        visited += 1;
    }
    visited
}
