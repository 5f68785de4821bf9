use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub hash: String,
    pub version: i32,
    pub previous_block: Option<String>,
    /// Successors known to the node when the block was last queried. More than
    /// one entry marks a fork point.
    #[serde(default)]
    pub next_blocks: Vec<String>,
    pub merkle_root: String,
    pub time: u64,
    pub nonce: u64,
    pub transaction_ids: Vec<String>,
    pub size: u64,
    pub height: u64,
    #[serde(default)]
    pub amount: f64,
}

impl Block {
    pub fn number_of_transactions(&self) -> usize {
        self.transaction_ids.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: String,
    pub version: i32,
    pub lock_time: u64,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockReference {
    pub hash: String,
}

impl BlockReference {
    pub fn new(hash: impl Into<String>) -> Self {
        Self { hash: hash.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// `0` means unbounded.
    pub max_blocks_in_storage: u64,
    pub blocks_stored: u64,
    pub first_block_hash: String,
    pub last_block_hash: String,
    pub minimal_height: u64,
    /// Where an unfinished ancestry walk picks up again.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_gap: Option<String>,
}

impl Checkpoint {
    pub fn is_bounded(&self) -> bool {
        self.max_blocks_in_storage != 0
    }

    pub fn retention_exhausted(&self) -> bool {
        self.is_bounded() && self.blocks_stored >= self.max_blocks_in_storage
    }
}
