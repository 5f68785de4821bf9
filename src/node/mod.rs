pub mod rpc;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{MalformedDataError, Result};
use crate::models::Block;

pub use rpc::BitcoinRpcClient;

#[derive(thiserror::Error, Debug)]
pub enum NodeError {
    #[error("node call `{method}` returned error {code}: {message}")]
    Rpc {
        method: String,
        code: i64,
        message: String,
    },
    #[error("node call `{method}` failed in transport")]
    Transport {
        method: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("node call `{method}` returned http status {status}")]
    Status { method: String, status: u16 },
}

#[derive(Debug, Clone, Deserialize)]
pub struct DecodedTransaction {
    pub version: i32,
    #[serde(rename = "locktime")]
    pub lock_time: u64,
    #[serde(default)]
    pub vout: Vec<TxOutput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TxOutput {
    /// Kept untyped so a non-numeric value surfaces as malformed data rather
    /// than as a decode failure of the whole transaction.
    pub value: serde_json::Value,
}

impl DecodedTransaction {
    pub fn total_output_amount(&self, txid: &str) -> Result<f64, MalformedDataError> {
        self.vout
            .iter()
            .enumerate()
            .try_fold(0.0, |total, (index, output)| {
                match output.value.as_f64().filter(|v| v.is_finite()) {
                    Some(value) => Ok(total + value),
                    None => Err(MalformedDataError::NonNumericOutput {
                        txid: txid.to_string(),
                        index,
                    }),
                }
            })
    }
}

#[async_trait]
pub trait ChainNode: Send + Sync {
    async fn tip_height(&self) -> Result<u64>;

    async fn block(&self, hash: &str) -> Result<Block>;

    /// Hash of the node's "last block" marker relative to `last_known`.
    ///
    /// With `target_confirmations = tip - height(last_known)` this is the
    /// main-chain block right after `last_known`'s height. Without arguments it
    /// is the current tip.
    async fn since_block(
        &self,
        last_known: Option<&str>,
        target_confirmations: Option<u64>,
    ) -> Result<String>;

    async fn raw_transaction(&self, txid: &str) -> Result<String>;

    async fn decode_transaction(&self, raw: &str) -> Result<DecodedTransaction>;
}

#[async_trait]
impl<T: ChainNode + ?Sized> ChainNode for Arc<T> {
    async fn tip_height(&self) -> Result<u64> {
        (**self).tip_height().await
    }

    async fn block(&self, hash: &str) -> Result<Block> {
        (**self).block(hash).await
    }

    async fn since_block(
        &self,
        last_known: Option<&str>,
        target_confirmations: Option<u64>,
    ) -> Result<String> {
        (**self).since_block(last_known, target_confirmations).await
    }

    async fn raw_transaction(&self, txid: &str) -> Result<String> {
        (**self).raw_transaction(txid).await
    }

    async fn decode_transaction(&self, raw: &str) -> Result<DecodedTransaction> {
        (**self).decode_transaction(raw).await
    }
}
