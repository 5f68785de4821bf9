use anyhow::Context;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use url::Url;

use super::{ChainNode, DecodedTransaction, NodeError};
use crate::error::{MalformedDataError, Result};
use crate::models::Block;

#[derive(Clone)]
pub struct BitcoinRpcClient {
    http: reqwest::Client,
    url: Url,
    credentials: Option<(String, Option<String>)>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Value,
}

#[derive(Debug, Deserialize)]
struct RpcBlock {
    hash: String,
    version: i32,
    #[serde(rename = "previousblockhash", default)]
    previous_block: Option<String>,
    #[serde(rename = "nextblockhash", default, deserialize_with = "one_or_many")]
    next_blocks: Vec<String>,
    #[serde(rename = "merkleroot")]
    merkle_root: String,
    time: u64,
    nonce: u64,
    #[serde(rename = "tx", default)]
    transaction_ids: Vec<String>,
    size: u64,
    height: u64,
}

impl From<RpcBlock> for Block {
    fn from(raw: RpcBlock) -> Self {
        Block {
            hash: raw.hash,
            version: raw.version,
            previous_block: raw.previous_block,
            next_blocks: raw.next_blocks,
            merkle_root: raw.merkle_root,
            time: raw.time,
            nonce: raw.nonce,
            transaction_ids: raw.transaction_ids,
            size: raw.size,
            height: raw.height,
            amount: 0.0,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SinceBlock {
    #[serde(rename = "lastblock")]
    last_block: String,
}

// bitcoind reports a single successor, older forks reported a list.
fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(hash)) => vec![hash],
        Some(OneOrMany::Many(hashes)) => hashes,
    })
}

impl BitcoinRpcClient {
    pub fn new(
        rpc_url: &str,
        user: Option<String>,
        password: Option<String>,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .no_proxy()
            .build()
            .context("failed to build reqwest client")?;
        let url = Url::parse(rpc_url).context("invalid BITCOIN_RPC_URL")?;
        Ok(Self {
            http,
            url,
            credentials: user.map(|user| (user, password)),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> Result<T> {
        let body = json!({
            "jsonrpc": "1.0",
            "id": "bitcoin-chain-stats",
            "method": method,
            "params": params,
        });

        let mut request = self.http.post(self.url.clone()).json(&body);
        if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, password.as_ref());
        }

        tracing::debug!(method, "calling node");
        let transport = |source| NodeError::Transport {
            method: method.to_string(),
            source,
        };
        let response = request.send().await.map_err(transport)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(transport)?;

        // bitcoind answers RPC errors with HTTP 500 and a regular JSON body.
        let envelope: RpcResponse = match serde_json::from_slice(&bytes) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(NodeError::Status {
                    method: method.to_string(),
                    status: status.as_u16(),
                }
                .into())
            }
            Err(source) => {
                return Err(MalformedDataError::Decode {
                    method: method.to_string(),
                    source,
                }
                .into())
            }
        };

        decode_envelope(method, envelope)
    }
}

fn decode_envelope<T: DeserializeOwned>(method: &str, envelope: RpcResponse) -> Result<T> {
    if !envelope.error.is_null() {
        let code = envelope.error.get("code").and_then(Value::as_i64).unwrap_or(0);
        let message = envelope
            .error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| envelope.error.to_string());
        return Err(NodeError::Rpc {
            method: method.to_string(),
            code,
            message,
        }
        .into());
    }

    serde_json::from_value(envelope.result).map_err(|source| {
        MalformedDataError::Decode {
            method: method.to_string(),
            source,
        }
        .into()
    })
}

#[async_trait]
impl ChainNode for BitcoinRpcClient {
    async fn tip_height(&self) -> Result<u64> {
        self.call("getblockcount", Vec::new()).await
    }

    async fn block(&self, hash: &str) -> Result<Block> {
        let raw: RpcBlock = self.call("getblock", vec![json!(hash)]).await?;
        Ok(raw.into())
    }

    async fn since_block(
        &self,
        last_known: Option<&str>,
        target_confirmations: Option<u64>,
    ) -> Result<String> {
        let params = match (last_known, target_confirmations) {
            (None, _) => Vec::new(),
            (Some(hash), None) => vec![json!(hash)],
            (Some(hash), Some(confirmations)) => vec![json!(hash), json!(confirmations)],
        };
        let since: SinceBlock = self.call("listsinceblock", params).await?;
        Ok(since.last_block)
    }

    async fn raw_transaction(&self, txid: &str) -> Result<String> {
        self.call("getrawtransaction", vec![json!(txid)]).await
    }

    async fn decode_transaction(&self, raw: &str) -> Result<DecodedTransaction> {
        self.call("decoderawtransaction", vec![json!(raw)]).await
    }
}
