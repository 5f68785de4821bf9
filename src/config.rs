use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::ingest::EngineOptions;

#[derive(Debug, Clone)]
pub struct Config {
    pub bitcoin_rpc_url: String,
    pub bitcoin_rpc_user: Option<String>,
    pub bitcoin_rpc_password: Option<String>,
    pub database_url: String,
    pub http_bind_addr: String,
    pub max_blocks_in_storage: u64,
    pub starting_block_hash: Option<String>,
    pub sync_interval: Duration,
    pub aggregator_workers: usize,
    pub queue_visibility_timeout: Duration,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("missing BITCOIN_RPC_URL env var")]
    MissingBitcoinRpcUrl,
    #[error("invalid value {value:?} for {var}")]
    Invalid { var: &'static str, value: String },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bitcoin_rpc_url =
            non_empty("BITCOIN_RPC_URL").ok_or(ConfigError::MissingBitcoinRpcUrl)?;
        let database_url =
            non_empty("DATABASE_URL").unwrap_or_else(|| "sqlite://data/chain.db".to_string());
        let http_bind_addr =
            non_empty("HTTP_BIND").unwrap_or_else(|| "127.0.0.1:8080".to_string());

        let aggregator_workers: usize =
            parse_or("AGGREGATOR_WORKERS", non_empty("AGGREGATOR_WORKERS"), 1)?;

        Ok(Self {
            bitcoin_rpc_url,
            bitcoin_rpc_user: non_empty("BITCOIN_RPC_USER"),
            bitcoin_rpc_password: non_empty("BITCOIN_RPC_PASSWORD"),
            database_url,
            http_bind_addr,
            max_blocks_in_storage: parse_or(
                "MAX_BLOCKS_IN_STORAGE",
                non_empty("MAX_BLOCKS_IN_STORAGE"),
                10,
            )?,
            starting_block_hash: non_empty("STARTING_BLOCK_HASH").map(|h| h.trim().to_string()),
            sync_interval: Duration::from_secs(parse_or(
                "SYNC_INTERVAL_SECS",
                non_empty("SYNC_INTERVAL_SECS"),
                30,
            )?),
            aggregator_workers: aggregator_workers.max(1),
            queue_visibility_timeout: Duration::from_secs(parse_or(
                "QUEUE_VISIBILITY_SECS",
                non_empty("QUEUE_VISIBILITY_SECS"),
                60,
            )?),
        })
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            max_blocks_in_storage: self.max_blocks_in_storage,
            starting_block_hash: self.starting_block_hash.clone(),
        }
    }
}

fn parse_or<T: FromStr>(
    var: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
        None => Ok(default),
    }
}
