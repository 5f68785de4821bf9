pub mod api;
pub mod config;
pub mod error;
pub mod ingest;
pub mod ingest_stats;
pub mod models;
pub mod node;
pub mod queue;
pub mod stats;
pub mod storage;
pub mod worker;

pub use error::{Error, MalformedDataError, Result};
