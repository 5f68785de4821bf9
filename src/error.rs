use crate::node::NodeError;
use crate::storage::StorageError;

#[derive(thiserror::Error, Debug)]
pub enum MalformedDataError {
    #[error("response to `{method}` did not match the expected shape")]
    Decode {
        method: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("output {index} of transaction {txid} does not carry a finite numeric value")]
    NonNumericOutput { txid: String, index: usize },
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Node(#[from] NodeError),
    #[error(transparent)]
    Malformed(#[from] MalformedDataError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
