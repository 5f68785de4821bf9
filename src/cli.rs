use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "bitcoin-chain-stats",
    version,
    about = "Bitcoin chain follower and block statistics aggregator"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Follow the chain, aggregate statistics and serve the status API
    Run,
    /// Run a single ingestion cycle up to the current tip
    SyncOnce,
    /// Fold up to N queued block references into the statistics
    AggregateOnce {
        #[arg(long, default_value_t = 100)]
        limit: u64,
    },
    /// Print the stored ingestion checkpoint
    Checkpoint,
    /// Run the HTTP status API only
    Serve {
        /// Override bind address, e.g. 0.0.0.0:8080
        #[arg(long)]
        addr: Option<String>,
    },
}
