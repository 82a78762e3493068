use std::net::SocketAddr;
use thiserror::Error;

/// Failures that end an aggregation run
#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error("failed to create listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to set up results sink: {0}")]
    SinkSetup(#[source] SinkError),

    #[error("failed to store data: {source}\noutput: {output}")]
    SinkStore {
        output: String,
        #[source]
        source: SinkError,
    },
}

/// Failure of a single results sink call
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode results: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("rejected {what}: {reason}")]
    Rejected { what: String, reason: String },

    #[error("results were already stored")]
    AlreadyStored,
}

/// Error of the terminal [`crate::sink::ResultsSink::store`] call
///
/// Carries whatever output the sink produced before failing.
#[derive(Debug, Error)]
#[error("{source}")]
pub struct StoreError {
    pub output: String,
    #[source]
    pub source: SinkError,
}

impl From<StoreError> for AggregatorError {
    fn from(err: StoreError) -> Self {
        AggregatorError::SinkStore {
            output: err.output,
            source: err.source,
        }
    }
}

/// Failure on the ingestion wire
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("connection closed")]
    Closed,

    #[error("frame too large: {0} bytes")]
    TooLarge(usize),

    #[error("timeout writing frame due to backpressure")]
    Timeout,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),
}
