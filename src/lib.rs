//! # Event Aggregator Library
//!
//! Collects message lifecycle events reported by distributed test workers and
//! turns them into latency, failure and throughput results for a single
//! performance run.
//!
//! ## Event Categories
//!
//! Every message a worker handles may produce up to three events, each keyed
//! by the message id:
//!
//! - **SENT**: the sender handed the message to the system under test
//! - **ACCEPTED**: the system under test acknowledged the message
//! - **RECEIVED**: a consumer observed the delivered message
//!
//! ## Architecture Overview
//!
//! - `transport`: TCP ingestion server and client using length-prefixed frames
//! - `ingest`: applies received batches to the stores and signals completion
//! - `store`: one concurrent, first-write-wins map per event category
//! - `barrier`: waits until the expected number of batches has arrived
//! - `correlate`: classifies each sent message and derives latency samples
//! - `throughput`: sliding one-second window counts over sorted timestamps
//! - `metrics`: HDR histogram latency summaries
//! - `reporter` / `sink`: publishes results into a results sink
//! - `aggregator`: drives one run from listener setup to stored results
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use event_aggregator::{Aggregator, AggregatorConfig, ShutdownCoordinator};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AggregatorConfig::new("0.0.0.0:10000".parse()?, 2);
//!     let coordinator = Arc::new(ShutdownCoordinator::new());
//!
//!     let aggregator = Aggregator::bind(config, coordinator).await?;
//!     let report = aggregator.run(std::future::pending()).await?;
//!
//!     println!("Publish failures: {}", report.correlation.publish_failures().len());
//!     Ok(())
//! }
//! ```

/// Run orchestration
///
/// Contains the `Aggregator` that binds the ingestion server, waits for all
/// expected batches, and hands the recorded events to analysis and reporting.
pub mod aggregator;

/// Completion barrier counting received batches
pub mod barrier;

/// Command-line interface and configuration
///
/// Provides argument parsing using clap and validation into the
/// `AggregatorConfig` used by the run.
pub mod cli;

/// Latency correlation across the three event categories
pub mod correlate;

/// Error types shared across the crate
pub mod error;

/// Event data model and wire messages
pub mod events;

/// Ingestion endpoint applying batches to the stores
pub mod ingest;

/// Console and file logging setup
pub mod logging;

/// Latency summaries using HDR histograms
pub mod metrics;

/// Translation of computed results into results sink calls
pub mod reporter;

/// Cleanup callbacks for normal and fatal shutdown
pub mod shutdown;

/// Results sink abstraction and its JSON file implementation
pub mod sink;

/// Per-category event stores
pub mod store;

/// Windowed throughput computation
pub mod throughput;

/// Network transport for event batches
///
/// Frames are a little-endian `u32` length followed by a bincode payload.
/// The server accepts any number of concurrent worker connections.
pub mod transport;

pub use aggregator::{Aggregator, RunReport};
pub use cli::{AggregatorConfig, Args};
pub use correlate::{Correlation, LatencyOutcome};
pub use error::{AggregatorError, FrameError, SinkError, StoreError};
pub use events::{EventCategory, EventsRecord, MessageId, RecordBatch, RecordReply, Timestamp};
pub use shutdown::ShutdownCoordinator;
pub use sink::{JsonFileSink, ResultsSink};
pub use store::{EventStore, EventStores};
pub use transport::{IngestionClient, IngestionServer};

/// The current version of the event aggregator
///
/// Recorded in published results for reproducibility.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod defaults {
    /// Default listen address of the events recorder
    pub const LISTEN_ADDRESS: &str = "0.0.0.0:10000";

    /// Default number of event batches to wait for
    ///
    /// One batch per reporting worker; a single sender and receiver pair
    /// sharing one worker is the smallest useful run.
    pub const EXPECT_RECORDS: usize = 1;

    /// Default output file for published results
    pub const OUTPUT_FILE: &str = "aggregator_results.json";
}
