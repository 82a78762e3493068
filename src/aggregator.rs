//! # Aggregation Run
//!
//! Drives a single aggregation run from listener setup to published results.
//!
//! ## Run Lifecycle
//!
//! 1. **Bind**: the ingestion listener is created up front so that an address
//!    conflict fails the run before anything else happens
//! 2. **Sink setup**: when publishing is enabled, a results session is opened
//!    and its cleanup is registered with the [`ShutdownCoordinator`]
//! 3. **Ingestion**: the server records incoming batches until the completion
//!    barrier has seen the expected number of batches, or the caller's
//!    interrupt future resolves
//! 4. **Server stop**: no new batches are accepted; recorded events are kept
//! 5. **Analysis**: correlation, latency summaries, throughput, reporting
//! 6. **Store**: the results session is finalized; failure here is fatal
//!
//! Steps 5 and 6 are single-threaded and only start after step 4, so the
//! stores are no longer written to while they are read.

use crate::{
    barrier::CompletionBarrier,
    cli::AggregatorConfig,
    correlate::Correlation,
    error::AggregatorError,
    ingest::IngestionEndpoint,
    metrics::{LatencyCollector, LatencySummary, LatencyType},
    reporter::{ReportSummary, ResultReporter},
    shutdown::ShutdownCoordinator,
    sink::{JsonFileSink, ResultsSink},
    store::EventStores,
    transport::IngestionServer,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Outcome of a finished run
#[derive(Debug)]
pub struct RunReport {
    pub correlation: Correlation,
    pub sent_count: usize,
    pub accepted_count: usize,
    pub received_count: usize,
    /// Batches received when analysis started
    pub batches_received: usize,
    /// False when the run was interrupted before all batches arrived
    pub complete: bool,
    pub latency_summaries: Vec<LatencySummary>,
    /// Sink call counts, `None` when results were not published
    pub published: Option<ReportSummary>,
    /// Output of the sink's store call
    pub store_output: Option<String>,
}

/// One aggregation run
pub struct Aggregator {
    config: AggregatorConfig,
    server: IngestionServer,
    stores: Arc<EventStores>,
    barrier: Arc<CompletionBarrier>,
    coordinator: Arc<ShutdownCoordinator>,
    sink: Option<Box<dyn ResultsSink>>,
}

impl Aggregator {
    /// Bind the ingestion listener and prepare empty stores
    pub async fn bind(
        config: AggregatorConfig,
        coordinator: Arc<ShutdownCoordinator>,
    ) -> Result<Self, AggregatorError> {
        let server = IngestionServer::bind(config.listen_address).await?;

        Ok(Self {
            barrier: Arc::new(CompletionBarrier::new(config.expect_records)),
            stores: Arc::new(EventStores::new()),
            config,
            server,
            coordinator,
            sink: None,
        })
    }

    /// Publish to `sink` instead of opening a [`JsonFileSink`]
    ///
    /// Only used when publishing is enabled in the configuration.
    pub fn with_sink(mut self, sink: Box<dyn ResultsSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Address the ingestion server is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Execute the run
    ///
    /// `interrupt` resolving before all batches arrived stops ingestion early;
    /// the run then continues with the events recorded so far and reports
    /// `complete == false`.
    pub async fn run<F>(self, interrupt: F) -> Result<RunReport, AggregatorError>
    where
        F: Future<Output = ()>,
    {
        let Aggregator {
            config,
            server,
            stores,
            barrier,
            coordinator,
            sink,
        } = self;

        // Open the results session before accepting any batch, so an unusable
        // sink fails the run while no worker has reported yet.
        let mut sink = if config.publish_results {
            info!("Configuring results sink");
            Some(open_sink(sink, &config, &coordinator)?)
        } else {
            info!("Results won't be published");
            None
        };

        // The server shares the stores and barrier with this task through the
        // endpoint; the watch channel is its only stop signal.
        info!("Starting events recorder server on {}", server.local_addr());
        let endpoint = IngestionEndpoint::new(stores.clone(), barrier.clone());
        let (stop_tx, stop_rx) = watch::channel(false);
        let server_task = tokio::spawn(server.serve(endpoint, stop_rx));

        // Wait for every expected batch. An interrupt ends the wait early but
        // keeps whatever has been recorded so far.
        info!("Expecting {} events records", config.expect_records);
        tokio::pin!(interrupt);
        let complete = tokio::select! {
            _ = barrier.await_all() => {
                info!("Received all expected events records");
                true
            }
            _ = &mut interrupt => {
                warn!(
                    "Interrupted after {} of {} events records, continuing with partial data",
                    barrier.signalled(),
                    config.expect_records
                );
                false
            }
        };

        // Stop ingestion and wait for in-flight batches to be acknowledged.
        // After this point nothing writes to the stores anymore.
        let _ = stop_tx.send(true);
        if let Err(e) = server_task.await {
            error!("Events recorder server task failed: {}", e);
        }

        let mut report = analyse(&stores, &barrier, complete, sink.as_deref_mut());

        // A failed store is returned to the caller without running cleanups;
        // the fatal path releases the session's resources.
        if let Some(sink) = sink.as_mut() {
            info!("Storing results");
            let output = sink.store()?;
            info!("Stored {}", output);
            report.store_output = Some(output);
        }

        coordinator.run_cleanups();
        info!("Aggregation completed");
        Ok(report)
    }
}

fn open_sink(
    injected: Option<Box<dyn ResultsSink>>,
    config: &AggregatorConfig,
    coordinator: &ShutdownCoordinator,
) -> Result<Box<dyn ResultsSink>, AggregatorError> {
    if let Some(sink) = injected {
        return Ok(sink);
    }

    let sink = JsonFileSink::setup(&config.output_file, &config.tags)
        .map_err(AggregatorError::SinkSetup)?;
    coordinator.register("results sink session", sink.shutdown_hook());
    Ok(Box::new(sink))
}

/// Correlate, summarize and (optionally) publish the recorded events
fn analyse(
    stores: &EventStores,
    barrier: &CompletionBarrier,
    complete: bool,
    sink: Option<&mut (dyn ResultsSink + 'static)>,
) -> RunReport {
    let sent_count = stores.sent().len();
    let accepted_count = stores.accepted().len();
    let received_count = stores.received().len();
    info!("Sent count: {}", sent_count);
    info!("Accepted count: {}", accepted_count);
    info!("Received count: {}", received_count);

    info!("Calculating latencies");
    let correlation = Correlation::compute(stores);

    let mut latency_summaries = Vec::new();
    for (latency_type, samples) in [
        (LatencyType::Publish, correlation.publish_latencies()),
        (LatencyType::EndToEnd, correlation.e2e_latencies()),
    ] {
        match LatencyCollector::from_samples(latency_type, samples) {
            Ok(collector) => {
                if let Some(summary) = collector.summary() {
                    info!("{}", summary.describe());
                    latency_summaries.push(summary);
                }
            }
            Err(e) => warn!("Failed to summarize {} latency: {}", latency_type, e),
        }
    }

    let published = sink.map(|sink| {
        let sent = stores.sent().timestamps();
        let received = stores.received().timestamps();
        ResultReporter::new(sink).publish_all(&correlation, &sent, &received, &latency_summaries)
    });

    RunReport {
        correlation,
        sent_count,
        accepted_count,
        received_count,
        batches_received: barrier.signalled(),
        complete,
        latency_summaries,
        published,
        store_output: None,
    }
}
