//! # Event Aggregator - Main Entry Point
//!
//! Runs one aggregation: listens for event batches from the test workers,
//! waits until every expected batch has arrived, then computes and optionally
//! publishes the run's results.
//!
//! ## Error Handling
//!
//! Setup failures (invalid configuration, listen address in use, results
//! sink unavailable) and a failed results store are fatal: the error is
//! logged, registered cleanups run and the process exits with status 1.
//! Failures of individual sink calls are only logged.
//!
//! ## Interrupts
//!
//! Ctrl-C while waiting for batches stops ingestion; the run continues with
//! the events recorded so far.

use clap::Parser;
use event_aggregator::{
    logging::init_logging, Aggregator, AggregatorConfig, Args, ShutdownCoordinator,
};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Hold the guard until exit so the file appender flushes.
    let _log_guard = match init_logging(args.verbose, args.log_file.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {:#}", e);
            std::process::exit(1);
        }
    };

    info!("Starting event aggregator {}", event_aggregator::VERSION);
    info!("Configuration: {:?}", args);

    let coordinator = Arc::new(ShutdownCoordinator::new());

    let config = match AggregatorConfig::from_args(&args) {
        Ok(config) => config,
        Err(e) => coordinator.fatal(e),
    };

    let aggregator = match Aggregator::bind(config, coordinator.clone()).await {
        Ok(aggregator) => aggregator,
        Err(e) => coordinator.fatal(e),
    };

    let report = match aggregator.run(interrupted()).await {
        Ok(report) => report,
        Err(e) => coordinator.fatal(e),
    };

    if !report.complete {
        warn!(
            "Results are based on {} events records only",
            report.batches_received
        );
    }
    info!(
        "Publish failures: {}, delivery failures: {}",
        report.correlation.publish_failures().len(),
        report.correlation.delivery_failures().len()
    );
    if let Some(published) = report.published {
        info!(
            "Results sink accepted {} calls, rejected {}",
            published.accepted, published.rejected
        );
    }
}

/// Resolves on Ctrl-C; never resolves when the handler cannot be installed
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Unable to listen for interrupts: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Interrupt received");
}
