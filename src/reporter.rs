//! # Result Reporter
//!
//! Translates a finished [`Correlation`] and the raw category timestamps into
//! results sink calls. A failing call is logged and counted; the remaining
//! calls are still attempted.

use crate::correlate::Correlation;
use crate::events::Timestamp;
use crate::metrics::utils::duration_secs;
use crate::metrics::LatencySummary;
use crate::sink::ResultsSink;
use crate::throughput::windowed_counts;
use tracing::{error, info};

/// Metric and label names understood by the results warehouse
pub mod names {
    /// Publish latency sample, seconds
    pub const PUBLISH_LATENCY: &str = "pl";
    /// End-to-end latency sample, seconds
    pub const DELIVERY_LATENCY: &str = "dl";
    /// Send throughput
    pub const SEND_THROUGHPUT: &str = "st";
    /// Delivery throughput
    pub const DELIVERY_THROUGHPUT: &str = "dt";
    /// Publish failure throughput
    pub const PUBLISH_FAILURE_THROUGHPUT: &str = "pet";
    /// Delivery failure throughput
    pub const DELIVERY_FAILURE_THROUGHPUT: &str = "det";
    /// Publish failure count
    pub const PUBLISH_FAILURES: &str = "pe";
    /// Delivery failure count
    pub const DELIVERY_FAILURES: &str = "de";

    pub const PUBLISH_FAILURE_LABEL: &str = "Publish failure";
    pub const DELIVERY_FAILURE_LABEL: &str = "Delivery failure";
}

/// Failure throughput series shorter than this are not published
pub const MIN_FAILURE_SERIES_LEN: usize = 3;

/// Count of sink calls made by a reporter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportSummary {
    pub accepted: usize,
    pub rejected: usize,
}

/// Pushes computed results into a [`ResultsSink`]
pub struct ResultReporter<'a> {
    sink: &'a mut dyn ResultsSink,
    summary: ReportSummary,
}

impl<'a> ResultReporter<'a> {
    pub fn new(sink: &'a mut dyn ResultsSink) -> Self {
        Self {
            sink,
            summary: ReportSummary::default(),
        }
    }

    /// Publish everything derived from one run
    pub fn publish_all(
        mut self,
        correlation: &Correlation,
        sent: &[Timestamp],
        received: &[Timestamp],
        summaries: &[LatencySummary],
    ) -> ReportSummary {
        self.publish_latencies(correlation);

        info!("Publishing errors");
        self.publish_errors(correlation);

        info!("Publishing throughputs");
        self.publish_throughput(names::SEND_THROUGHPUT, sent);
        self.publish_throughput(names::DELIVERY_THROUGHPUT, received);
        self.publish_failure_throughput(
            names::PUBLISH_FAILURE_THROUGHPUT,
            correlation.publish_failures(),
        );
        self.publish_failure_throughput(
            names::DELIVERY_FAILURE_THROUGHPUT,
            correlation.delivery_failures(),
        );

        info!("Publishing aggregates");
        self.publish_aggregates(correlation);

        for summary in summaries {
            let result = self.sink.add_latency_summary(summary);
            self.track(result, "latency summary");
        }

        self.summary
    }

    /// One sample point per latency, at the message's send time
    pub fn publish_latencies(&mut self, correlation: &Correlation) {
        for sample in correlation.publish_latencies() {
            let result = self.sink.add_sample_point(
                sample.sent_at,
                names::PUBLISH_LATENCY,
                duration_secs(sample.latency),
            );
            self.track(result, "AddSamplePoint for publish-latency");
        }

        for sample in correlation.e2e_latencies() {
            let result = self.sink.add_sample_point(
                sample.sent_at,
                names::DELIVERY_LATENCY,
                duration_secs(sample.latency),
            );
            self.track(result, "AddSamplePoint for deliver-latency");
        }
    }

    pub fn publish_errors(&mut self, correlation: &Correlation) {
        for &t in correlation.publish_failures() {
            let result = self.sink.add_error(t, names::PUBLISH_FAILURE_LABEL);
            self.track(result, "AddError for publish-failure");
        }

        for &t in correlation.delivery_failures() {
            let result = self.sink.add_error(t, names::DELIVERY_FAILURE_LABEL);
            self.track(result, "AddError for deliver-failure");
        }
    }

    /// Windowed throughput series for a set of timestamps
    pub fn publish_throughput(&mut self, metric: &str, timestamps: &[Timestamp]) {
        for point in windowed_counts(timestamps) {
            let result = self
                .sink
                .add_sample_point(point.timestamp, metric, point.count as f64);
            self.track(result, metric);
        }
    }

    /// Throughput of failures, skipped for degenerate series of two points or fewer
    pub fn publish_failure_throughput(&mut self, metric: &str, failures: &[Timestamp]) {
        if failures.len() >= MIN_FAILURE_SERIES_LEN {
            self.publish_throughput(metric, failures);
        }
    }

    pub fn publish_aggregates(&mut self, correlation: &Correlation) {
        let result = self.sink.add_aggregate(
            names::PUBLISH_FAILURES,
            correlation.publish_failures().len() as f64,
        );
        self.track(result, "AddRunAggregate for publish-failures");

        let result = self.sink.add_aggregate(
            names::DELIVERY_FAILURES,
            correlation.delivery_failures().len() as f64,
        );
        self.track(result, "AddRunAggregate for deliver-failures");
    }

    pub fn summary(&self) -> ReportSummary {
        self.summary
    }

    fn track<E: std::fmt::Display>(&mut self, result: Result<(), E>, what: &str) {
        match result {
            Ok(()) => self.summary.accepted += 1,
            Err(e) => {
                error!("ERROR {}: {}", what, e);
                self.summary.rejected += 1;
            }
        }
    }
}
