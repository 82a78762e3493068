use crate::correlate::LatencySample;
use anyhow::Result;
use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Percentiles reported in every latency summary
pub const SUMMARY_PERCENTILES: [f64; 4] = [50.0, 90.0, 99.0, 99.9];

/// Kind of latency a summary describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LatencyType {
    /// Sent to accepted
    Publish,
    /// Sent to received
    EndToEnd,
}

impl fmt::Display for LatencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LatencyType::Publish => write!(f, "publish"),
            LatencyType::EndToEnd => write!(f, "end-to-end"),
        }
    }
}

/// Percentile value pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PercentileValue {
    pub percentile: f64,
    pub value_ns: u64,
}

/// Distribution of one latency kind over a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencySummary {
    pub latency_type: LatencyType,
    pub min_ns: u64,
    pub max_ns: u64,
    pub mean_ns: f64,
    pub std_dev_ns: f64,
    pub percentiles: Vec<PercentileValue>,
    pub total_samples: usize,
    /// Samples below zero, left out of the histogram
    pub negative_samples: usize,
}

/// Latency collector using HDR histogram for accurate measurement
pub struct LatencyCollector {
    histogram: Histogram<u64>,
    latency_type: LatencyType,
    sample_count: usize,
    negative_count: usize,
}

impl LatencyCollector {
    /// Create a new latency collector
    pub fn new(latency_type: LatencyType) -> Result<Self> {
        // 3 significant figures, auto-resizing
        let histogram = Histogram::<u64>::new(3)?;

        Ok(Self {
            histogram,
            latency_type,
            sample_count: 0,
            negative_count: 0,
        })
    }

    /// Record a latency measurement
    ///
    /// Negative latencies come from skewed clocks; they are counted but the
    /// histogram only holds non-negative values.
    pub fn record(&mut self, latency: chrono::Duration) -> Result<()> {
        self.sample_count += 1;
        match latency.num_nanoseconds() {
            Some(ns) if ns >= 0 => self.histogram.record(ns as u64)?,
            Some(_) => self.negative_count += 1,
            None if latency < chrono::Duration::zero() => self.negative_count += 1,
            None => self.histogram.saturating_record(u64::MAX),
        }
        Ok(())
    }

    /// Build a collector from correlated samples
    pub fn from_samples(latency_type: LatencyType, samples: &[LatencySample]) -> Result<Self> {
        let mut collector = Self::new(latency_type)?;
        for sample in samples {
            collector.record(sample.latency)?;
        }
        Ok(collector)
    }

    /// Summary of the recorded samples, `None` when nothing was recorded
    pub fn summary(&self) -> Option<LatencySummary> {
        if self.sample_count == 0 {
            return None;
        }

        let percentiles = SUMMARY_PERCENTILES
            .iter()
            .map(|&p| PercentileValue {
                percentile: p,
                value_ns: self.histogram.value_at_percentile(p),
            })
            .collect();

        Some(LatencySummary {
            latency_type: self.latency_type,
            min_ns: self.histogram.min(),
            max_ns: self.histogram.max(),
            mean_ns: self.histogram.mean(),
            std_dev_ns: self.histogram.stdev(),
            percentiles,
            total_samples: self.sample_count,
            negative_samples: self.negative_count,
        })
    }
}

impl LatencySummary {
    /// Single log line describing the distribution
    pub fn describe(&self) -> String {
        let percentiles: Vec<String> = self
            .percentiles
            .iter()
            .map(|p| format!("p{}={}", p.percentile, utils::format_latency(p.value_ns)))
            .collect();

        format!(
            "{} latency over {} samples: min={} mean={} max={} {}",
            self.latency_type,
            self.total_samples,
            utils::format_latency(self.min_ns),
            utils::format_latency(self.mean_ns as u64),
            utils::format_latency(self.max_ns),
            percentiles.join(" ")
        )
    }
}

/// Utility functions for metrics calculation
pub mod utils {
    /// Signed duration as fractional seconds, the unit sample points use
    pub fn duration_secs(duration: chrono::Duration) -> f64 {
        match duration.num_nanoseconds() {
            Some(ns) => ns as f64 / 1_000_000_000.0,
            None => duration.num_milliseconds() as f64 / 1_000.0,
        }
    }

    /// Format latency value for human-readable output
    pub fn format_latency(latency_ns: u64) -> String {
        if latency_ns < 1_000 {
            format!("{}ns", latency_ns)
        } else if latency_ns < 1_000_000 {
            format!("{:.2}μs", latency_ns as f64 / 1_000.0)
        } else if latency_ns < 1_000_000_000 {
            format!("{:.2}ms", latency_ns as f64 / 1_000_000.0)
        } else {
            format!("{:.2}s", latency_ns as f64 / 1_000_000_000.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn test_latency_collector() {
        let mut collector = LatencyCollector::new(LatencyType::Publish).unwrap();

        collector.record(Duration::milliseconds(1)).unwrap();
        collector.record(Duration::milliseconds(2)).unwrap();
        collector.record(Duration::milliseconds(3)).unwrap();

        let summary = collector.summary().unwrap();
        assert_eq!(summary.latency_type, LatencyType::Publish);
        assert_eq!(summary.total_samples, 3);
        assert_eq!(summary.negative_samples, 0);
        assert_eq!(summary.percentiles.len(), SUMMARY_PERCENTILES.len());
        assert!(summary.mean_ns > 0.0);
    }

    #[test]
    fn test_negative_samples_counted() {
        let sent_at = Utc.timestamp_opt(10, 0).unwrap();
        let samples = vec![
            LatencySample {
                sent_at,
                latency: Duration::milliseconds(-5),
            },
            LatencySample {
                sent_at,
                latency: Duration::milliseconds(5),
            },
        ];

        let summary = LatencyCollector::from_samples(LatencyType::EndToEnd, &samples)
            .unwrap()
            .summary()
            .unwrap();

        assert_eq!(summary.total_samples, 2);
        assert_eq!(summary.negative_samples, 1);
        assert!(summary.describe().starts_with("end-to-end latency over 2 samples"));
    }

    #[test]
    fn test_empty_collector_has_no_summary() {
        let collector = LatencyCollector::new(LatencyType::EndToEnd).unwrap();
        assert!(collector.summary().is_none());
    }

    #[test]
    fn test_duration_secs() {
        assert_eq!(utils::duration_secs(Duration::milliseconds(1500)), 1.5);
        assert_eq!(utils::duration_secs(Duration::seconds(-2)), -2.0);
    }

    #[test]
    fn test_format_latency() {
        assert_eq!(utils::format_latency(500), "500ns");
        assert_eq!(utils::format_latency(1500), "1.50μs");
        assert_eq!(utils::format_latency(1500000), "1.50ms");
        assert_eq!(utils::format_latency(1500000000), "1.50s");
    }
}
