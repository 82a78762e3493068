//! # Results Sink
//!
//! Boundary to the results warehouse. The reporter pushes sample points,
//! error markers and run aggregates through [`ResultsSink`], then finalizes
//! the session with a single `store` call.
//!
//! [`JsonFileSink`] is the bundled implementation: it accumulates everything
//! in memory and writes one JSON document when stored. While a session is
//! open it keeps an `.inprogress` marker next to the output file; the marker
//! is the external resource that has to be released on every exit path, which
//! is what [`JsonFileSink::shutdown_hook`] is for.

use crate::error::{SinkError, StoreError};
use crate::events::Timestamp;
use crate::metrics::LatencySummary;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Receiver of computed results
pub trait ResultsSink: Send {
    /// Add one point of a named time series
    fn add_sample_point(
        &mut self,
        timestamp: Timestamp,
        metric: &str,
        value: f64,
    ) -> Result<(), SinkError>;

    /// Add an error marker at a point in time
    fn add_error(&mut self, timestamp: Timestamp, label: &str) -> Result<(), SinkError>;

    /// Add a run-level scalar
    fn add_aggregate(&mut self, name: &str, value: f64) -> Result<(), SinkError>;

    /// Attach a latency distribution summary. Sinks without a place for it
    /// may ignore it.
    fn add_latency_summary(&mut self, _summary: &LatencySummary) -> Result<(), SinkError> {
        Ok(())
    }

    /// Finalize the session, returning the sink's output
    fn store(&mut self) -> Result<String, StoreError>;
}

/// One point of a time series
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplePoint {
    pub timestamp: Timestamp,
    pub value: f64,
}

/// Error marker at a point in time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMarker {
    pub timestamp: Timestamp,
    pub label: String,
}

/// System information for reproducibility
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    pub os: String,
    pub architecture: String,
    pub cpu_cores: usize,
    pub aggregator_version: String,
}

impl Default for SystemInfo {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            architecture: std::env::consts::ARCH.to_string(),
            cpu_cores: num_cpus::get(),
            aggregator_version: crate::VERSION.to_string(),
        }
    }
}

/// Run metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: String,
    pub tags: Vec<String>,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub stored_at: Option<chrono::DateTime<chrono::Utc>>,
    pub system_info: SystemInfo,
}

/// Document written by [`JsonFileSink::store`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResults {
    pub metadata: RunMetadata,
    /// Sample points grouped by metric name
    pub samples: BTreeMap<String, Vec<SamplePoint>>,
    pub errors: Vec<ErrorMarker>,
    pub aggregates: BTreeMap<String, f64>,
    pub latency_summaries: Vec<LatencySummary>,
}

/// Sink writing the run results as a JSON document
pub struct JsonFileSink {
    output_file: PathBuf,
    marker_file: PathBuf,
    results: RunResults,
    stored: bool,
}

impl JsonFileSink {
    /// Open a results session for `output_file`
    ///
    /// Creates the in-progress marker, so an unwritable output location is
    /// reported here rather than after the run.
    pub fn setup(output_file: &Path, tags: &[String]) -> Result<Self, SinkError> {
        let marker_file = marker_path(output_file);
        std::fs::write(&marker_file, b"")?;

        let run_id = Uuid::new_v4().to_string();
        info!(
            "Opened results session {} for {:?} with tags {:?}",
            run_id, output_file, tags
        );

        Ok(Self {
            output_file: output_file.to_path_buf(),
            marker_file,
            results: RunResults {
                metadata: RunMetadata {
                    run_id,
                    tags: tags.to_vec(),
                    started_at: chrono::Utc::now(),
                    stored_at: None,
                    system_info: SystemInfo::default(),
                },
                samples: BTreeMap::new(),
                errors: Vec::new(),
                aggregates: BTreeMap::new(),
                latency_summaries: Vec::new(),
            },
            stored: false,
        })
    }

    pub fn output_file(&self) -> &Path {
        &self.output_file
    }

    pub fn run_id(&self) -> &str {
        &self.results.metadata.run_id
    }

    /// Cleanup callback releasing the session's marker
    ///
    /// Safe to run after a successful `store`, which already removed it.
    pub fn shutdown_hook(&self) -> impl FnOnce() + Send + 'static {
        let marker_file = self.marker_file.clone();
        move || match std::fs::remove_file(&marker_file) {
            Ok(()) => debug!("Removed results marker {:?}", marker_file),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove results marker {:?}: {}", marker_file, e),
        }
    }

    fn check_open(&self) -> Result<(), SinkError> {
        if self.stored {
            return Err(SinkError::AlreadyStored);
        }
        Ok(())
    }

    fn write_results(&mut self) -> Result<(), SinkError> {
        self.results.metadata.stored_at = Some(chrono::Utc::now());
        let json = serde_json::to_string_pretty(&self.results)?;
        std::fs::write(&self.output_file, json)?;
        std::fs::remove_file(&self.marker_file)?;
        Ok(())
    }

    fn describe(&self) -> String {
        let points: usize = self.results.samples.values().map(Vec::len).sum();
        format!(
            "run {}: {} sample points in {} series, {} errors, {} aggregates -> {}",
            self.results.metadata.run_id,
            points,
            self.results.samples.len(),
            self.results.errors.len(),
            self.results.aggregates.len(),
            self.output_file.display()
        )
    }
}

impl ResultsSink for JsonFileSink {
    fn add_sample_point(
        &mut self,
        timestamp: Timestamp,
        metric: &str,
        value: f64,
    ) -> Result<(), SinkError> {
        self.check_open()?;
        if !value.is_finite() {
            return Err(SinkError::Rejected {
                what: format!("sample point for {}", metric),
                reason: format!("value {} is not finite", value),
            });
        }

        self.results
            .samples
            .entry(metric.to_string())
            .or_default()
            .push(SamplePoint { timestamp, value });
        Ok(())
    }

    fn add_error(&mut self, timestamp: Timestamp, label: &str) -> Result<(), SinkError> {
        self.check_open()?;
        self.results.errors.push(ErrorMarker {
            timestamp,
            label: label.to_string(),
        });
        Ok(())
    }

    fn add_aggregate(&mut self, name: &str, value: f64) -> Result<(), SinkError> {
        self.check_open()?;
        if !value.is_finite() {
            return Err(SinkError::Rejected {
                what: format!("aggregate {}", name),
                reason: format!("value {} is not finite", value),
            });
        }

        self.results.aggregates.insert(name.to_string(), value);
        Ok(())
    }

    fn add_latency_summary(&mut self, summary: &LatencySummary) -> Result<(), SinkError> {
        self.check_open()?;
        self.results.latency_summaries.push(summary.clone());
        Ok(())
    }

    fn store(&mut self) -> Result<String, StoreError> {
        let output = self.describe();
        if let Err(source) = self.check_open() {
            return Err(StoreError { output, source });
        }

        match self.write_results() {
            Ok(()) => {
                self.stored = true;
                Ok(output)
            }
            Err(source) => Err(StoreError { output, source }),
        }
    }
}

fn marker_path(output_file: &Path) -> PathBuf {
    let mut name = output_file
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".inprogress");
    output_file.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn ts(secs: i64) -> Timestamp {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_store_writes_document() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("results.json");
        let tags = vec!["broker=kafka".to_string()];

        let mut sink = JsonFileSink::setup(&output, &tags).unwrap();
        assert!(marker_path(&output).exists());

        sink.add_sample_point(ts(1), "pl", 0.25).unwrap();
        sink.add_sample_point(ts(2), "pl", 0.5).unwrap();
        sink.add_error(ts(3), "Publish failure").unwrap();
        sink.add_aggregate("pe", 1.0).unwrap();

        let out = sink.store().unwrap();
        assert!(out.contains("2 sample points"));
        assert!(!marker_path(&output).exists());

        let written: RunResults =
            serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(written.metadata.tags, tags);
        assert_eq!(written.samples["pl"].len(), 2);
        assert_eq!(written.errors[0].label, "Publish failure");
        assert_eq!(written.aggregates["pe"], 1.0);
        assert!(written.metadata.stored_at.is_some());
    }

    #[test]
    fn test_rejects_non_finite_values() {
        let dir = TempDir::new().unwrap();
        let mut sink = JsonFileSink::setup(&dir.path().join("r.json"), &[]).unwrap();

        assert!(matches!(
            sink.add_sample_point(ts(1), "dl", f64::NAN),
            Err(SinkError::Rejected { .. })
        ));
        assert!(sink.add_aggregate("de", f64::INFINITY).is_err());
        assert!(sink.add_sample_point(ts(1), "dl", 1.0).is_ok());
    }

    #[test]
    fn test_store_twice_fails() {
        let dir = TempDir::new().unwrap();
        let mut sink = JsonFileSink::setup(&dir.path().join("r.json"), &[]).unwrap();

        sink.store().unwrap();
        let err = sink.store().unwrap_err();
        assert!(matches!(err.source, SinkError::AlreadyStored));
        assert!(sink.add_error(ts(1), "late").is_err());
    }

    #[test]
    fn test_setup_fails_for_missing_directory() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("missing").join("r.json");
        assert!(matches!(
            JsonFileSink::setup(&output, &[]),
            Err(SinkError::Io(_))
        ));
    }

    #[test]
    fn test_shutdown_hook_removes_marker() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("r.json");
        let sink = JsonFileSink::setup(&output, &[]).unwrap();

        let hook = sink.shutdown_hook();
        hook();

        assert!(!marker_path(&output).exists());
        assert!(!output.exists());
    }
}
