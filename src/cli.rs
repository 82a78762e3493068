use crate::error::AggregatorError;
use clap::{ArgAction, Parser};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Event Aggregator - collects message lifecycle events from test workers and
/// computes latency, failure and throughput results
#[derive(Parser, Debug, Clone)]
#[clap(version, about, long_about = None)]
pub struct Args {
    /// Address the events recorder listens on
    #[clap(short = 'l', long, default_value = crate::defaults::LISTEN_ADDRESS, help_heading = "Core Options")]
    pub listen_address: String,

    /// Number of event batches to wait for before computing results
    #[clap(short = 'e', long, default_value_t = crate::defaults::EXPECT_RECORDS, help_heading = "Core Options")]
    pub expect_records: usize,

    /// Publish results to the results sink
    #[clap(long, default_value_t = false)]
    pub publish: bool,

    /// Tags identifying the run in the results sink (comma-separated or repeated)
    #[clap(short = 't', long = "tag", value_delimiter = ',', num_args = 1..)]
    pub tags: Vec<String>,

    /// Output file for published results (JSON format)
    #[clap(short = 'o', long, default_value = crate::defaults::OUTPUT_FILE)]
    pub output_file: PathBuf,

    /// Increase log verbosity (-v for debug, -vv for trace)
    #[clap(short = 'v', long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Also write logs to this file
    #[clap(long)]
    pub log_file: Option<PathBuf>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            listen_address: crate::defaults::LISTEN_ADDRESS.to_string(),
            expect_records: crate::defaults::EXPECT_RECORDS,
            publish: false,
            tags: Vec::new(),
            output_file: PathBuf::from(crate::defaults::OUTPUT_FILE),
            verbose: 0,
            log_file: None,
        }
    }
}

/// Validated configuration of one aggregation run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AggregatorConfig {
    pub listen_address: SocketAddr,
    pub expect_records: usize,
    pub publish_results: bool,
    pub tags: Vec<String>,
    pub output_file: PathBuf,
}

impl AggregatorConfig {
    /// Configuration with default output settings and publishing disabled
    pub fn new(listen_address: SocketAddr, expect_records: usize) -> Self {
        Self {
            listen_address,
            expect_records,
            publish_results: false,
            tags: Vec::new(),
            output_file: PathBuf::from(crate::defaults::OUTPUT_FILE),
        }
    }

    /// Validate parsed arguments
    ///
    /// The listen address must be a socket address; tags are trimmed and an
    /// empty tag is rejected.
    pub fn from_args(args: &Args) -> Result<Self, AggregatorError> {
        let listen_address = parse_listen_address(&args.listen_address)?;

        let tags = args
            .tags
            .iter()
            .map(|tag| {
                let tag = tag.trim();
                if tag.is_empty() {
                    Err(AggregatorError::Config("tags cannot be empty".to_string()))
                } else {
                    Ok(tag.to_string())
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            listen_address,
            expect_records: args.expect_records,
            publish_results: args.publish,
            tags,
            output_file: args.output_file.clone(),
        })
    }
}

/// Parse a listen address, accepting the `:port` shorthand for all interfaces
fn parse_listen_address(s: &str) -> Result<SocketAddr, AggregatorError> {
    let s = s.trim();
    let candidate = if s.starts_with(':') {
        format!("0.0.0.0{}", s)
    } else {
        s.to_string()
    };

    candidate
        .parse()
        .map_err(|_| AggregatorError::Config(format!("invalid listen address: {:?}", s)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_listen_address() {
        assert_eq!(
            parse_listen_address("127.0.0.1:10000").unwrap(),
            "127.0.0.1:10000".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            parse_listen_address(":10000").unwrap(),
            "0.0.0.0:10000".parse::<SocketAddr>().unwrap()
        );
        assert!(parse_listen_address("").is_err());
        assert!(parse_listen_address("localhost").is_err());
    }

    #[test]
    fn test_config_from_args() {
        let args = Args::parse_from([
            "event-aggregator",
            "--listen-address",
            "127.0.0.1:9000",
            "-e",
            "3",
            "--publish",
            "--tag",
            "broker=kafka, channel=in-memory",
        ]);

        let config = AggregatorConfig::from_args(&args).unwrap();
        assert_eq!(config.listen_address.port(), 9000);
        assert_eq!(config.expect_records, 3);
        assert!(config.publish_results);
        assert_eq!(config.tags, vec!["broker=kafka", "channel=in-memory"]);
    }

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["event-aggregator"]);
        let config = AggregatorConfig::from_args(&args).unwrap();

        assert_eq!(
            config.listen_address,
            crate::defaults::LISTEN_ADDRESS.parse::<SocketAddr>().unwrap()
        );
        assert_eq!(config.expect_records, crate::defaults::EXPECT_RECORDS);
        assert!(!config.publish_results);
        assert!(config.tags.is_empty());
        assert_eq!(args.verbose, 0);
    }

    #[test]
    fn test_empty_tag_rejected() {
        let args = Args {
            tags: vec!["ok".to_string(), "  ".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            AggregatorConfig::from_args(&args),
            Err(AggregatorError::Config(_))
        ));
    }

    #[test]
    fn test_verbosity_count() {
        let args = Args::parse_from(["event-aggregator", "-vv"]);
        assert_eq!(args.verbose, 2);
    }
}
