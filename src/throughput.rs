//! # Windowed Throughput
//!
//! Per-event instantaneous throughput estimate: for every timestamp after the
//! first, the number of earlier timestamps that fall within the trailing
//! one-second window ending at it. This is not a fixed-interval bucket series;
//! it yields one point per event.

use crate::events::Timestamp;
use chrono::Duration;
use serde::Serialize;

/// Width of the trailing window, in milliseconds
pub const WINDOW_MS: i64 = 1_000;

/// Number of events seen in the window ending at `timestamp`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ThroughputPoint {
    pub timestamp: Timestamp,
    pub count: u64,
}

/// Trailing one-second window counts over a set of timestamps
///
/// The input does not need to be sorted. Sequences shorter than two elements
/// produce no points. An earlier timestamp `t_j` is inside the window of `t_i`
/// when `t_i - t_j <= 1s`; the point itself is not counted.
pub fn windowed_counts(timestamps: &[Timestamp]) -> Vec<ThroughputPoint> {
    if timestamps.len() < 2 {
        return Vec::new();
    }

    let window = Duration::milliseconds(WINDOW_MS);
    let mut sorted = timestamps.to_vec();
    sorted.sort();

    // `start` is the oldest timestamp still inside the window of `t`. It only
    // moves forward, so the whole scan is linear.
    let mut start = 0;
    let mut points = Vec::with_capacity(sorted.len() - 1);
    for (i, &t) in sorted.iter().enumerate().skip(1) {
        while t - sorted[start] > window {
            start += 1;
        }

        points.push(ThroughputPoint {
            timestamp: t,
            count: (i - start) as u64,
        });
    }

    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn ms(millis: i64) -> Timestamp {
        Utc.timestamp_millis_opt(millis).unwrap()
    }

    fn counts(points: &[ThroughputPoint]) -> Vec<u64> {
        points.iter().map(|p| p.count).collect()
    }

    #[test]
    fn test_trailing_window() {
        let points = windowed_counts(&[ms(0), ms(500), ms(900), ms(2000)]);

        assert_eq!(counts(&points), vec![1, 2, 0]);
        assert_eq!(points[0].timestamp, ms(500));
        assert_eq!(points[2].timestamp, ms(2000));
    }

    #[test]
    fn test_unsorted_input() {
        let points = windowed_counts(&[ms(2000), ms(900), ms(0), ms(500)]);
        assert_eq!(counts(&points), vec![1, 2, 0]);
    }

    #[test]
    fn test_window_bound_is_inclusive() {
        let points = windowed_counts(&[ms(0), ms(1000), ms(2001)]);
        assert_eq!(counts(&points), vec![1, 0]);
    }

    #[test]
    fn test_simultaneous_timestamps() {
        let points = windowed_counts(&[ms(100), ms(100), ms(100)]);
        assert_eq!(counts(&points), vec![1, 2]);
    }

    #[test]
    fn test_dense_series_matches_pairwise_count() {
        // Bursts of equal timestamps with gaps around the window length.
        let timestamps: Vec<Timestamp> = (0..3_000i64)
            .map(|n| ms((n / 3) * 7 + if n % 50 == 0 { 1_000 } else { 0 }))
            .collect();
        let mut sorted = timestamps.clone();
        sorted.sort();

        let expected: Vec<u64> = (1..sorted.len())
            .map(|i| {
                sorted[..i]
                    .iter()
                    .filter(|&&earlier| sorted[i] - earlier <= Duration::milliseconds(WINDOW_MS))
                    .count() as u64
            })
            .collect();

        assert_eq!(counts(&windowed_counts(&timestamps)), expected);
    }

    #[test]
    fn test_short_input_is_empty() {
        assert!(windowed_counts(&[]).is_empty());
        assert!(windowed_counts(&[ms(42)]).is_empty());
    }
}
