//! # Correlation
//!
//! Once ingestion is complete, every SENT event is matched against the
//! ACCEPTED and RECEIVED stores by message id. SENT is the root of the
//! correlation: ids that only appear in ACCEPTED or RECEIVED cannot be
//! attributed to a send and are left out.
//!
//! A message that was never accepted is a publish failure, even if it was
//! received. Latencies are signed; a negative value means the clocks of the
//! reporting workers disagree and is reported as-is.

use crate::events::{MessageId, Timestamp};
use crate::store::EventStores;
use chrono::Duration;
use std::collections::HashMap;
use tracing::{info, warn};

/// Classification of one sent message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatencyOutcome {
    Delivered {
        publish_latency: Duration,
        e2e_latency: Duration,
    },
    PublishFailure {
        sent_at: Timestamp,
    },
    DeliveryFailure {
        sent_at: Timestamp,
    },
}

/// Latency of one message, keyed by the time it was sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencySample {
    pub sent_at: Timestamp,
    pub latency: Duration,
}

/// Classify one message from its three lifecycle timestamps
pub fn classify(
    sent_at: Timestamp,
    accepted_at: Option<Timestamp>,
    received_at: Option<Timestamp>,
) -> LatencyOutcome {
    let accepted_at = match accepted_at {
        Some(t) => t,
        None => return LatencyOutcome::PublishFailure { sent_at },
    };
    let publish_latency = accepted_at - sent_at;

    match received_at {
        Some(received_at) => LatencyOutcome::Delivered {
            publish_latency,
            e2e_latency: received_at - sent_at,
        },
        None => LatencyOutcome::DeliveryFailure { sent_at },
    }
}

/// Result of correlating the three stores of a run
#[derive(Debug, Clone, Default)]
pub struct Correlation {
    outcomes: HashMap<MessageId, LatencyOutcome>,
    publish_latencies: Vec<LatencySample>,
    e2e_latencies: Vec<LatencySample>,
    publish_failures: Vec<Timestamp>,
    delivery_failures: Vec<Timestamp>,
    negative_latencies: usize,
}

impl Correlation {
    /// Correlate SENT events against ACCEPTED and RECEIVED
    ///
    /// Must only be called after the completion barrier has released.
    pub fn compute(stores: &EventStores) -> Self {
        let sent = stores.sent().snapshot();
        let accepted = stores.accepted().snapshot();
        let received = stores.received().snapshot();

        Self::from_maps(&sent, &accepted, &received)
    }

    pub fn from_maps(
        sent: &HashMap<MessageId, Timestamp>,
        accepted: &HashMap<MessageId, Timestamp>,
        received: &HashMap<MessageId, Timestamp>,
    ) -> Self {
        let mut correlation = Self {
            outcomes: HashMap::with_capacity(sent.len()),
            ..Default::default()
        };

        for (id, &sent_at) in sent {
            let accepted_at = accepted.get(id).copied();
            let outcome = classify(sent_at, accepted_at, received.get(id).copied());

            // Accepted-but-not-received messages still have a publish latency.
            if let Some(accepted_at) = accepted_at {
                correlation.push_publish_latency(sent_at, accepted_at - sent_at);
            }

            match outcome {
                LatencyOutcome::Delivered { e2e_latency, .. } => {
                    correlation.push_e2e_latency(sent_at, e2e_latency);
                }
                LatencyOutcome::PublishFailure { sent_at } => {
                    correlation.publish_failures.push(sent_at)
                }
                LatencyOutcome::DeliveryFailure { sent_at } => {
                    correlation.delivery_failures.push(sent_at)
                }
            }

            correlation.outcomes.insert(id.clone(), outcome);
        }

        correlation.publish_failures.sort();
        correlation.delivery_failures.sort();
        correlation.publish_latencies.sort_by_key(|s| s.sent_at);
        correlation.e2e_latencies.sort_by_key(|s| s.sent_at);

        if correlation.negative_latencies > 0 {
            warn!(
                "Found {} negative latencies, clocks of the reporting workers may be skewed",
                correlation.negative_latencies
            );
        }
        info!("Publish failure count: {}", correlation.publish_failures.len());
        info!("Delivery failure count: {}", correlation.delivery_failures.len());

        correlation
    }

    fn push_publish_latency(&mut self, sent_at: Timestamp, latency: Duration) {
        if latency < Duration::zero() {
            self.negative_latencies += 1;
        }
        self.publish_latencies.push(LatencySample { sent_at, latency });
    }

    fn push_e2e_latency(&mut self, sent_at: Timestamp, latency: Duration) {
        if latency < Duration::zero() {
            self.negative_latencies += 1;
        }
        self.e2e_latencies.push(LatencySample { sent_at, latency });
    }

    /// Classification of a sent message, `None` for ids never sent
    pub fn outcome(&self, id: &str) -> Option<&LatencyOutcome> {
        self.outcomes.get(id)
    }

    pub fn outcomes(&self) -> &HashMap<MessageId, LatencyOutcome> {
        &self.outcomes
    }

    /// Publish latency of every accepted message, ordered by send time
    pub fn publish_latencies(&self) -> &[LatencySample] {
        &self.publish_latencies
    }

    /// End-to-end latency of every delivered message, ordered by send time
    pub fn e2e_latencies(&self) -> &[LatencySample] {
        &self.e2e_latencies
    }

    /// Send times of messages never accepted, ascending
    pub fn publish_failures(&self) -> &[Timestamp] {
        &self.publish_failures
    }

    /// Send times of messages accepted but never received, ascending
    pub fn delivery_failures(&self) -> &[Timestamp] {
        &self.delivery_failures
    }

    /// Number of latency samples below zero
    pub fn negative_latencies(&self) -> usize {
        self.negative_latencies
    }
}
