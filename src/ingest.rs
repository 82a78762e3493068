//! # Ingestion Endpoint
//!
//! Routes the records of an incoming batch to the per-category stores and
//! counts the batch toward completion. The endpoint only signals the barrier;
//! it never waits on it, so ingestion calls stay independent of each other.

use crate::barrier::CompletionBarrier;
use crate::events::{RecordBatch, RecordReply};
use crate::store::EventStores;
use std::sync::Arc;
use tracing::{debug, info};

/// Accepts batches of categorized events
#[derive(Clone)]
pub struct IngestionEndpoint {
    stores: Arc<EventStores>,
    barrier: Arc<CompletionBarrier>,
}

impl IngestionEndpoint {
    pub fn new(stores: Arc<EventStores>, barrier: Arc<CompletionBarrier>) -> Self {
        Self { stores, barrier }
    }

    pub fn stores(&self) -> &Arc<EventStores> {
        &self.stores
    }

    /// Record every event of the batch and signal the barrier once
    ///
    /// Records with an unknown category are skipped with a notice. Duplicate
    /// ids are logged by the store and otherwise ignored. The reply carries
    /// the number of records in the batch.
    pub fn ingest(&self, batch: &RecordBatch) -> RecordReply {
        for record in &batch.items {
            let category = match record.category() {
                Some(category) => category,
                None => {
                    info!("Ignoring events record of type {}", record.category);
                    continue;
                }
            };

            info!("-> Recording {} {} events", record.len(), category);

            let (inserted, duplicates) = self.stores.get(category).record_all(&record.events);
            debug!(
                "Recorded {} {} events ({} duplicates)",
                inserted, category, duplicates
            );
        }

        self.barrier.signal_one();

        RecordReply {
            count: reply_count(batch.items.len()),
        }
    }
}

/// Record count for the reply, saturating at `u32::MAX`
fn reply_count(records: usize) -> u32 {
    u32::try_from(records).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventCategory, EventsRecord, Timestamp};
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;
    use std::time::Duration;
    use tokio::time::timeout;

    fn ts(secs: i64) -> Timestamp {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn endpoint(expected: usize) -> (IngestionEndpoint, Arc<CompletionBarrier>) {
        let barrier = Arc::new(CompletionBarrier::new(expected));
        let endpoint = IngestionEndpoint::new(Arc::new(EventStores::new()), barrier.clone());
        (endpoint, barrier)
    }

    #[test]
    fn test_routes_records_by_category() {
        let (endpoint, barrier) = endpoint(1);
        let batch = RecordBatch::new(vec![
            EventsRecord::new(EventCategory::Sent)
                .with_event("a", ts(1))
                .with_event("b", ts(2)),
            EventsRecord::new(EventCategory::Accepted).with_event("a", ts(3)),
            EventsRecord::new(EventCategory::Received).with_event("a", ts(4)),
        ]);

        let reply = endpoint.ingest(&batch);

        assert_eq!(reply.count, 3);
        assert_eq!(endpoint.stores().sent().len(), 2);
        assert_eq!(endpoint.stores().accepted().get("a"), Some(ts(3)));
        assert_eq!(endpoint.stores().received().get("a"), Some(ts(4)));
        assert_eq!(barrier.signalled(), 1);
    }

    #[test]
    fn test_unknown_category_is_skipped() {
        let mut events = HashMap::new();
        events.insert("x".to_string(), ts(1));
        let batch = RecordBatch::new(vec![
            EventsRecord {
                category: 0,
                events: events.clone(),
            },
            EventsRecord {
                category: 99,
                events,
            },
        ]);

        let (endpoint, barrier) = endpoint(1);
        let reply = endpoint.ingest(&batch);

        assert_eq!(reply.count, 2);
        for category in EventCategory::ALL {
            assert!(endpoint.stores().get(category).is_empty());
        }
        assert_eq!(barrier.signalled(), 1);
    }

    #[test]
    fn test_one_signal_per_batch() {
        let (endpoint, barrier) = endpoint(2);

        endpoint.ingest(&RecordBatch::default());
        endpoint.ingest(&RecordBatch::new(vec![
            EventsRecord::new(EventCategory::Sent).with_event("a", ts(1)),
            EventsRecord::new(EventCategory::Sent).with_event("a", ts(9)),
        ]));

        assert_eq!(barrier.signalled(), 2);
        assert_eq!(endpoint.stores().sent().get("a"), Some(ts(1)));
    }

    #[test]
    fn test_reply_count_saturates() {
        assert_eq!(reply_count(0), 0);
        assert_eq!(reply_count(3), 3);
        assert_eq!(reply_count(u32::MAX as usize), u32::MAX);
        #[cfg(target_pointer_width = "64")]
        assert_eq!(reply_count(u32::MAX as usize + 1), u32::MAX);
    }

    #[tokio::test]
    async fn test_ingest_releases_barrier() {
        let (endpoint, barrier) = endpoint(2);

        let writers: Vec<_> = (0..2)
            .map(|i| {
                let endpoint = endpoint.clone();
                tokio::spawn(async move {
                    let record = EventsRecord::new(EventCategory::Sent)
                        .with_event(format!("m{}", i), ts(i));
                    endpoint.ingest(&RecordBatch::new(vec![record]))
                })
            })
            .collect();

        timeout(Duration::from_secs(1), barrier.await_all())
            .await
            .expect("two batches should release the barrier");

        for writer in writers {
            assert_eq!(writer.await.unwrap().count, 1);
        }
        assert_eq!(endpoint.stores().sent().len(), 2);
    }
}
