//! # Event Stores
//!
//! One deduplicating map per [`EventCategory`]. Each store owns its own lock,
//! so writers of different categories never contend with each other. The lock
//! is taken for a single insert-or-reject check, never for a whole batch.
//!
//! Reads through [`EventStore::snapshot`] and [`EventStore::timestamps`] are
//! meant for the analysis phase, after the completion barrier has released
//! and every writer is done.

use crate::events::{EventCategory, MessageId, Timestamp};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::warn;

/// Result of a single [`EventStore::record`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Inserted,
    /// The id was already present; the first timestamp was kept
    Duplicate,
}

/// Thread-safe, first-write-wins map from message id to timestamp
#[derive(Debug)]
pub struct EventStore {
    category: EventCategory,
    events: Mutex<HashMap<MessageId, Timestamp>>,
}

impl EventStore {
    /// Create an empty store for a category
    pub fn new(category: EventCategory) -> Self {
        Self {
            category,
            events: Mutex::new(HashMap::new()),
        }
    }

    pub fn category(&self) -> EventCategory {
        self.category
    }

    /// Record one event. A later write for an existing id is rejected.
    pub fn record(&self, id: &str, timestamp: Timestamp) -> RecordOutcome {
        let mut events = self.events.lock();
        if events.contains_key(id) {
            return RecordOutcome::Duplicate;
        }
        events.insert(id.to_owned(), timestamp);
        RecordOutcome::Inserted
    }

    /// Record every event of a map, logging each duplicate
    ///
    /// Returns `(inserted, duplicates)`.
    pub fn record_all<'a, I>(&self, events: I) -> (usize, usize)
    where
        I: IntoIterator<Item = (&'a MessageId, &'a Timestamp)>,
    {
        let mut inserted = 0;
        let mut duplicates = 0;

        for (id, timestamp) in events {
            match self.record(id, *timestamp) {
                RecordOutcome::Inserted => inserted += 1,
                RecordOutcome::Duplicate => {
                    warn!("!! Found duplicate {} event ID {}", self.category, id);
                    duplicates += 1;
                }
            }
        }

        (inserted, duplicates)
    }

    /// Timestamp recorded for an id
    pub fn get(&self, id: &str) -> Option<Timestamp> {
        self.events.lock().get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Copy of the recorded events
    pub fn snapshot(&self) -> HashMap<MessageId, Timestamp> {
        self.events.lock().clone()
    }

    /// All recorded timestamps, sorted ascending
    pub fn timestamps(&self) -> Vec<Timestamp> {
        let mut values: Vec<Timestamp> = self.events.lock().values().copied().collect();
        values.sort();
        values
    }
}

/// The three per-category stores of a run
#[derive(Debug)]
pub struct EventStores {
    sent: EventStore,
    accepted: EventStore,
    received: EventStore,
}

impl Default for EventStores {
    fn default() -> Self {
        Self::new()
    }
}

impl EventStores {
    pub fn new() -> Self {
        Self {
            sent: EventStore::new(EventCategory::Sent),
            accepted: EventStore::new(EventCategory::Accepted),
            received: EventStore::new(EventCategory::Received),
        }
    }

    /// Store holding events of the given category
    pub fn get(&self, category: EventCategory) -> &EventStore {
        match category {
            EventCategory::Sent => &self.sent,
            EventCategory::Accepted => &self.accepted,
            EventCategory::Received => &self.received,
        }
    }

    pub fn sent(&self) -> &EventStore {
        &self.sent
    }

    pub fn accepted(&self) -> &EventStore {
        &self.accepted
    }

    pub fn received(&self) -> &EventStore {
        &self.received
    }
}
