//! # Event Data Model
//!
//! Types exchanged between test workers and the aggregator. A worker reports
//! lifecycle events for the messages it handled, grouped per category, and
//! ships them as a [`RecordBatch`] in a single ingestion call.
//!
//! The category travels on the wire as a raw integer code so that batches
//! produced by newer or misconfigured workers still decode; unknown codes are
//! skipped at ingestion time rather than failing the whole call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Unique identifier of one logical message under test
pub type MessageId = String;

/// Instant at which a lifecycle event was observed
pub type Timestamp = DateTime<Utc>;

/// Lifecycle stage of a message under test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventCategory {
    /// The worker handed the message to the system under test
    Sent,
    /// The system under test acknowledged the message
    Accepted,
    /// The message arrived at its destination
    Received,
}

impl EventCategory {
    /// All categories, in correlation order
    pub const ALL: [EventCategory; 3] = [
        EventCategory::Sent,
        EventCategory::Accepted,
        EventCategory::Received,
    ];

    /// Wire code for this category
    pub fn code(self) -> i32 {
        match self {
            EventCategory::Sent => 1,
            EventCategory::Accepted => 2,
            EventCategory::Received => 3,
        }
    }

    /// Map a wire code back to a category. Code 0 is reserved for "unknown".
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(EventCategory::Sent),
            2 => Some(EventCategory::Accepted),
            3 => Some(EventCategory::Received),
            _ => None,
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventCategory::Sent => write!(f, "SENT"),
            EventCategory::Accepted => write!(f, "ACCEPTED"),
            EventCategory::Received => write!(f, "RECEIVED"),
        }
    }
}

/// A set of events of one category, keyed by message identifier
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventsRecord {
    /// Raw category code, see [`EventCategory::code`]
    pub category: i32,
    pub events: HashMap<MessageId, Timestamp>,
}

impl EventsRecord {
    /// Create an empty record for a known category
    pub fn new(category: EventCategory) -> Self {
        Self {
            category: category.code(),
            events: HashMap::new(),
        }
    }

    /// Builder-style insert, handy for workers assembling a record
    pub fn with_event(mut self, id: impl Into<MessageId>, timestamp: Timestamp) -> Self {
        self.events.insert(id.into(), timestamp);
        self
    }

    /// Decoded category, `None` when the code is not one of the known ones
    pub fn category(&self) -> Option<EventCategory> {
        EventCategory::from_code(self.category)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Payload of one ingestion call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordBatch {
    pub items: Vec<EventsRecord>,
}

impl RecordBatch {
    pub fn new(items: Vec<EventsRecord>) -> Self {
        Self { items }
    }

    /// Total number of individual events across all records
    pub fn event_count(&self) -> usize {
        self.items.iter().map(EventsRecord::len).sum()
    }
}

/// Acknowledgement returned for every ingested batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordReply {
    /// Number of records (items) contained in the batch
    pub count: u32,
}
