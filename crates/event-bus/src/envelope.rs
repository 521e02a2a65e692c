use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single message on the bus.
///
/// The payload is carried as raw JSON; consumers decode it into the typed
/// event contract at their boundary. The key selects the partition, which
/// is what orders delivery: every order-lifecycle event uses the order id
/// as its key so one order's events are never reordered within a group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// String tag identifying the event (e.g. `"order-created"`).
    pub event_type: String,

    /// Partition key. The order id for all order-lifecycle events.
    pub key: String,

    /// Event-specific payload.
    pub payload: Value,

    /// When the event was published.
    pub timestamp: DateTime<Utc>,
}

impl EventEnvelope {
    /// Creates an envelope stamped with the current time.
    pub fn new(event_type: impl Into<String>, key: impl Into<String>, payload: Value) -> Self {
        Self {
            event_type: event_type.into(),
            key: key.into(),
            payload,
            timestamp: Utc::now(),
        }
    }
}
