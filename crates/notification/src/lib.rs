//! Notification participant: a read-only observer of the saga.
//!
//! Subscribes to every topic under its own consumer group and turns
//! lifecycle events into user-facing messages. It owns no saga state and
//! publishes nothing, so delivery problems here never affect the saga's
//! outcome.

mod dispatcher;
mod notifier;

pub use dispatcher::{CONSUMER_GROUP, NotificationDispatcher};
pub use notifier::{LogNotifier, Notifier, RecordingNotifier};
