use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::envelope::EventEnvelope;

/// Errors raised by bus operations themselves (not by handlers).
#[derive(Debug, Error)]
pub enum BusError {
    /// The bus has been shut down and no longer accepts messages.
    #[error("event bus is closed")]
    Closed,

    /// A payload could not be serialized for publishing.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience alias for bus results.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors a handler reports back to the consumer loop.
///
/// The distinction drives the redelivery policy: a malformed message will
/// never decode successfully, so it goes straight to the dead-letter topic,
/// while a transient failure is retried with backoff first.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The message cannot be decoded or violates the event contract.
    /// Never retried.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// The handler failed transiently and the delivery should be retried.
    #[error("handler failed: {0}")]
    Retryable(String),
}

impl HandlerError {
    /// Returns true if redelivery could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, HandlerError::Retryable(_))
    }
}

/// A message as seen by a consumer, with its routing metadata.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Topic the message was published to.
    pub topic: String,

    /// Partition the key hashed to.
    pub partition: usize,

    /// The message itself.
    pub envelope: EventEnvelope,
}

/// Consumes deliveries for one consumer group.
///
/// A delivery is acknowledged only after `handle` returns, so a slow
/// handler backpressures its own partition but never blocks other
/// partitions' consumers.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, delivery: &Delivery) -> std::result::Result<(), HandlerError>;
}

/// Partitioned, at-least-once publish/subscribe channel.
///
/// Messages sharing a key are delivered in publish order within a consumer
/// group. Distinct groups each receive their own full copy of every
/// message; instances sharing a group share the work.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publishes a keyed event to a topic.
    async fn publish(&self, topic: &str, key: &str, event_type: &str, payload: Value)
    -> Result<()>;

    /// Registers a handler for a topic under a consumer group.
    ///
    /// Only messages published after the subscription are delivered.
    async fn subscribe(&self, topic: &str, group: &str, handler: Arc<dyn EventHandler>)
    -> Result<()>;
}
