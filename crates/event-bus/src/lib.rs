//! Event bus contract for the choreographed order saga.
//!
//! The saga participants never talk to each other directly; they exchange
//! keyed messages over named topics. The bus guarantees at-least-once
//! delivery per consumer group and in-order delivery for messages sharing
//! a partition key. Nothing stronger is assumed anywhere: no exactly-once,
//! no ordering across keys or topics.
//!
//! [`InMemoryEventBus`] is the in-process implementation used by the tests
//! and the demo binary; a broker-backed implementation would plug in behind
//! the same [`EventBus`] trait.

mod bus;
mod envelope;
mod memory;
mod retry;

pub use bus::{BusError, Delivery, EventBus, EventHandler, HandlerError, Result};
pub use envelope::EventEnvelope;
pub use memory::{DEAD_LETTER_TOPIC, InMemoryEventBus};
pub use retry::RetryPolicy;
