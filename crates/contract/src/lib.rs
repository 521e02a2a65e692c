//! The event contract every saga participant publishes and consumes.
//!
//! Choreographed sagas live or die by their event contracts, so instead of
//! string-typed payloads each topic carries a closed tagged union here:
//! [`OrderEvent`], [`ProductEvent`], and [`PaymentEvent`]. Wire names and
//! payload fields are fixed; other services depend on them bit-exactly.
//!
//! Encoding splits an event into its wire tag and data payload for the bus
//! envelope; decoding rebuilds and validates it at the consumer boundary,
//! so an unknown event type or malformed payload is rejected before any
//! handler logic runs.

mod error;
mod events;
mod idempotency;
mod items;
pub mod topics;

pub use error::ContractError;
pub use idempotency::{InMemoryStepLog, StepLog};
pub use events::{
    LifecycleEvent, OrderEvent, PaymentEvent, PaymentStatus, ProductEvent, decode, publish,
};
pub use items::{FailedItem, OrderLine};
