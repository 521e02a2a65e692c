//! Order participant: the aggregate that owns the saga's lifecycle.
//!
//! The saga is choreographed. This crate never calls the product or
//! payment services; it creates the order, publishes `order-created`, and
//! then reacts to the events those participants publish, advancing the
//! order's status or triggering compensation until a terminal status is
//! reached.
//!
//! Status writes are guarded twice: an optimistic check that the order is
//! still in a state the transition is legal from, and a per-(order, step)
//! idempotency mark recorded before any effect, so at-least-once delivery
//! cannot double-transition an order.

mod error;
mod memory;
mod model;
mod postgres;
mod reaper;
mod repository;
mod saga;
mod status;

pub use error::OrderError;
pub use memory::InMemoryOrderRepository;
pub use model::Order;
pub use postgres::PostgresOrderRepository;
pub use reaper::PendingOrderReaper;
pub use repository::{OrderRepository, StoreError, Transition};
pub use saga::{CONSUMER_GROUP, OrderSaga};
pub use status::OrderStatus;
