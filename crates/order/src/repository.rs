use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::OrderId;
use thiserror::Error;

use crate::model::Order;
use crate::status::OrderStatus;

/// Errors raised by the order store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("order not found: {0}")]
    NotFound(OrderId),

    #[error("order store error: {0}")]
    Store(String),
}

/// Outcome of a guarded status transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// The transition was applied; the updated order is returned.
    Applied(Order),

    /// The order was not in a status the transition is legal from. The
    /// first-observed terminal-triggering event stays authoritative; the
    /// caller logs this as an anomaly instead of double-transitioning.
    Rejected { current: OrderStatus },
}

/// Store of orders owned by the order participant.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Persists a new order. The row must exist before `order-created`
    /// is published, so observers of the event can always fetch it.
    async fn insert(&self, order: &Order) -> Result<(), StoreError>;

    /// Loads an order by id.
    async fn get(&self, id: OrderId) -> Result<Option<Order>, StoreError>;

    /// Moves an order to `to` if and only if its current status allows
    /// the transition (optimistic concurrency guard).
    async fn transition(&self, id: OrderId, to: OrderStatus) -> Result<Transition, StoreError>;

    /// Returns PENDING orders created at or before `cutoff`, for the
    /// saga timeout reaper.
    async fn find_pending_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Order>, StoreError>;
}
