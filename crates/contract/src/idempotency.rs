use std::collections::HashSet;
use std::sync::Mutex;

use common::OrderId;

/// Records which saga steps have already been applied for an order.
///
/// Delivery is at-least-once, so every participant marks a step *before*
/// applying its effect; a redelivered message then observes the mark and
/// is skipped instead of double-reserving stock or double-transitioning
/// an order.
pub trait StepLog: Send + Sync {
    /// Marks `(order_id, step)` as applied. Returns `false` if the step
    /// was already marked, meaning the caller holds a duplicate delivery.
    fn begin(&self, order_id: OrderId, step: &str) -> bool;

    /// Returns true if the step has been marked for this order.
    fn seen(&self, order_id: OrderId, step: &str) -> bool;
}

/// Process-local step log.
///
/// A deployment spanning multiple instances of one service would back
/// this with the service's own database; the trait seam is what matters
/// to the saga logic.
#[derive(Debug, Default)]
pub struct InMemoryStepLog {
    applied: Mutex<HashSet<(OrderId, String)>>,
}

impl InMemoryStepLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StepLog for InMemoryStepLog {
    fn begin(&self, order_id: OrderId, step: &str) -> bool {
        self.applied
            .lock()
            .unwrap()
            .insert((order_id, step.to_string()))
    }

    fn seen(&self, order_id: OrderId, step: &str) -> bool {
        self.applied
            .lock()
            .unwrap()
            .contains(&(order_id, step.to_string()))
    }
}
