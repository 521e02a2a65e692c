use chrono::{DateTime, Utc};
use common::{Money, OrderId, UserId};
use contract::OrderLine;
use serde::{Deserialize, Serialize};

use crate::status::OrderStatus;

/// An order as persisted by the order participant.
///
/// Line items and total amount are immutable once created; the total is
/// fixed at creation and never recomputed from the items afterwards.
/// Status (and its timestamp) is the only field the saga mutates, and the
/// saga never deletes an order: cancellation is a status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub items: Vec<OrderLine>,
    pub total_amount: Money,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Creates a new PENDING order.
    pub fn new(user_id: UserId, items: Vec<OrderLine>, total_amount: Money) -> Self {
        let now = Utc::now();
        Self {
            id: OrderId::new(),
            user_id,
            items,
            total_amount,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::ProductId;

    #[test]
    fn new_order_starts_pending() {
        let order = Order::new(
            UserId::new(),
            vec![OrderLine::new(ProductId::new(), 2, Money::from_cents(1000))],
            Money::from_cents(2000),
        );
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total_amount, Money::from_cents(2000));
        assert_eq!(order.created_at, order.updated_at);
    }
}
