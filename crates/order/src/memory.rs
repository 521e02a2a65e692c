use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::OrderId;
use tokio::sync::RwLock;

use crate::model::Order;
use crate::repository::{OrderRepository, StoreError, Transition};
use crate::status::OrderStatus;

/// In-memory order store for tests and the demo wiring.
#[derive(Clone, Default)]
pub struct InMemoryOrderRepository {
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored orders.
    pub async fn count(&self) -> usize {
        self.orders.read().await.len()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn insert(&self, order: &Order) -> Result<(), StoreError> {
        self.orders.write().await.insert(order.id, order.clone());
        Ok(())
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn transition(&self, id: OrderId, to: OrderStatus) -> Result<Transition, StoreError> {
        let mut orders = self.orders.write().await;
        let order = orders.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        if !order.status.can_transition_to(to) {
            return Ok(Transition::Rejected {
                current: order.status,
            });
        }

        order.status = to;
        order.updated_at = Utc::now();
        Ok(Transition::Applied(order.clone()))
    }

    async fn find_pending_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Order>, StoreError> {
        let orders = self.orders.read().await;
        let mut pending: Vec<Order> = orders
            .values()
            .filter(|o| o.status == OrderStatus::Pending && o.created_at <= cutoff)
            .cloned()
            .collect();
        pending.sort_by_key(|o| o.created_at);
        Ok(pending)
    }
}
