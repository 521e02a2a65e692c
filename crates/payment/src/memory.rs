use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{OrderId, PaymentId};
use contract::PaymentStatus;
use tokio::sync::RwLock;

use crate::model::Payment;
use crate::repository::{PaymentRepository, RepositoryError};

/// In-memory payment store for tests and the demo wiring.
#[derive(Clone, Default)]
pub struct InMemoryPaymentRepository {
    payments: Arc<RwLock<HashMap<PaymentId, Payment>>>,
}

impl InMemoryPaymentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of payment records.
    pub async fn count(&self) -> usize {
        self.payments.read().await.len()
    }
}

#[async_trait]
impl PaymentRepository for InMemoryPaymentRepository {
    async fn insert(&self, payment: &Payment) -> Result<(), RepositoryError> {
        self.payments
            .write()
            .await
            .insert(payment.id, payment.clone());
        Ok(())
    }

    async fn finalize(
        &self,
        id: PaymentId,
        status: PaymentStatus,
    ) -> Result<Payment, RepositoryError> {
        let mut payments = self.payments.write().await;
        let payment = payments.get_mut(&id).ok_or(RepositoryError::NotFound(id))?;

        if payment.status != PaymentStatus::Pending {
            return Err(RepositoryError::AlreadyFinalized {
                id,
                status: payment.status,
            });
        }

        payment.status = status;
        payment.updated_at = Utc::now();
        Ok(payment.clone())
    }

    async fn get(&self, id: PaymentId) -> Result<Option<Payment>, RepositoryError> {
        Ok(self.payments.read().await.get(&id).cloned())
    }

    async fn find_by_order(&self, order_id: OrderId) -> Result<Vec<Payment>, RepositoryError> {
        let payments = self.payments.read().await;
        let mut found: Vec<Payment> = payments
            .values()
            .filter(|p| p.order_id == order_id)
            .cloned()
            .collect();
        found.sort_by_key(|p| p.created_at);
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PaymentMethod;
    use common::{Money, UserId};

    fn pending_payment() -> Payment {
        Payment::pending(
            OrderId::new(),
            UserId::new(),
            Money::from_cents(2500),
            PaymentMethod::CreditCard,
        )
    }

    #[tokio::test]
    async fn insert_and_finalize() {
        let repo = InMemoryPaymentRepository::new();
        let payment = pending_payment();
        repo.insert(&payment).await.unwrap();

        let finalized = repo
            .finalize(payment.id, PaymentStatus::Completed)
            .await
            .unwrap();
        assert_eq!(finalized.status, PaymentStatus::Completed);
        assert!(finalized.updated_at >= finalized.created_at);
    }

    #[tokio::test]
    async fn finalize_is_write_once() {
        let repo = InMemoryPaymentRepository::new();
        let payment = pending_payment();
        repo.insert(&payment).await.unwrap();
        repo.finalize(payment.id, PaymentStatus::Failed)
            .await
            .unwrap();

        let err = repo
            .finalize(payment.id, PaymentStatus::Completed)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::AlreadyFinalized { .. }));

        let stored = repo.get(payment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Failed);
    }

    #[tokio::test]
    async fn find_by_order_returns_attempts_in_order() {
        let repo = InMemoryPaymentRepository::new();
        let order_id = OrderId::new();
        let mut first = pending_payment();
        first.order_id = order_id;
        let mut second = pending_payment();
        second.order_id = order_id;
        second.created_at = first.created_at + chrono::Duration::seconds(1);

        repo.insert(&second).await.unwrap();
        repo.insert(&first).await.unwrap();

        let found = repo.find_by_order(order_id).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id, first.id);
    }
}
