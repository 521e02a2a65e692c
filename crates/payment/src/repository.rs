use async_trait::async_trait;
use common::{OrderId, PaymentId};
use contract::PaymentStatus;
use thiserror::Error;

use crate::model::Payment;

/// Errors raised by the payment store.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("payment not found: {0}")]
    NotFound(PaymentId),

    /// The payment is already terminal; status is write-once.
    #[error("payment {id} already finalized as {status}")]
    AlreadyFinalized { id: PaymentId, status: PaymentStatus },

    #[error("payment store error: {0}")]
    Store(String),
}

/// Store of payment capture attempts.
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Persists a new PENDING payment record.
    async fn insert(&self, payment: &Payment) -> Result<(), RepositoryError>;

    /// Moves a PENDING payment to a terminal status, exactly once.
    async fn finalize(
        &self,
        id: PaymentId,
        status: PaymentStatus,
    ) -> Result<Payment, RepositoryError>;

    /// Loads a payment by id.
    async fn get(&self, id: PaymentId) -> Result<Option<Payment>, RepositoryError>;

    /// Loads all capture attempts for an order, oldest first.
    async fn find_by_order(&self, order_id: OrderId) -> Result<Vec<Payment>, RepositoryError>;
}
