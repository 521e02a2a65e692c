use common::OrderId;
use contract::ContractError;
use thiserror::Error;

use crate::repository::StoreError;

/// Errors raised by order saga operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Malformed saga input, rejected synchronously before any state is
    /// created or any event published.
    #[error("invalid order: {0}")]
    Validation(String),

    /// An event referenced an order this participant does not know.
    #[error("order not found: {0}")]
    NotFound(OrderId),

    /// The order store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Publishing or decoding a contract event failed.
    #[error(transparent)]
    Contract(#[from] ContractError),
}
