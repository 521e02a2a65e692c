use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::ProductId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by stock ledger operations.
#[derive(Debug, Error)]
pub enum StockError {
    /// No stock row exists for the product.
    #[error("product not found: {0}")]
    ProductNotFound(ProductId),

    /// Available quantity is below the requested reservation.
    #[error("insufficient stock for product {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: ProductId,
        available: i64,
        requested: u32,
    },

    /// The backing store failed.
    #[error("stock store error: {0}")]
    Store(String),
}

impl StockError {
    /// Returns true if retrying the same call could succeed, i.e. the
    /// failure came from the store rather than from the stock itself.
    pub fn is_transient(&self) -> bool {
        matches!(self, StockError::Store(_))
    }
}

/// Convenience alias for ledger results.
pub type Result<T> = std::result::Result<T, StockError>;

/// A product's stock row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductStock {
    pub product_id: ProductId,
    /// Units available for reservation. Never negative.
    pub available: i64,
    pub updated_at: DateTime<Utc>,
}

/// Transactional per-product stock counter.
///
/// Reserve and release are the only mutation paths; each serializes on a
/// single product row for the duration of the statement, so concurrent
/// reservations against the same product can never drive `available`
/// negative. No lock ever spans more than one row: multi-item orders are
/// reserved item by item and rolled back item by item on failure.
#[async_trait]
pub trait StockLedger: Send + Sync {
    /// Atomically decrements `available` by `quantity` if sufficient.
    async fn reserve(&self, product_id: ProductId, quantity: u32) -> Result<ProductStock>;

    /// Atomically increments `available` by `quantity`.
    ///
    /// Used for compensation, so it succeeds whenever the product row
    /// exists; no matching reservation record is required.
    async fn release(&self, product_id: ProductId, quantity: u32) -> Result<ProductStock>;

    /// Reads a stock row.
    async fn get(&self, product_id: ProductId) -> Result<Option<ProductStock>>;

    /// Creates or replaces a stock row. Seeding only; saga handlers must
    /// never call this.
    async fn set(&self, product_id: ProductId, available: i64) -> Result<ProductStock>;
}
