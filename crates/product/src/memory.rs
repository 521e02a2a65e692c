use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::ProductId;
use tokio::sync::{Mutex, RwLock};

use crate::ledger::{ProductStock, Result, StockError, StockLedger};

/// In-memory stock ledger with one lock per product row.
///
/// Mirrors the row-level locking of the Postgres implementation: two
/// reservations for the same product serialize on that product's mutex,
/// while different products proceed in parallel.
#[derive(Clone, Default)]
pub struct InMemoryStockLedger {
    rows: Arc<RwLock<HashMap<ProductId, Arc<Mutex<i64>>>>>,
}

impl InMemoryStockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    async fn row(&self, product_id: ProductId) -> Option<Arc<Mutex<i64>>> {
        self.rows.read().await.get(&product_id).cloned()
    }
}

#[async_trait]
impl StockLedger for InMemoryStockLedger {
    async fn reserve(&self, product_id: ProductId, quantity: u32) -> Result<ProductStock> {
        let row = self
            .row(product_id)
            .await
            .ok_or(StockError::ProductNotFound(product_id))?;

        let mut available = row.lock().await;
        if *available < i64::from(quantity) {
            return Err(StockError::InsufficientStock {
                product_id,
                available: *available,
                requested: quantity,
            });
        }
        *available -= i64::from(quantity);

        Ok(ProductStock {
            product_id,
            available: *available,
            updated_at: Utc::now(),
        })
    }

    async fn release(&self, product_id: ProductId, quantity: u32) -> Result<ProductStock> {
        let row = self
            .row(product_id)
            .await
            .ok_or(StockError::ProductNotFound(product_id))?;

        let mut available = row.lock().await;
        *available += i64::from(quantity);

        Ok(ProductStock {
            product_id,
            available: *available,
            updated_at: Utc::now(),
        })
    }

    async fn get(&self, product_id: ProductId) -> Result<Option<ProductStock>> {
        match self.row(product_id).await {
            None => Ok(None),
            Some(row) => {
                let available = *row.lock().await;
                Ok(Some(ProductStock {
                    product_id,
                    available,
                    updated_at: Utc::now(),
                }))
            }
        }
    }

    async fn set(&self, product_id: ProductId, available: i64) -> Result<ProductStock> {
        let mut rows = self.rows.write().await;
        rows.insert(product_id, Arc::new(Mutex::new(available)));
        Ok(ProductStock {
            product_id,
            available,
            updated_at: Utc::now(),
        })
    }
}
