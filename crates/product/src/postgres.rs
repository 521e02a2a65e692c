use async_trait::async_trait;
use common::ProductId;
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::ledger::{ProductStock, Result, StockError, StockLedger};

/// Postgres-backed stock ledger.
///
/// `reserve` runs inside a transaction holding a `SELECT … FOR UPDATE`
/// row lock, so concurrent reservations for one product serialize at the
/// database. Targets the `products` table from `migrations/`.
#[derive(Clone)]
pub struct PostgresStockLedger {
    pool: PgPool,
}

impl PostgresStockLedger {
    /// Creates a ledger over an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to the database at `url`.
    pub async fn connect(url: &str) -> std::result::Result<Self, sqlx::Error> {
        let pool = PgPool::connect(url).await?;
        Ok(Self::new(pool))
    }
}

fn store_err(e: sqlx::Error) -> StockError {
    StockError::Store(e.to_string())
}

fn row_to_stock(product_id: ProductId, row: &PgRow) -> Result<ProductStock> {
    Ok(ProductStock {
        product_id,
        available: row.try_get("available").map_err(store_err)?,
        updated_at: row.try_get("updated_at").map_err(store_err)?,
    })
}

#[async_trait]
impl StockLedger for PostgresStockLedger {
    async fn reserve(&self, product_id: ProductId, quantity: u32) -> Result<ProductStock> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        let locked = sqlx::query("SELECT available FROM products WHERE id = $1 FOR UPDATE")
            .bind(product_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(store_err)?
            .ok_or(StockError::ProductNotFound(product_id))?;

        let available: i64 = locked.try_get("available").map_err(store_err)?;
        if available < i64::from(quantity) {
            // Dropping the transaction rolls back and releases the lock.
            return Err(StockError::InsufficientStock {
                product_id,
                available,
                requested: quantity,
            });
        }

        let row = sqlx::query(
            "UPDATE products SET available = available - $1, updated_at = NOW()
             WHERE id = $2
             RETURNING available, updated_at",
        )
        .bind(i64::from(quantity))
        .bind(product_id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(store_err)?;

        tx.commit().await.map_err(store_err)?;
        row_to_stock(product_id, &row)
    }

    async fn release(&self, product_id: ProductId, quantity: u32) -> Result<ProductStock> {
        let row = sqlx::query(
            "UPDATE products SET available = available + $1, updated_at = NOW()
             WHERE id = $2
             RETURNING available, updated_at",
        )
        .bind(i64::from(quantity))
        .bind(product_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?
        .ok_or(StockError::ProductNotFound(product_id))?;

        row_to_stock(product_id, &row)
    }

    async fn get(&self, product_id: ProductId) -> Result<Option<ProductStock>> {
        let row = sqlx::query("SELECT available, updated_at FROM products WHERE id = $1")
            .bind(product_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;

        row.map(|r| row_to_stock(product_id, &r)).transpose()
    }

    async fn set(&self, product_id: ProductId, available: i64) -> Result<ProductStock> {
        let row = sqlx::query(
            "INSERT INTO products (id, available) VALUES ($1, $2)
             ON CONFLICT (id) DO UPDATE SET available = EXCLUDED.available, updated_at = NOW()
             RETURNING available, updated_at",
        )
        .bind(product_id.as_uuid())
        .bind(available)
        .fetch_one(&self.pool)
        .await
        .map_err(store_err)?;

        row_to_stock(product_id, &row)
    }
}
