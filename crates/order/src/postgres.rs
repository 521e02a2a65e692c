use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Money, OrderId, UserId};
use contract::OrderLine;
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::model::Order;
use crate::repository::{OrderRepository, StoreError, Transition};
use crate::status::OrderStatus;

/// Postgres-backed order store targeting the `orders` table from
/// `migrations/`. Line items are stored as JSONB; they are immutable
/// after insert so no per-item rows are needed.
#[derive(Clone)]
pub struct PostgresOrderRepository {
    pool: PgPool,
}

impl PostgresOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn store_err(e: sqlx::Error) -> StoreError {
    StoreError::Store(e.to_string())
}

fn row_to_order(row: &PgRow) -> Result<Order, StoreError> {
    let status: String = row.try_get("status").map_err(store_err)?;
    let items: serde_json::Value = row.try_get("items").map_err(store_err)?;
    let items: Vec<OrderLine> = serde_json::from_value(items)
        .map_err(|e| StoreError::Store(format!("corrupt items column: {e}")))?;

    Ok(Order {
        id: OrderId::from_uuid(row.try_get("id").map_err(store_err)?),
        user_id: UserId::from_uuid(row.try_get("user_id").map_err(store_err)?),
        items,
        total_amount: Money::from_cents(row.try_get("total_amount").map_err(store_err)?),
        status: OrderStatus::parse(&status)
            .ok_or_else(|| StoreError::Store(format!("unknown order status '{status}'")))?,
        created_at: row.try_get("created_at").map_err(store_err)?,
        updated_at: row.try_get("updated_at").map_err(store_err)?,
    })
}

/// Statuses a transition to `to` is legal from, as stored strings.
fn allowed_from(to: OrderStatus) -> Vec<&'static str> {
    match to {
        OrderStatus::Confirmed | OrderStatus::Failed => vec!["PENDING"],
        OrderStatus::Cancelled => vec!["PENDING", "FAILED"],
        OrderStatus::Pending => vec![],
    }
}

const ORDER_COLUMNS: &str = "id, user_id, items, total_amount, status, created_at, updated_at";

#[async_trait]
impl OrderRepository for PostgresOrderRepository {
    async fn insert(&self, order: &Order) -> Result<(), StoreError> {
        let items = serde_json::to_value(&order.items)
            .map_err(|e| StoreError::Store(e.to_string()))?;

        sqlx::query(
            "INSERT INTO orders (id, user_id, items, total_amount, status, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(order.id.as_uuid())
        .bind(order.user_id.as_uuid())
        .bind(items)
        .bind(order.total_amount.cents())
        .bind(order.status.as_str())
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        row.map(|r| row_to_order(&r)).transpose()
    }

    async fn transition(&self, id: OrderId, to: OrderStatus) -> Result<Transition, StoreError> {
        // The guard lives in the WHERE clause, so concurrent writers
        // race on the row atomically rather than read-then-write.
        let row = sqlx::query(&format!(
            "UPDATE orders SET status = $1, updated_at = NOW()
             WHERE id = $2 AND status = ANY($3)
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(to.as_str())
        .bind(id.as_uuid())
        .bind(allowed_from(to))
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        match row {
            Some(row) => Ok(Transition::Applied(row_to_order(&row)?)),
            None => match self.get(id).await? {
                Some(existing) => Ok(Transition::Rejected {
                    current: existing.status,
                }),
                None => Err(StoreError::NotFound(id)),
            },
        }
    }

    async fn find_pending_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Order>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders
             WHERE status = 'PENDING' AND created_at <= $1
             ORDER BY created_at ASC"
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.iter().map(row_to_order).collect()
    }
}
