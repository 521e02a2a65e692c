use async_trait::async_trait;
use common::{Money, OrderId, PaymentId, UserId};
use contract::PaymentStatus;
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::model::{Payment, PaymentMethod};
use crate::repository::{PaymentRepository, RepositoryError};

/// Postgres-backed payment store targeting the `payments` table from
/// `migrations/`.
#[derive(Clone)]
pub struct PostgresPaymentRepository {
    pool: PgPool,
}

impl PostgresPaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn store_err(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Store(e.to_string())
}

fn parse_status(s: &str) -> Result<PaymentStatus, RepositoryError> {
    match s {
        "PENDING" => Ok(PaymentStatus::Pending),
        "COMPLETED" => Ok(PaymentStatus::Completed),
        "FAILED" => Ok(PaymentStatus::Failed),
        other => Err(RepositoryError::Store(format!(
            "unknown payment status '{other}'"
        ))),
    }
}

fn parse_method(s: &str) -> Result<PaymentMethod, RepositoryError> {
    match s {
        "CREDIT_CARD" => Ok(PaymentMethod::CreditCard),
        "DEBIT_CARD" => Ok(PaymentMethod::DebitCard),
        "BANK_TRANSFER" => Ok(PaymentMethod::BankTransfer),
        other => Err(RepositoryError::Store(format!(
            "unknown payment method '{other}'"
        ))),
    }
}

fn row_to_payment(row: &PgRow) -> Result<Payment, RepositoryError> {
    let status: String = row.try_get("status").map_err(store_err)?;
    let method: String = row.try_get("method").map_err(store_err)?;
    Ok(Payment {
        id: PaymentId::from_uuid(row.try_get("id").map_err(store_err)?),
        order_id: OrderId::from_uuid(row.try_get("order_id").map_err(store_err)?),
        user_id: UserId::from_uuid(row.try_get("user_id").map_err(store_err)?),
        amount: Money::from_cents(row.try_get("amount").map_err(store_err)?),
        method: parse_method(&method)?,
        status: parse_status(&status)?,
        created_at: row.try_get("created_at").map_err(store_err)?,
        updated_at: row.try_get("updated_at").map_err(store_err)?,
    })
}

#[async_trait]
impl PaymentRepository for PostgresPaymentRepository {
    async fn insert(&self, payment: &Payment) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO payments (id, order_id, user_id, amount, method, status, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(payment.id.as_uuid())
        .bind(payment.order_id.as_uuid())
        .bind(payment.user_id.as_uuid())
        .bind(payment.amount.cents())
        .bind(payment.method.as_str())
        .bind(payment.status.as_str())
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn finalize(
        &self,
        id: PaymentId,
        status: PaymentStatus,
    ) -> Result<Payment, RepositoryError> {
        // Guard in SQL: only a PENDING row can be finalized.
        let row = sqlx::query(
            "UPDATE payments SET status = $1, updated_at = NOW()
             WHERE id = $2 AND status = 'PENDING'
             RETURNING id, order_id, user_id, amount, method, status, created_at, updated_at",
        )
        .bind(status.as_str())
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        match row {
            Some(row) => row_to_payment(&row),
            None => match self.get(id).await? {
                Some(existing) => Err(RepositoryError::AlreadyFinalized {
                    id,
                    status: existing.status,
                }),
                None => Err(RepositoryError::NotFound(id)),
            },
        }
    }

    async fn get(&self, id: PaymentId) -> Result<Option<Payment>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, order_id, user_id, amount, method, status, created_at, updated_at
             FROM payments WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        row.map(|r| row_to_payment(&r)).transpose()
    }

    async fn find_by_order(&self, order_id: OrderId) -> Result<Vec<Payment>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, order_id, user_id, amount, method, status, created_at, updated_at
             FROM payments WHERE order_id = $1 ORDER BY created_at ASC",
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.iter().map(row_to_payment).collect()
    }
}
