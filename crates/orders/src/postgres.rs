//! PostgreSQL-backed order ledger.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{BookId, Money, OrderId, UserId};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::OrderError;
use crate::model::{Order, OrderItem};
use crate::status::OrderStatus;
use crate::store::{OrderStore, UpdateOutcome};
use crate::Result;

/// Order ledger on Postgres.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    async fn load_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>> {
        let rows = sqlx::query(
            "SELECT book_id, title, qty, unit_cents, line_cents \
             FROM order_items WHERE order_id = $1 ORDER BY id",
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            items.push(OrderItem {
                book_id: BookId::new(row.try_get("book_id")?),
                title: row.try_get("title")?,
                qty: row.try_get("qty")?,
                unit_price: Money::from_cents(row.try_get("unit_cents")?),
                line_total: Money::from_cents(row.try_get("line_cents")?),
            });
        }
        Ok(items)
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn insert(&self, order: &Order) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO orders (id, user_id, status, total_cents, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(order.id.as_uuid())
        .bind(order.user_id.as_uuid())
        .bind(order.status.as_str())
        .bind(order.total.cents())
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?;

        for item in &order.items {
            sqlx::query(
                "INSERT INTO order_items (order_id, book_id, title, qty, unit_cents, line_cents) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(order.id.as_uuid())
            .bind(item.book_id.as_i64())
            .bind(&item.title)
            .bind(item.qty)
            .bind(item.unit_price.cents())
            .bind(item.line_total.cents())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, order_id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(
            "SELECT id, user_id, status, total_cents, created_at, updated_at \
             FROM orders WHERE id = $1",
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let status_raw: String = row.try_get("status")?;
        let status = OrderStatus::parse(&status_raw)
            .ok_or_else(|| OrderError::Corrupt(format!("unknown status {status_raw:?}")))?;
        let created_at: DateTime<Utc> = row.try_get("created_at")?;
        let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

        Ok(Some(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            status,
            total: Money::from_cents(row.try_get("total_cents")?),
            created_at,
            updated_at,
            items: self.load_items(order_id).await?,
        }))
    }

    async fn update_status(
        &self,
        order_id: OrderId,
        status: OrderStatus,
    ) -> Result<UpdateOutcome> {
        // `created` is the only non-terminal status, so guarding on it
        // makes the terminal check and the write one atomic statement.
        let result = sqlx::query(
            "UPDATE orders SET status = $1, updated_at = now() \
             WHERE id = $2 AND status = 'created'",
        )
        .bind(status.as_str())
        .bind(order_id.as_uuid())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(UpdateOutcome::Applied);
        }

        let row = sqlx::query("SELECT status FROM orders WHERE id = $1")
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Err(OrderError::NotFound(order_id));
        };
        let status_raw: String = row.try_get("status")?;
        let current = OrderStatus::parse(&status_raw)
            .ok_or_else(|| OrderError::Corrupt(format!("unknown status {status_raw:?}")))?;
        Ok(UpdateOutcome::AlreadyTerminal(current))
    }
}
