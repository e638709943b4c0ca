//! PostgreSQL-backed payment store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Money, OrderId};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::PaymentError;
use crate::store::{PaymentRecord, PaymentState, PaymentStore};
use crate::Result;

/// Payment records on Postgres.
#[derive(Clone)]
pub struct PostgresPaymentStore {
    pool: PgPool,
}

impl PostgresPaymentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_record(row: &sqlx::postgres::PgRow) -> Result<PaymentRecord> {
        let state_raw: String = row.try_get("state")?;
        let state = PaymentState::parse(&state_raw)
            .ok_or_else(|| PaymentError::Corrupt(format!("unknown state {state_raw:?}")))?;
        let updated_at: DateTime<Utc> = row.try_get("updated_at")?;
        Ok(PaymentRecord {
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            amount: Money::from_cents(row.try_get("amount_cents")?),
            state,
            provider_ref: row.try_get("provider_ref")?,
            reason: row.try_get("reason")?,
            updated_at,
        })
    }
}

#[async_trait]
impl PaymentStore for PostgresPaymentStore {
    async fn upsert_pending(&self, order_id: OrderId, amount: Money) -> Result<PaymentRecord> {
        // First write wins; a settled record is never touched.
        sqlx::query(
            "INSERT INTO payments (order_id, amount_cents, state) \
             VALUES ($1, $2, 'pending') \
             ON CONFLICT (order_id) DO NOTHING",
        )
        .bind(order_id.as_uuid())
        .bind(amount.cents())
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(
            "SELECT order_id, amount_cents, state, provider_ref, reason, updated_at \
             FROM payments WHERE order_id = $1",
        )
        .bind(order_id.as_uuid())
        .fetch_one(&self.pool)
        .await?;
        Self::row_to_record(&row)
    }

    async fn settle(
        &self,
        order_id: OrderId,
        state: PaymentState,
        provider_ref: &str,
        reason: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE payments \
             SET state = $2, provider_ref = $3, reason = $4, updated_at = now() \
             WHERE order_id = $1 AND state = 'pending'",
        )
        .bind(order_id.as_uuid())
        .bind(state.as_str())
        .bind(provider_ref)
        .bind(reason)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, order_id: OrderId) -> Result<Option<PaymentRecord>> {
        let row = sqlx::query(
            "SELECT order_id, amount_cents, state, provider_ref, reason, updated_at \
             FROM payments WHERE order_id = $1",
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_record).transpose()
    }
}
