//! PostgreSQL-backed stock ledger and processed-event ledger.
//!
//! Every mutation runs in one transaction and locks the touched rows with
//! `SELECT ... FOR UPDATE`, so concurrent mutations on the same item
//! serialize while disjoint items proceed in parallel.

use std::collections::BTreeMap;

use async_trait::async_trait;
use common::{BookId, OrderId};
use sqlx::{PgPool, Row};

use crate::error::StockError;
use crate::processed::{Operation, ProcessedLedger};
use crate::store::{StockLevel, StockLine, StockStore};
use crate::Result;

/// Stock ledger on Postgres.
#[derive(Clone)]
pub struct PostgresStockStore {
    pool: PgPool,
}

impl PostgresStockStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }
}

fn validate_lines(lines: &[StockLine]) -> Result<()> {
    for line in lines {
        if line.qty <= 0 {
            return Err(StockError::InvalidQuantity {
                book_id: line.book_id,
                qty: line.qty,
            });
        }
    }
    Ok(())
}

#[async_trait]
impl StockStore for PostgresStockStore {
    async fn reserve(&self, lines: &[StockLine]) -> Result<()> {
        validate_lines(lines)?;
        let mut tx = self.pool.begin().await?;

        // Lock and validate every row before applying any hold.
        for line in lines {
            let row = sqlx::query(
                "SELECT total_qty, reserved_qty FROM stock WHERE book_id = $1 FOR UPDATE",
            )
            .bind(line.book_id.as_i64())
            .fetch_optional(&mut *tx)
            .await?;

            let Some(row) = row else {
                return Err(StockError::NoSuchItem {
                    book_id: line.book_id,
                });
            };
            let total: i64 = row.try_get("total_qty")?;
            let reserved: i64 = row.try_get("reserved_qty")?;
            let available = (total - reserved).max(0);
            if available < line.qty {
                return Err(StockError::InsufficientStock {
                    book_id: line.book_id,
                    needed: line.qty,
                    available,
                });
            }
        }

        for line in lines {
            sqlx::query(
                "UPDATE stock SET reserved_qty = reserved_qty + $1, updated_at = now() \
                 WHERE book_id = $2",
            )
            .bind(line.qty)
            .bind(line.book_id.as_i64())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn confirm(&self, lines: &[StockLine]) -> Result<()> {
        validate_lines(lines)?;
        let mut tx = self.pool.begin().await?;
        for line in lines {
            let result = sqlx::query(
                "UPDATE stock SET total_qty = total_qty - $1, \
                 reserved_qty = reserved_qty - $1, updated_at = now() \
                 WHERE book_id = $2",
            )
            .bind(line.qty)
            .bind(line.book_id.as_i64())
            .execute(&mut *tx)
            .await?;
            if result.rows_affected() == 0 {
                return Err(StockError::NoSuchItem {
                    book_id: line.book_id,
                });
            }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn release(&self, lines: &[StockLine]) -> Result<()> {
        validate_lines(lines)?;
        let mut tx = self.pool.begin().await?;
        for line in lines {
            // GREATEST floors the counter at zero on over-release.
            let result = sqlx::query(
                "UPDATE stock SET reserved_qty = GREATEST(reserved_qty - $1, 0), \
                 updated_at = now() WHERE book_id = $2",
            )
            .bind(line.qty)
            .bind(line.book_id.as_i64())
            .execute(&mut *tx)
            .await?;
            if result.rows_affected() == 0 {
                return Err(StockError::NoSuchItem {
                    book_id: line.book_id,
                });
            }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn availability(&self, ids: &[BookId]) -> Result<BTreeMap<BookId, i64>> {
        let rows = if ids.is_empty() {
            sqlx::query("SELECT book_id, total_qty, reserved_qty FROM stock")
                .fetch_all(&self.pool)
                .await?
        } else {
            let raw: Vec<i64> = ids.iter().map(|id| id.as_i64()).collect();
            sqlx::query(
                "SELECT book_id, total_qty, reserved_qty FROM stock \
                 WHERE book_id = ANY($1)",
            )
            .bind(&raw)
            .fetch_all(&self.pool)
            .await?
        };

        let mut out = BTreeMap::new();
        for row in rows {
            let id: i64 = row.try_get("book_id")?;
            let total: i64 = row.try_get("total_qty")?;
            let reserved: i64 = row.try_get("reserved_qty")?;
            out.insert(BookId::new(id), (total - reserved).max(0));
        }
        Ok(out)
    }

    async fn level(&self, book_id: BookId) -> Result<Option<StockLevel>> {
        let row = sqlx::query("SELECT total_qty, reserved_qty FROM stock WHERE book_id = $1")
            .bind(book_id.as_i64())
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(StockLevel {
                total_qty: row.try_get("total_qty")?,
                reserved_qty: row.try_get("reserved_qty")?,
            })),
            None => Ok(None),
        }
    }

    async fn seed(&self, rows: &[(BookId, i64)]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for (book_id, total_qty) in rows {
            sqlx::query(
                "INSERT INTO stock (book_id, total_qty, reserved_qty) \
                 VALUES ($1, $2, 0) ON CONFLICT (book_id) DO NOTHING",
            )
            .bind(book_id.as_i64())
            .bind(*total_qty)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

/// Processed-event ledger on Postgres.
///
/// Claiming is an `INSERT ... ON CONFLICT DO NOTHING`; zero rows affected
/// means another delivery already applied the operation.
#[derive(Clone)]
pub struct PostgresProcessedLedger {
    pool: PgPool,
}

impl PostgresProcessedLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProcessedLedger for PostgresProcessedLedger {
    async fn claim(&self, order_id: OrderId, op: Operation) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO processed_events (order_id, operation) VALUES ($1, $2) \
             ON CONFLICT (order_id, operation) DO NOTHING",
        )
        .bind(order_id.as_uuid())
        .bind(op.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn unclaim(&self, order_id: OrderId, op: Operation) -> Result<()> {
        sqlx::query("DELETE FROM processed_events WHERE order_id = $1 AND operation = $2")
            .bind(order_id.as_uuid())
            .bind(op.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn was_claimed(&self, order_id: OrderId, op: Operation) -> Result<bool> {
        let row = sqlx::query(
            "SELECT 1 FROM processed_events WHERE order_id = $1 AND operation = $2",
        )
        .bind(order_id.as_uuid())
        .bind(op.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }
}
