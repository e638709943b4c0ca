use std::collections::BTreeMap;

use async_trait::async_trait;
use common::BookId;
use tokio::sync::Mutex;

use crate::error::StockError;
use crate::store::{StockLevel, StockLine, StockStore};
use crate::Result;

#[derive(Debug, Clone, Copy)]
struct StockRow {
    total_qty: i64,
    reserved_qty: i64,
}

/// In-memory stock ledger.
///
/// A single mutex over the whole table gives the single-writer-at-a-time
/// discipline explicitly: every mutation holds the lock across its
/// check-then-write, so concurrent reserves serialize exactly as the
/// Postgres row locks do.
#[derive(Default)]
pub struct MemoryStockStore {
    table: Mutex<BTreeMap<BookId, StockRow>>,
}

impl MemoryStockStore {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
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
impl StockStore for MemoryStockStore {
    async fn reserve(&self, lines: &[StockLine]) -> Result<()> {
        validate_lines(lines)?;
        let mut table = self.table.lock().await;

        // First pass: validate every line before touching any row.
        for line in lines {
            let row = table
                .get(&line.book_id)
                .ok_or(StockError::NoSuchItem {
                    book_id: line.book_id,
                })?;
            let available = (row.total_qty - row.reserved_qty).max(0);
            if available < line.qty {
                return Err(StockError::InsufficientStock {
                    book_id: line.book_id,
                    needed: line.qty,
                    available,
                });
            }
        }

        // Second pass: apply the holds.
        for line in lines {
            if let Some(row) = table.get_mut(&line.book_id) {
                row.reserved_qty += line.qty;
            }
        }
        Ok(())
    }

    async fn confirm(&self, lines: &[StockLine]) -> Result<()> {
        validate_lines(lines)?;
        let mut table = self.table.lock().await;
        for line in lines {
            let row = table
                .get_mut(&line.book_id)
                .ok_or(StockError::NoSuchItem {
                    book_id: line.book_id,
                })?;
            row.total_qty -= line.qty;
            row.reserved_qty -= line.qty;
        }
        Ok(())
    }

    async fn release(&self, lines: &[StockLine]) -> Result<()> {
        validate_lines(lines)?;
        let mut table = self.table.lock().await;
        for line in lines {
            let row = table
                .get_mut(&line.book_id)
                .ok_or(StockError::NoSuchItem {
                    book_id: line.book_id,
                })?;
            // Floor at zero: releasing more than is reserved clamps
            // instead of driving the counter negative.
            row.reserved_qty = (row.reserved_qty - line.qty).max(0);
        }
        Ok(())
    }

    async fn availability(&self, ids: &[BookId]) -> Result<BTreeMap<BookId, i64>> {
        let table = self.table.lock().await;
        let mut out = BTreeMap::new();
        if ids.is_empty() {
            for (id, row) in table.iter() {
                out.insert(*id, (row.total_qty - row.reserved_qty).max(0));
            }
        } else {
            for id in ids {
                if let Some(row) = table.get(id) {
                    out.insert(*id, (row.total_qty - row.reserved_qty).max(0));
                }
            }
        }
        Ok(out)
    }

    async fn level(&self, book_id: BookId) -> Result<Option<StockLevel>> {
        let table = self.table.lock().await;
        Ok(table.get(&book_id).map(|row| StockLevel {
            total_qty: row.total_qty,
            reserved_qty: row.reserved_qty,
        }))
    }

    async fn seed(&self, rows: &[(BookId, i64)]) -> Result<()> {
        let mut table = self.table.lock().await;
        for (book_id, total_qty) in rows {
            table.entry(*book_id).or_insert(StockRow {
                total_qty: *total_qty,
                reserved_qty: 0,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn book(id: i64) -> BookId {
        BookId::new(id)
    }

    async fn seeded(rows: &[(i64, i64)]) -> MemoryStockStore {
        let store = MemoryStockStore::new();
        let rows: Vec<(BookId, i64)> = rows.iter().map(|(id, q)| (book(*id), *q)).collect();
        store.seed(&rows).await.unwrap();
        store
    }

    #[tokio::test]
    async fn reserve_holds_units() {
        let store = seeded(&[(1, 10)]).await;
        store.reserve(&[StockLine::new(1i64, 4)]).await.unwrap();

        let level = store.level(book(1)).await.unwrap().unwrap();
        assert_eq!(level.total_qty, 10);
        assert_eq!(level.reserved_qty, 4);
        assert_eq!(level.available(), 6);
    }

    #[tokio::test]
    async fn reserve_unknown_item_fails() {
        let store = seeded(&[(1, 10)]).await;
        let err = store.reserve(&[StockLine::new(99i64, 1)]).await.unwrap_err();
        assert!(matches!(err, StockError::NoSuchItem { book_id } if book_id == book(99)));
    }

    #[tokio::test]
    async fn reserve_reports_needed_and_available() {
        let store = seeded(&[(1, 3)]).await;
        let err = store.reserve(&[StockLine::new(1i64, 5)]).await.unwrap_err();
        match err {
            StockError::InsufficientStock {
                book_id,
                needed,
                available,
            } => {
                assert_eq!(book_id, book(1));
                assert_eq!(needed, 5);
                assert_eq!(available, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn multi_line_reserve_is_all_or_nothing() {
        let store = seeded(&[(1, 10), (2, 1)]).await;
        let err = store
            .reserve(&[StockLine::new(1i64, 5), StockLine::new(2i64, 3)])
            .await
            .unwrap_err();
        assert!(matches!(err, StockError::InsufficientStock { .. }));

        // The passing line must not have been applied.
        let level = store.level(book(1)).await.unwrap().unwrap();
        assert_eq!(level.reserved_qty, 0);
    }

    #[tokio::test]
    async fn concurrent_reserves_cannot_oversell() {
        let store = Arc::new(seeded(&[(1, 5)]).await);

        let a = {
            let store = store.clone();
            tokio::spawn(async move { store.reserve(&[StockLine::new(1i64, 3)]).await })
        };
        let b = {
            let store = store.clone();
            tokio::spawn(async move { store.reserve(&[StockLine::new(1i64, 3)]).await })
        };
        let results = [a.await.unwrap(), b.await.unwrap()];

        let ok = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(ok, 1, "exactly one reserve may win");

        let loser = results.into_iter().find(|r| r.is_err()).unwrap();
        match loser.unwrap_err() {
            StockError::InsufficientStock {
                needed, available, ..
            } => {
                assert_eq!(needed, 3);
                assert_eq!(available, 2);
            }
            other => panic!("unexpected error: {other}"),
        }

        let level = store.level(book(1)).await.unwrap().unwrap();
        assert_eq!(level.reserved_qty, 3);
    }

    #[tokio::test]
    async fn confirm_consumes_from_total_and_reserved() {
        let store = seeded(&[(1, 10)]).await;
        store.reserve(&[StockLine::new(1i64, 4)]).await.unwrap();
        store.confirm(&[StockLine::new(1i64, 4)]).await.unwrap();

        let level = store.level(book(1)).await.unwrap().unwrap();
        assert_eq!(level.total_qty, 6);
        assert_eq!(level.reserved_qty, 0);
    }

    #[tokio::test]
    async fn release_floors_at_zero() {
        let store = seeded(&[(1, 10)]).await;
        store.reserve(&[StockLine::new(1i64, 2)]).await.unwrap();
        // Release more than was reserved: clamps, never negative.
        store.release(&[StockLine::new(1i64, 5)]).await.unwrap();

        let level = store.level(book(1)).await.unwrap().unwrap();
        assert_eq!(level.reserved_qty, 0);
        assert_eq!(level.total_qty, 10);
    }

    #[tokio::test]
    async fn availability_empty_input_dumps_full_ledger() {
        let store = seeded(&[(1, 10), (2, 0), (3, 7)]).await;
        store.reserve(&[StockLine::new(3i64, 2)]).await.unwrap();

        let all = store.availability(&[]).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[&book(1)], 10);
        assert_eq!(all[&book(2)], 0);
        assert_eq!(all[&book(3)], 5);
    }

    #[tokio::test]
    async fn availability_filters_and_skips_unknown() {
        let store = seeded(&[(1, 10), (2, 4)]).await;
        let some = store
            .availability(&[book(2), book(99)])
            .await
            .unwrap();
        assert_eq!(some.len(), 1);
        assert_eq!(some[&book(2)], 4);
    }

    #[tokio::test]
    async fn seed_is_insert_if_absent() {
        let store = seeded(&[(1, 10)]).await;
        store.reserve(&[StockLine::new(1i64, 2)]).await.unwrap();
        // Re-seeding must not reset existing counters.
        store.seed(&[(book(1), 99), (book(2), 5)]).await.unwrap();

        let one = store.level(book(1)).await.unwrap().unwrap();
        assert_eq!(one.total_qty, 10);
        assert_eq!(one.reserved_qty, 2);
        assert_eq!(store.level(book(2)).await.unwrap().unwrap().total_qty, 5);
    }

    #[tokio::test]
    async fn zero_quantity_line_is_rejected() {
        let store = seeded(&[(1, 10)]).await;
        let err = store.reserve(&[StockLine::new(1i64, 0)]).await.unwrap_err();
        assert!(matches!(err, StockError::InvalidQuantity { .. }));
    }
}
