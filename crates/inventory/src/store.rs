//! The `StockStore` trait: the ledger's four operations plus seeding.

use std::collections::BTreeMap;

use async_trait::async_trait;
use common::BookId;

use crate::Result;

/// One line of a multi-item ledger mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockLine {
    pub book_id: BookId,
    pub qty: i64,
}

impl StockLine {
    pub fn new(book_id: impl Into<BookId>, qty: i64) -> Self {
        Self {
            book_id: book_id.into(),
            qty,
        }
    }
}

/// A point-in-time view of one item's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockLevel {
    pub total_qty: i64,
    pub reserved_qty: i64,
}

impl StockLevel {
    /// Units that can still be reserved, clamped at zero.
    pub fn available(&self) -> i64 {
        (self.total_qty - self.reserved_qty).max(0)
    }
}

/// Durable per-item stock counters.
///
/// Every mutating call is atomic across all of its lines and serializes
/// with other mutations touching the same items, so two concurrent
/// reserves can never both observe enough availability when the combined
/// quantity exceeds it.
#[async_trait]
pub trait StockStore: Send + Sync {
    /// Places a provisional hold on every line, all-or-nothing.
    ///
    /// Validates availability for every line before mutating any; if one
    /// line fails, no line is applied and the failing line's error is
    /// returned.
    async fn reserve(&self, lines: &[StockLine]) -> Result<()>;

    /// Permanently consumes reserved units: decrements both `total_qty`
    /// and `reserved_qty`.
    ///
    /// Assumes the reservation logically exists and does not re-validate;
    /// idempotency is the caller's concern (see the processed-event
    /// ledger in [`crate::processed`]).
    async fn confirm(&self, lines: &[StockLine]) -> Result<()>;

    /// Returns reserved units to availability, flooring `reserved_qty`
    /// at zero. The floor is a safety clamp against double-release, not
    /// silent data loss.
    async fn release(&self, lines: &[StockLine]) -> Result<()>;

    /// Available quantity per item. An empty `ids` slice dumps the full
    /// ledger. Items missing from the ledger are absent from the result.
    async fn availability(&self, ids: &[BookId]) -> Result<BTreeMap<BookId, i64>>;

    /// Current counters for one item, if present. Used by tests and
    /// reconciliation tooling.
    async fn level(&self, book_id: BookId) -> Result<Option<StockLevel>>;

    /// Inserts initial stock rows, skipping items that already exist.
    async fn seed(&self, rows: &[(BookId, i64)]) -> Result<()>;
}
