//! Processed-event ledger guarding stock mutations against redelivery.
//!
//! The transport is at-least-once, so `order.created`, `order.paid` and
//! `order.cancelled` can arrive more than once. The stock ledger itself
//! is not idempotent (a second reserve would double the hold, a second
//! confirm would consume units twice), so the consumer claims
//! `(order_id, operation)` here before mutating and skips duplicates.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use common::OrderId;

use crate::Result;

/// The guarded ledger operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Reserve,
    Confirm,
    Release,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Reserve => "reserve",
            Operation::Confirm => "confirm",
            Operation::Release => "release",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Records which `(order, operation)` pairs have been applied.
#[async_trait]
pub trait ProcessedLedger: Send + Sync {
    /// Claims the pair. Returns `true` if this is the first claim; `false`
    /// means the operation was already applied and must be skipped.
    async fn claim(&self, order_id: OrderId, op: Operation) -> Result<bool>;

    /// Releases a claim after the guarded mutation failed, so a
    /// redelivery can try again.
    async fn unclaim(&self, order_id: OrderId, op: Operation) -> Result<()>;

    /// Whether the pair is already claimed, without claiming it.
    async fn was_claimed(&self, order_id: OrderId, op: Operation) -> Result<bool>;
}

/// In-memory processed-event ledger.
#[derive(Default)]
pub struct MemoryProcessedLedger {
    seen: Mutex<HashSet<(OrderId, Operation)>>,
}

impl MemoryProcessedLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProcessedLedger for MemoryProcessedLedger {
    async fn claim(&self, order_id: OrderId, op: Operation) -> Result<bool> {
        Ok(self.seen.lock().unwrap().insert((order_id, op)))
    }

    async fn unclaim(&self, order_id: OrderId, op: Operation) -> Result<()> {
        self.seen.lock().unwrap().remove(&(order_id, op));
        Ok(())
    }

    async fn was_claimed(&self, order_id: OrderId, op: Operation) -> Result<bool> {
        Ok(self.seen.lock().unwrap().contains(&(order_id, op)))
    }
}
