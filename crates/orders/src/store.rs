//! The `OrderStore` trait.

use async_trait::async_trait;
use common::OrderId;

use crate::model::Order;
use crate::status::OrderStatus;
use crate::Result;

/// Result of a guarded status update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The new status was persisted.
    Applied,
    /// The order is already terminal; nothing was written.
    AlreadyTerminal(OrderStatus),
}

/// Durable order + line-item records.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists a new order with its items atomically.
    async fn insert(&self, order: &Order) -> Result<()>;

    /// Loads an order with its items.
    async fn get(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Transitions an order's status.
    ///
    /// The write is guarded: if the stored status is already terminal the
    /// update is refused and [`UpdateOutcome::AlreadyTerminal`] is
    /// returned, never applied. Errors with
    /// [`crate::OrderError::NotFound`] when the order does not exist.
    async fn update_status(&self, order_id: OrderId, status: OrderStatus)
        -> Result<UpdateOutcome>;
}
