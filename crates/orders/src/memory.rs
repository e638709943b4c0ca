use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use common::OrderId;
use tokio::sync::RwLock;

use crate::error::OrderError;
use crate::model::Order;
use crate::status::OrderStatus;
use crate::store::{OrderStore, UpdateOutcome};
use crate::Result;

/// In-memory order ledger for the default wiring and tests.
#[derive(Default)]
pub struct MemoryOrderStore {
    orders: RwLock<HashMap<OrderId, Order>>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored orders.
    pub async fn len(&self) -> usize {
        self.orders.read().await.len()
    }

    /// True when no order has been written.
    pub async fn is_empty(&self) -> bool {
        self.orders.read().await.is_empty()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn insert(&self, order: &Order) -> Result<()> {
        self.orders.write().await.insert(order.id, order.clone());
        Ok(())
    }

    async fn get(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.orders.read().await.get(&order_id).cloned())
    }

    async fn update_status(
        &self,
        order_id: OrderId,
        status: OrderStatus,
    ) -> Result<UpdateOutcome> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(&order_id)
            .ok_or(OrderError::NotFound(order_id))?;
        if order.status.is_terminal() {
            return Ok(UpdateOutcome::AlreadyTerminal(order.status));
        }
        order.status = status;
        order.updated_at = Utc::now();
        Ok(UpdateOutcome::Applied)
    }
}
