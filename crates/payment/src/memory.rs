//! In-memory payment store for the default wiring and tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use common::{Money, OrderId};

use crate::store::{PaymentRecord, PaymentState, PaymentStore};
use crate::Result;

#[derive(Default)]
pub struct MemoryPaymentStore {
    records: Mutex<HashMap<OrderId, PaymentRecord>>,
}

impl MemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentStore for MemoryPaymentStore {
    async fn upsert_pending(&self, order_id: OrderId, amount: Money) -> Result<PaymentRecord> {
        let mut records = self.records.lock().unwrap();
        let record = records
            .entry(order_id)
            .or_insert_with(|| PaymentRecord::pending(order_id, amount));
        Ok(record.clone())
    }

    async fn settle(
        &self,
        order_id: OrderId,
        state: PaymentState,
        provider_ref: &str,
        reason: &str,
    ) -> Result<()> {
        let mut records = self.records.lock().unwrap();
        if let Some(record) = records.get_mut(&order_id) {
            if record.state.is_settled() {
                return Ok(());
            }
            record.state = state;
            record.provider_ref = provider_ref.to_string();
            record.reason = reason.to_string();
            record.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn get(&self, order_id: OrderId) -> Result<Option<PaymentRecord>> {
        Ok(self.records.lock().unwrap().get(&order_id).cloned())
    }
}
