//! Payment records and the `PaymentStore` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Money, OrderId};

use crate::Result;

/// Lifecycle of a charge attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentState {
    /// Recorded, provider not yet answered.
    Pending,
    Succeeded,
    Failed,
}

impl PaymentState {
    /// True once the provider has answered; settled records never change.
    pub fn is_settled(&self) -> bool {
        matches!(self, PaymentState::Succeeded | PaymentState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentState::Pending => "pending",
            PaymentState::Succeeded => "succeeded",
            PaymentState::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(PaymentState::Pending),
            "succeeded" => Some(PaymentState::Succeeded),
            "failed" => Some(PaymentState::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One payment per order: the record of the single charge attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRecord {
    pub order_id: OrderId,
    pub amount: Money,
    pub state: PaymentState,
    /// Provider's reference for the attempt; empty while pending.
    pub provider_ref: String,
    /// Decline reason; empty unless failed.
    pub reason: String,
    pub updated_at: DateTime<Utc>,
}

impl PaymentRecord {
    pub fn pending(order_id: OrderId, amount: Money) -> Self {
        Self {
            order_id,
            amount,
            state: PaymentState::Pending,
            provider_ref: String::new(),
            reason: String::new(),
            updated_at: Utc::now(),
        }
    }
}

/// Durable charge records, keyed by order.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Records a `pending` attempt for the order, or returns the existing
    /// record untouched. A settled record is never regressed to pending.
    async fn upsert_pending(&self, order_id: OrderId, amount: Money) -> Result<PaymentRecord>;

    /// Settles a pending record with the provider's answer. A record that
    /// is already settled is left alone.
    async fn settle(
        &self,
        order_id: OrderId,
        state: PaymentState,
        provider_ref: &str,
        reason: &str,
    ) -> Result<()>;

    /// Loads the record for an order.
    async fn get(&self, order_id: OrderId) -> Result<Option<PaymentRecord>>;
}
