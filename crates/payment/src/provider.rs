//! The charge provider seam.

use async_trait::async_trait;
use chrono::Utc;
use common::{Money, OrderId};

/// What the provider did with a charge attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeOutcome {
    Approved {
        provider_ref: String,
    },
    Declined {
        provider_ref: String,
        reason: String,
    },
}

/// A payment provider that can charge a user for an order.
///
/// Real providers fail in their own ways; a transport error should be
/// modelled as a decline with a reason rather than a panic, so the trait
/// is infallible.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn charge(&self, order_id: OrderId, amount: Money) -> ChargeOutcome;
}

/// Deterministic stand-in for a real provider.
///
/// Approves even cent amounts and declines odd ones, so a test can pick
/// the outcome by picking the price.
#[derive(Debug, Default, Clone, Copy)]
pub struct FakeProvider;

impl FakeProvider {
    pub fn new() -> Self {
        Self
    }

    fn reference(order_id: OrderId) -> String {
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        format!("FAKE-{order_id}-{nanos}")
    }
}

#[async_trait]
impl PaymentProvider for FakeProvider {
    async fn charge(&self, order_id: OrderId, amount: Money) -> ChargeOutcome {
        let provider_ref = Self::reference(order_id);
        if amount.cents() % 2 == 0 {
            ChargeOutcome::Approved { provider_ref }
        } else {
            ChargeOutcome::Declined {
                provider_ref,
                reason: "insufficient_funds".to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn even_amounts_are_approved() {
        let outcome = FakeProvider::new()
            .charge(OrderId::new(), Money::from_cents(2400))
            .await;
        assert!(matches!(outcome, ChargeOutcome::Approved { .. }));
    }

    #[tokio::test]
    async fn odd_amounts_are_declined_as_insufficient_funds() {
        let outcome = FakeProvider::new()
            .charge(OrderId::new(), Money::from_cents(2401))
            .await;
        match outcome {
            ChargeOutcome::Declined { reason, .. } => assert_eq!(reason, "insufficient_funds"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn references_carry_the_order_id() {
        let order_id = OrderId::new();
        let outcome = FakeProvider::new()
            .charge(order_id, Money::from_cents(100))
            .await;
        let ChargeOutcome::Approved { provider_ref } = outcome else {
            panic!("even amount must be approved");
        };
        assert!(provider_ref.starts_with(&format!("FAKE-{order_id}-")));
    }
}
