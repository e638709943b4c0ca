//! The order-side transition table as a pure function.
//!
//! Every inbound saga event maps through [`react`] to an optional status
//! change plus the events to emit afterwards. Keeping this pure means the
//! entire table — including the terminal no-op row — is testable without
//! a bus, a store, or any async machinery.

use messages::{topics, OrderCancelled, OrderPaid, PaymentChargeRequested};

use crate::model::Order;
use crate::status::OrderStatus;

/// What to do with the stock reservation when payment fails.
///
/// The upstream system held the reservation forever on payment failure
/// (manual reconciliation); releasing automatically returns the units to
/// sale immediately. Both are defensible, so it is a policy knob rather
/// than a hardcoded choice.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReleasePolicy {
    /// Release the reservation when payment fails (default: keep holding).
    pub release_on_payment_failure: bool,
}

/// An inbound saga event, already decoded from the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// `inventory.reserved` / `inventory.rejected` with `ok` folded in.
    ReservationOk,
    ReservationRejected { reason: Option<String> },
    /// `payment.succeeded` / `payment.failed`.
    PaymentSucceeded { provider_ref: String },
    PaymentFailed { reason: String },
}

/// An event the order service must publish as part of a reaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    ChargeRequested(PaymentChargeRequested),
    OrderPaid(OrderPaid),
    OrderCancelled(OrderCancelled),
}

impl OutboundMessage {
    /// The topic this message travels on.
    pub fn topic(&self) -> &'static str {
        match self {
            OutboundMessage::ChargeRequested(_) => topics::PAYMENT_CHARGE_REQUESTED,
            OutboundMessage::OrderPaid(_) => topics::ORDER_PAID,
            OutboundMessage::OrderCancelled(_) => topics::ORDER_CANCELLED,
        }
    }

    /// Serializes the payload for publishing.
    pub fn to_body(&self) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            OutboundMessage::ChargeRequested(p) => messages::encode(p),
            OutboundMessage::OrderPaid(p) => messages::encode(p),
            OutboundMessage::OrderCancelled(p) => messages::encode(p),
        }
    }
}

/// The outcome of applying one event to one order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Reaction {
    /// New status to persist, if any.
    pub next: Option<OrderStatus>,
    /// Events to publish after the status change commits.
    pub emit: Vec<OutboundMessage>,
}

impl Reaction {
    fn none() -> Self {
        Self::default()
    }

    /// True if the event changes nothing and emits nothing.
    pub fn is_noop(&self) -> bool {
        self.next.is_none() && self.emit.is_empty()
    }
}

/// Applies one inbound event to an order's current state.
///
/// Terminal states absorb every event: redelivered or out-of-order
/// messages for a finished order are dropped here, which is what makes
/// at-least-once delivery safe for the order side.
pub fn react(order: &Order, event: &InboundEvent, policy: ReleasePolicy) -> Reaction {
    if order.status.is_terminal() {
        return Reaction::none();
    }

    match event {
        InboundEvent::ReservationOk => Reaction {
            next: None,
            emit: vec![OutboundMessage::ChargeRequested(PaymentChargeRequested {
                order_id: order.id,
                user_id: order.user_id,
                amount_cents: order.total,
            })],
        },
        InboundEvent::ReservationRejected { .. } => Reaction {
            next: Some(OrderStatus::Failed),
            emit: vec![],
        },
        InboundEvent::PaymentSucceeded { .. } => Reaction {
            next: Some(OrderStatus::Paid),
            emit: vec![OutboundMessage::OrderPaid(OrderPaid {
                order_id: order.id,
                items: order.quantity_lines(),
            })],
        },
        InboundEvent::PaymentFailed { .. } => {
            let emit = if policy.release_on_payment_failure {
                vec![OutboundMessage::OrderCancelled(OrderCancelled {
                    order_id: order.id,
                    items: order.quantity_lines(),
                })]
            } else {
                // Hold the reservation for reconciliation.
                vec![]
            };
            Reaction {
                next: Some(OrderStatus::Failed),
                emit,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::CartItem;
    use common::{BookId, Money, UserId};

    fn order_with_status(status: OrderStatus) -> Order {
        let mut order = Order::from_cart(
            UserId::new(),
            &[CartItem {
                book_id: BookId::new(1),
                title: "Dune".to_string(),
                qty: 2,
                unit_price: Money::from_cents(1500),
            }],
        );
        order.status = status;
        order
    }

    #[test]
    fn reservation_ok_requests_payment_without_status_change() {
        let order = order_with_status(OrderStatus::Created);
        let reaction = react(&order, &InboundEvent::ReservationOk, ReleasePolicy::default());

        assert_eq!(reaction.next, None);
        assert_eq!(reaction.emit.len(), 1);
        match &reaction.emit[0] {
            OutboundMessage::ChargeRequested(charge) => {
                assert_eq!(charge.order_id, order.id);
                assert_eq!(charge.amount_cents, Money::from_cents(3000));
            }
            other => panic!("unexpected emit: {other:?}"),
        }
    }

    #[test]
    fn reservation_rejected_fails_the_order_silently() {
        let order = order_with_status(OrderStatus::Created);
        let reaction = react(
            &order,
            &InboundEvent::ReservationRejected {
                reason: Some("insufficient stock".to_string()),
            },
            ReleasePolicy::default(),
        );

        assert_eq!(reaction.next, Some(OrderStatus::Failed));
        assert!(reaction.emit.is_empty(), "no payment request after rejection");
    }

    #[test]
    fn payment_success_pays_and_requests_confirm() {
        let order = order_with_status(OrderStatus::Created);
        let reaction = react(
            &order,
            &InboundEvent::PaymentSucceeded {
                provider_ref: "FAKE-1".to_string(),
            },
            ReleasePolicy::default(),
        );

        assert_eq!(reaction.next, Some(OrderStatus::Paid));
        match &reaction.emit[0] {
            OutboundMessage::OrderPaid(paid) => {
                assert_eq!(paid.items.len(), 1);
                assert_eq!(paid.items[0].qty, 2);
            }
            other => panic!("unexpected emit: {other:?}"),
        }
    }

    #[test]
    fn payment_failure_holds_the_reservation_by_default() {
        let order = order_with_status(OrderStatus::Created);
        let reaction = react(
            &order,
            &InboundEvent::PaymentFailed {
                reason: "insufficient_funds".to_string(),
            },
            ReleasePolicy::default(),
        );

        assert_eq!(reaction.next, Some(OrderStatus::Failed));
        assert!(reaction.emit.is_empty(), "reservation stays held");
    }

    #[test]
    fn payment_failure_releases_under_the_release_policy() {
        let order = order_with_status(OrderStatus::Created);
        let reaction = react(
            &order,
            &InboundEvent::PaymentFailed {
                reason: "insufficient_funds".to_string(),
            },
            ReleasePolicy {
                release_on_payment_failure: true,
            },
        );

        assert_eq!(reaction.next, Some(OrderStatus::Failed));
        match &reaction.emit[0] {
            OutboundMessage::OrderCancelled(cancelled) => {
                assert_eq!(cancelled.order_id, order.id);
            }
            other => panic!("unexpected emit: {other:?}"),
        }
    }

    #[test]
    fn terminal_states_absorb_every_event() {
        let events = [
            InboundEvent::ReservationOk,
            InboundEvent::ReservationRejected { reason: None },
            InboundEvent::PaymentSucceeded {
                provider_ref: "x".to_string(),
            },
            InboundEvent::PaymentFailed {
                reason: "y".to_string(),
            },
        ];
        for status in [OrderStatus::Paid, OrderStatus::Cancelled, OrderStatus::Failed] {
            let order = order_with_status(status);
            for event in &events {
                let reaction = react(&order, event, ReleasePolicy::default());
                assert!(
                    reaction.is_noop(),
                    "{status} must absorb {event:?}"
                );
            }
        }
    }

    #[test]
    fn outbound_messages_know_their_topics() {
        let order = order_with_status(OrderStatus::Created);
        let reaction = react(&order, &InboundEvent::ReservationOk, ReleasePolicy::default());
        assert_eq!(reaction.emit[0].topic(), topics::PAYMENT_CHARGE_REQUESTED);
        assert!(!reaction.emit[0].to_body().unwrap().is_empty());
    }
}
