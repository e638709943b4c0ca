//! Order-side choreography: drives the state machine from saga replies.
//!
//! Four subscriptions, each processed sequentially by its own task:
//! - `inventory.reserved` — request the payment charge.
//! - `inventory.rejected` — fail the order.
//! - `payment.succeeded` — mark paid; confirm the stock.
//! - `payment.failed` — fail the order; optionally release the stock.
//!
//! Each reply is folded into [`crate::react`], the status write is
//! guarded against terminal states, and only then are the reaction's
//! events published. A delivery is acknowledged once the status change
//! committed (or the event is poison or targets a finished order); a
//! database failure leaves it unacked for redelivery.

use std::sync::Arc;

use bus::{publish_json_with_retry, Delivery, EventBus, RetryPolicy};
use common::OrderId;
use messages::{topics, InventoryResult, PaymentFailed, PaymentSucceeded};
use tokio::task::JoinHandle;

use crate::choreography::{react, InboundEvent, OutboundMessage, ReleasePolicy};
use crate::error::OrderError;
use crate::store::{OrderStore, UpdateOutcome};

/// What to do with a delivery after handling it.
enum Outcome {
    /// Handled (or poison/stale): acknowledge.
    Ack,
    /// Transient failure: leave unacked for redelivery.
    Retain,
}

/// The Order service's event consumer.
pub struct OrderConsumer<O, B> {
    store: Arc<O>,
    bus: B,
    policy: ReleasePolicy,
    retry: RetryPolicy,
}

impl<O, B: Clone> Clone for OrderConsumer<O, B> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            bus: self.bus.clone(),
            policy: self.policy,
            retry: self.retry,
        }
    }
}

impl<O, B> OrderConsumer<O, B>
where
    O: OrderStore + 'static,
    B: EventBus + Clone + 'static,
{
    pub fn new(store: Arc<O>, bus: B) -> Self {
        Self {
            store,
            bus,
            policy: ReleasePolicy::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ReleasePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Overrides the publish retry budget.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Binds the four subscriptions and spawns one consumer task each.
    pub async fn start(&self) -> bus::Result<Vec<JoinHandle<()>>> {
        let mut reserved = self.bus.subscribe(topics::INVENTORY_RESERVED).await?;
        let mut rejected = self.bus.subscribe(topics::INVENTORY_REJECTED).await?;
        let mut succeeded = self.bus.subscribe(topics::PAYMENT_SUCCEEDED).await?;
        let mut failed = self.bus.subscribe(topics::PAYMENT_FAILED).await?;

        let this = self.clone();
        let h1 = tokio::spawn(async move {
            while let Some(delivery) = reserved.recv().await {
                this.dispatch_inventory(delivery).await;
            }
            tracing::info!(topic = topics::INVENTORY_RESERVED, "consumer stopped");
        });

        let this = self.clone();
        let h2 = tokio::spawn(async move {
            while let Some(delivery) = rejected.recv().await {
                this.dispatch_inventory(delivery).await;
            }
            tracing::info!(topic = topics::INVENTORY_REJECTED, "consumer stopped");
        });

        let this = self.clone();
        let h3 = tokio::spawn(async move {
            while let Some(delivery) = succeeded.recv().await {
                this.dispatch_payment_succeeded(delivery).await;
            }
            tracing::info!(topic = topics::PAYMENT_SUCCEEDED, "consumer stopped");
        });

        let this = self.clone();
        let h4 = tokio::spawn(async move {
            while let Some(delivery) = failed.recv().await {
                this.dispatch_payment_failed(delivery).await;
            }
            tracing::info!(topic = topics::PAYMENT_FAILED, "consumer stopped");
        });

        Ok(vec![h1, h2, h3, h4])
    }

    async fn dispatch_inventory(&self, delivery: Delivery) {
        let event: InventoryResult = match messages::decode(delivery.body()) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(error = %err, "inventory result: discarding malformed payload");
                delivery.ack();
                return;
            }
        };
        let inbound = if event.ok {
            InboundEvent::ReservationOk
        } else {
            InboundEvent::ReservationRejected {
                reason: event.reason,
            }
        };
        match self.apply(event.order_id, inbound).await {
            Outcome::Ack => delivery.ack(),
            Outcome::Retain => {}
        }
    }

    async fn dispatch_payment_succeeded(&self, delivery: Delivery) {
        let event: PaymentSucceeded = match messages::decode(delivery.body()) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(error = %err, "payment.succeeded: discarding malformed payload");
                delivery.ack();
                return;
            }
        };
        let inbound = InboundEvent::PaymentSucceeded {
            provider_ref: event.provider_ref,
        };
        match self.apply(event.order_id, inbound).await {
            Outcome::Ack => delivery.ack(),
            Outcome::Retain => {}
        }
    }

    async fn dispatch_payment_failed(&self, delivery: Delivery) {
        let event: PaymentFailed = match messages::decode(delivery.body()) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(error = %err, "payment.failed: discarding malformed payload");
                delivery.ack();
                return;
            }
        };
        let inbound = InboundEvent::PaymentFailed {
            reason: event.reason,
        };
        match self.apply(event.order_id, inbound).await {
            Outcome::Ack => delivery.ack(),
            Outcome::Retain => {}
        }
    }

    /// Loads the order, folds the event through the transition table, and
    /// persists-then-publishes the reaction.
    async fn apply(&self, order_id: OrderId, event: InboundEvent) -> Outcome {
        let order = match self.store.get(order_id).await {
            Ok(Some(order)) => order,
            Ok(None) => {
                // A reply for an order this store never saw; nothing to do.
                tracing::warn!(%order_id, ?event, "reply for unknown order discarded");
                return Outcome::Ack;
            }
            Err(err) => {
                tracing::error!(%order_id, error = %err, "order load failed, will retry");
                return Outcome::Retain;
            }
        };

        let reaction = react(&order, &event, self.policy);
        if reaction.is_noop() {
            tracing::info!(%order_id, status = %order.status, "event absorbed by terminal order");
            return Outcome::Ack;
        }

        if let Some(next) = reaction.next {
            match self.store.update_status(order_id, next).await {
                Ok(UpdateOutcome::Applied) => {
                    metrics::counter!("order_transitions_total", "to" => next.as_str())
                        .increment(1);
                    tracing::info!(%order_id, status = %next, "order transitioned");
                }
                Ok(UpdateOutcome::AlreadyTerminal(current)) => {
                    // Lost a race with another reply; its reaction already
                    // published the matching events.
                    tracing::info!(%order_id, status = %current, "transition lost race, skipping");
                    return Outcome::Ack;
                }
                Err(OrderError::NotFound(_)) => {
                    tracing::warn!(%order_id, "order disappeared mid-reaction");
                    return Outcome::Ack;
                }
                Err(err) => {
                    tracing::error!(%order_id, error = %err, "transition failed, will retry");
                    return Outcome::Retain;
                }
            }
        }

        for message in &reaction.emit {
            if let Err(err) = self.publish_message(message).await {
                // The transition is committed; the downstream side has its
                // own dedup, so a later manual replay is safe.
                tracing::error!(%order_id, topic = message.topic(), error = %err, "emit failed");
            }
        }
        Outcome::Ack
    }

    async fn publish_message(&self, message: &OutboundMessage) -> bus::Result<()> {
        let topic = message.topic();
        match message {
            OutboundMessage::ChargeRequested(p) => {
                publish_json_with_retry(&self.bus, topic, p, self.retry).await
            }
            OutboundMessage::OrderPaid(p) => {
                publish_json_with_retry(&self.bus, topic, p, self.retry).await
            }
            OutboundMessage::OrderCancelled(p) => {
                publish_json_with_retry(&self.bus, topic, p, self.retry).await
            }
        }
    }
}
