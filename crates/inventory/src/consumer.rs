//! Inventory-side choreography: reacts to order lifecycle events.
//!
//! Three subscriptions, each processed sequentially by its own task:
//! - `order.created` — try to reserve, once; answer `inventory.reserved`
//!   or `inventory.rejected`.
//! - `order.paid` — confirm the reservation, once.
//! - `order.cancelled` — release the reservation, once.
//!
//! A delivery is acknowledged only after the ledger mutation committed
//! (or when the message is poison/duplicate and must be discarded). A
//! transient database failure leaves the delivery unacked so the broker
//! redelivers it.

use std::sync::Arc;

use bus::{publish_json_with_retry, Delivery, EventBus, RetryPolicy};
use messages::{topics, InventoryResult, OrderCancelled, OrderCreated, OrderPaid, QuantityLine};
use tokio::task::JoinHandle;

use crate::processed::{Operation, ProcessedLedger};
use crate::store::{StockLine, StockStore};

/// What to do with a delivery after handling it.
enum Outcome {
    /// Handled (or poison/duplicate): acknowledge.
    Ack,
    /// Transient failure: leave unacked for redelivery.
    Retain,
}

/// The Inventory service's event consumer.
pub struct InventoryConsumer<S, L, B> {
    store: Arc<S>,
    ledger: Arc<L>,
    bus: B,
    retry: RetryPolicy,
}

impl<S, L, B: Clone> Clone for InventoryConsumer<S, L, B> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            ledger: self.ledger.clone(),
            bus: self.bus.clone(),
            retry: self.retry,
        }
    }
}

impl<S, L, B> InventoryConsumer<S, L, B>
where
    S: StockStore + 'static,
    L: ProcessedLedger + 'static,
    B: EventBus + Clone + 'static,
{
    pub fn new(store: Arc<S>, ledger: Arc<L>, bus: B) -> Self {
        Self {
            store,
            ledger,
            bus,
            retry: RetryPolicy::default(),
        }
    }

    /// Overrides the publish retry budget.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Binds the three subscriptions and spawns one consumer task each.
    pub async fn start(&self) -> bus::Result<Vec<JoinHandle<()>>> {
        let mut created = self.bus.subscribe(topics::ORDER_CREATED).await?;
        let mut paid = self.bus.subscribe(topics::ORDER_PAID).await?;
        let mut cancelled = self.bus.subscribe(topics::ORDER_CANCELLED).await?;

        let this = self.clone();
        let h1 = tokio::spawn(async move {
            while let Some(delivery) = created.recv().await {
                this.dispatch_created(delivery).await;
            }
            tracing::info!(topic = topics::ORDER_CREATED, "consumer stopped");
        });

        let this = self.clone();
        let h2 = tokio::spawn(async move {
            while let Some(delivery) = paid.recv().await {
                this.dispatch_paid(delivery).await;
            }
            tracing::info!(topic = topics::ORDER_PAID, "consumer stopped");
        });

        let this = self.clone();
        let h3 = tokio::spawn(async move {
            while let Some(delivery) = cancelled.recv().await {
                this.dispatch_cancelled(delivery).await;
            }
            tracing::info!(topic = topics::ORDER_CANCELLED, "consumer stopped");
        });

        Ok(vec![h1, h2, h3])
    }

    async fn dispatch_created(&self, delivery: Delivery) {
        match self.handle_order_created(delivery.body()).await {
            Outcome::Ack => delivery.ack(),
            Outcome::Retain => {}
        }
    }

    async fn dispatch_paid(&self, delivery: Delivery) {
        match self.handle_order_paid(delivery.body()).await {
            Outcome::Ack => delivery.ack(),
            Outcome::Retain => {}
        }
    }

    async fn dispatch_cancelled(&self, delivery: Delivery) {
        match self.handle_order_cancelled(delivery.body()).await {
            Outcome::Ack => delivery.ack(),
            Outcome::Retain => {}
        }
    }

    async fn handle_order_created(&self, body: &[u8]) -> Outcome {
        let event: OrderCreated = match messages::decode(body) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(error = %err, "order.created: discarding malformed payload");
                return Outcome::Ack;
            }
        };
        tracing::info!(order_id = %event.order_id, lines = event.items.len(), "reserve requested");

        // Redelivered order.created must not double the hold.
        match self.ledger.claim(event.order_id, Operation::Reserve).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::info!(order_id = %event.order_id, "duplicate order.created, skipping");
                metrics::counter!("stock_duplicate_signals_total").increment(1);
                return Outcome::Ack;
            }
            Err(err) => {
                tracing::error!(order_id = %event.order_id, error = %err, "claim failed");
                return Outcome::Retain;
            }
        }

        // Topics carry no cross-topic ordering: a cancel for this order may
        // have been processed already. Reserving now would hold stock for a
        // terminal order with no release left to undo it.
        match self
            .ledger
            .was_claimed(event.order_id, Operation::Release)
            .await
        {
            Ok(false) => {}
            Ok(true) => {
                tracing::warn!(order_id = %event.order_id, "order already released, skipping reserve");
                return Outcome::Ack;
            }
            Err(err) => {
                tracing::error!(order_id = %event.order_id, error = %err, "release lookup failed");
                self.unclaim_logged(event.order_id, Operation::Reserve).await;
                return Outcome::Retain;
            }
        }

        let lines: Vec<StockLine> = event
            .items
            .iter()
            .map(|item| StockLine::new(item.book_id, item.qty))
            .collect();

        let result = match self.store.reserve(&lines).await {
            Ok(()) => {
                metrics::counter!("stock_reservations_total", "outcome" => "reserved")
                    .increment(1);
                InventoryResult {
                    order_id: event.order_id,
                    ok: true,
                    reason: None,
                }
            }
            Err(err) if err.is_rejection() => {
                metrics::counter!("stock_reservations_total", "outcome" => "rejected")
                    .increment(1);
                tracing::info!(order_id = %event.order_id, reason = %err, "reserve rejected");
                InventoryResult {
                    order_id: event.order_id,
                    ok: false,
                    reason: Some(err.to_string()),
                }
            }
            Err(err) => {
                tracing::error!(order_id = %event.order_id, error = %err, "reserve failed");
                self.unclaim_logged(event.order_id, Operation::Reserve).await;
                return Outcome::Retain;
            }
        };

        let topic = if result.ok {
            topics::INVENTORY_RESERVED
        } else {
            topics::INVENTORY_REJECTED
        };
        if let Err(err) = publish_json_with_retry(&self.bus, topic, &result, self.retry).await {
            // The outcome is committed and claimed; the unanswered order
            // stays in `created` and surfaces through logs and the
            // exhausted retry counter.
            tracing::error!(order_id = %result.order_id, error = %err, "publish result failed");
        }
        Outcome::Ack
    }

    async fn handle_order_paid(&self, body: &[u8]) -> Outcome {
        let event: OrderPaid = match messages::decode(body) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(error = %err, "order.paid: discarding malformed payload");
                return Outcome::Ack;
            }
        };
        self.apply_guarded(event.order_id, Operation::Confirm, &event.items)
            .await
    }

    async fn handle_order_cancelled(&self, body: &[u8]) -> Outcome {
        let event: OrderCancelled = match messages::decode(body) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(error = %err, "order.cancelled: discarding malformed payload");
                return Outcome::Ack;
            }
        };
        self.apply_guarded(event.order_id, Operation::Release, &event.items)
            .await
    }

    /// Confirms or releases under the processed-event guard.
    async fn apply_guarded(
        &self,
        order_id: common::OrderId,
        op: Operation,
        items: &[QuantityLine],
    ) -> Outcome {
        match self.ledger.claim(order_id, op).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::info!(%order_id, %op, "duplicate delivery, skipping");
                metrics::counter!("stock_duplicate_signals_total").increment(1);
                return Outcome::Ack;
            }
            Err(err) => {
                tracing::error!(%order_id, %op, error = %err, "claim failed");
                return Outcome::Retain;
            }
        }

        let lines: Vec<StockLine> = items
            .iter()
            .map(|item| StockLine::new(item.book_id, item.qty))
            .collect();
        let result = match op {
            Operation::Reserve => self.store.reserve(&lines).await,
            Operation::Confirm => self.store.confirm(&lines).await,
            Operation::Release => self.store.release(&lines).await,
        };

        match result {
            Ok(()) => {
                tracing::info!(%order_id, %op, "applied");
                metrics::counter!("stock_signals_applied_total", "op" => op.as_str())
                    .increment(1);
                Outcome::Ack
            }
            Err(err) if err.is_rejection() => {
                // Will never succeed; discard but log loudly.
                tracing::error!(%order_id, %op, error = %err, "unapplicable signal discarded");
                Outcome::Ack
            }
            Err(err) => {
                tracing::error!(%order_id, %op, error = %err, "apply failed, will retry");
                self.unclaim_logged(order_id, op).await;
                Outcome::Retain
            }
        }
    }

    /// Reopens a claim so the redelivery can try again; the failure itself
    /// is only loggable at this point.
    async fn unclaim_logged(&self, order_id: common::OrderId, op: Operation) {
        if let Err(err) = self.ledger.unclaim(order_id, op).await {
            tracing::error!(%order_id, %op, error = %err, "unclaim failed");
        }
    }
}
