//! Order-facing operations: create, read, cancel.

use std::sync::Arc;
use std::time::Duration;

use bus::{publish_json_with_retry, EventBus, RetryPolicy};
use common::{OrderId, UserId};
use messages::{topics, OrderCancelled, OrderCreated};
use tracing::{error, info};

use crate::cart::CartClient;
use crate::error::OrderError;
use crate::model::Order;
use crate::status::OrderStatus;
use crate::store::{OrderStore, UpdateOutcome};
use crate::Result;

/// How long to wait on the cart service before giving up on the order.
pub const DEFAULT_CART_TIMEOUT: Duration = Duration::from_secs(4);

/// Entry point for everything a caller does to an order directly.
///
/// Status changes driven by saga events go through
/// [`crate::OrderConsumer`] instead; this service only ever writes
/// `created` (on insert) and `cancelled` (on explicit cancel).
pub struct OrderService<O, C, B> {
    store: Arc<O>,
    cart: Arc<C>,
    bus: B,
    cart_timeout: Duration,
    retry: RetryPolicy,
}

impl<O, C, B> OrderService<O, C, B>
where
    O: OrderStore,
    C: CartClient,
    B: EventBus,
{
    pub fn new(store: Arc<O>, cart: Arc<C>, bus: B) -> Self {
        Self {
            store,
            cart,
            bus,
            cart_timeout: DEFAULT_CART_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }

    /// Overrides the cart deadline (default 4s).
    pub fn with_cart_timeout(mut self, timeout: Duration) -> Self {
        self.cart_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Snapshots the user's cart into a new `created` order and announces
    /// it on `order.created`.
    ///
    /// The order row commits before the publish. If the publish still
    /// fails after retries the order stays `created` and the failure is
    /// logged; it is never rolled back.
    #[tracing::instrument(skip(self))]
    pub async fn create_order(&self, user_id: UserId) -> Result<Order> {
        if user_id.is_nil() {
            return Err(OrderError::InvalidUser);
        }

        let cart = tokio::time::timeout(self.cart_timeout, self.cart.get_cart(user_id))
            .await
            .map_err(|_| OrderError::CartUnavailable("timed out".to_string()))?
            .map_err(|err| OrderError::CartUnavailable(err.to_string()))?;

        if cart.is_empty() {
            return Err(OrderError::EmptyCart);
        }

        let order = Order::from_cart(user_id, &cart);
        self.store.insert(&order).await?;

        let event = OrderCreated {
            order_id: order.id,
            user_id: order.user_id,
            items: order.order_lines(),
            total_cents: order.total,
        };
        if let Err(err) =
            publish_json_with_retry(&self.bus, topics::ORDER_CREATED, &event, self.retry).await
        {
            // The order is committed; the saga will stall until the
            // broker comes back and the event is re-announced.
            error!(order_id = %order.id, error = %err, "failed to announce new order");
        }

        metrics::counter!("orders_created_total").increment(1);
        info!(order_id = %order.id, total = %order.total, "order created");
        Ok(order)
    }

    /// Loads an order with its items.
    pub async fn get_order(&self, order_id: OrderId) -> Result<Order> {
        self.store
            .get(order_id)
            .await?
            .ok_or(OrderError::NotFound(order_id))
    }

    /// Cancels an order that has not entered the saga's terminal states.
    ///
    /// Only `created` orders can be cancelled; the write is guarded, so a
    /// concurrent `paid`/`failed` transition wins and the cancel is
    /// refused. On success the held stock is released via
    /// `order.cancelled`.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(&self, order_id: OrderId) -> Result<Order> {
        let order = self.get_order(order_id).await?;
        if !order.status.can_cancel() {
            return Err(OrderError::TerminalState {
                order_id,
                status: order.status,
            });
        }

        match self
            .store
            .update_status(order_id, OrderStatus::Cancelled)
            .await?
        {
            UpdateOutcome::Applied => {}
            UpdateOutcome::AlreadyTerminal(status) => {
                return Err(OrderError::TerminalState { order_id, status });
            }
        }

        let event = OrderCancelled {
            order_id,
            items: order.quantity_lines(),
        };
        if let Err(err) =
            publish_json_with_retry(&self.bus, topics::ORDER_CANCELLED, &event, self.retry).await
        {
            error!(order_id = %order_id, error = %err, "failed to announce cancellation");
        }

        metrics::counter!("orders_cancelled_total").increment(1);
        info!(order_id = %order_id, "order cancelled");
        self.get_order(order_id).await
    }
}
