//! Wire protocol for the order-fulfillment choreography.
//!
//! Every event that crosses a service boundary is declared here: the topic
//! (routing key) it travels on and the JSON payload it carries. Producers
//! and consumers share these structs so a field rename cannot silently
//! split the protocol.
//!
//! Payloads are plain JSON. Consumers must treat undecodable payloads as
//! poison: log, acknowledge, and move on (see [`decode`]).

pub mod topics;

use common::{BookId, Money, OrderId, UserId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// One priced line of an order as it appears in `order.created`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub book_id: BookId,
    /// Title snapshot taken when the order was placed.
    pub title: String,
    pub qty: i64,
    /// Unit price snapshot in cents.
    pub unit_cents: Money,
    /// Line total in cents (`qty * unit_cents` at snapshot time).
    pub line_cents: Money,
}

/// A bare `{book_id, qty}` line, used by the confirm/release signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantityLine {
    pub book_id: BookId,
    pub qty: i64,
}

/// Published by Order after an order row commits; consumed by Inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub items: Vec<OrderLine>,
    pub total_cents: Money,
}

/// Published by Inventory on `inventory.reserved` / `inventory.rejected`;
/// consumed by Order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryResult {
    pub order_id: OrderId,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Published by Order once stock is reserved; consumed by Payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentChargeRequested {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub amount_cents: Money,
}

/// Published by Payment on `payment.succeeded`; consumed by Order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSucceeded {
    pub order_id: OrderId,
    pub provider_ref: String,
}

/// Published by Payment on `payment.failed`; consumed by Order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentFailed {
    pub order_id: OrderId,
    pub reason: String,
    pub provider_ref: String,
}

/// Published by Order when it reaches `Paid`; tells Inventory to consume
/// the reserved units permanently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPaid {
    pub order_id: OrderId,
    pub items: Vec<QuantityLine>,
}

/// Published by Order when it is cancelled (or when the release-on-failure
/// policy fires); tells Inventory to return the reserved units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancelled {
    pub order_id: OrderId,
    pub items: Vec<QuantityLine>,
}

/// Serializes a payload for publishing.
pub fn encode<T: Serialize>(payload: &T) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(payload)
}

/// Decodes a delivery body.
///
/// A decode failure means the message can never be processed; the caller
/// must acknowledge and discard rather than retry (retrying a message that
/// cannot parse only burns the consumer slot).
pub fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, serde_json::Error> {
    serde_json::from_slice(body)
}
