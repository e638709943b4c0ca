//! Order and line-item records.

use chrono::{DateTime, Utc};
use common::{BookId, Money, OrderId, UserId};
use messages::{OrderLine, QuantityLine};
use serde::{Deserialize, Serialize};

use crate::cart::CartItem;
use crate::status::OrderStatus;

/// One line of an order: an immutable snapshot taken at creation time.
///
/// Title and prices are copied out of the cart view so later catalog
/// changes cannot retroactively alter a placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub book_id: BookId,
    pub title: String,
    pub qty: i64,
    pub unit_price: Money,
    pub line_total: Money,
}

/// A durable order record with its line items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub total: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<OrderItem>,
}

impl Order {
    /// Snapshots a cart into a new `Created` order.
    ///
    /// Line totals and the order total are computed here, once; this is
    /// the single point where cart contents become durable and priced.
    pub fn from_cart(user_id: UserId, cart: &[CartItem]) -> Self {
        let now = Utc::now();
        let items: Vec<OrderItem> = cart
            .iter()
            .map(|item| OrderItem {
                book_id: item.book_id,
                title: item.title.clone(),
                qty: item.qty,
                unit_price: item.unit_price,
                line_total: item.unit_price.times(item.qty),
            })
            .collect();
        let total = items.iter().map(|item| item.line_total).sum();
        Self {
            id: OrderId::new(),
            user_id,
            status: OrderStatus::Created,
            total,
            created_at: now,
            updated_at: now,
            items,
        }
    }

    /// The priced lines as they appear in `order.created`.
    pub fn order_lines(&self) -> Vec<OrderLine> {
        self.items
            .iter()
            .map(|item| OrderLine {
                book_id: item.book_id,
                title: item.title.clone(),
                qty: item.qty,
                unit_cents: item.unit_price,
                line_cents: item.line_total,
            })
            .collect()
    }

    /// Re-derives the `{book_id, qty}` lines for confirm/release signals.
    ///
    /// Reservations are not persisted per order anywhere else; this item
    /// list is the only record of what was held.
    pub fn quantity_lines(&self) -> Vec<QuantityLine> {
        self.items
            .iter()
            .map(|item| QuantityLine {
                book_id: item.book_id,
                qty: item.qty,
            })
            .collect()
    }
}
