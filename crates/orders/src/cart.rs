//! Cart collaborator interface.
//!
//! The cart service is external: the order service only ever reads it,
//! once, at order creation. The trait keeps the saga logic independent of
//! the transport used to reach the real cart service.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use common::{BookId, Money, UserId};
use thiserror::Error;

/// A cart line with title and price already resolved by the cart service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartItem {
    pub book_id: BookId,
    pub title: String,
    pub qty: i64,
    pub unit_price: Money,
}

/// Errors from the cart collaborator.
#[derive(Debug, Error)]
pub enum CartError {
    /// The cart service could not be reached or answered with an error.
    #[error("cart service unavailable: {0}")]
    Unavailable(String),
}

/// Read access to a user's current cart.
#[async_trait]
pub trait CartClient: Send + Sync {
    /// Returns the user's cart lines. An empty vec is a valid answer
    /// (the user simply has nothing in the cart).
    async fn get_cart(&self, user_id: UserId) -> Result<Vec<CartItem>, CartError>;
}

/// In-memory cart used by the default wiring and tests.
#[derive(Default)]
pub struct MemoryCartClient {
    carts: RwLock<HashMap<UserId, Vec<CartItem>>>,
    unavailable: RwLock<bool>,
}

impl MemoryCartClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces a user's cart contents.
    pub fn set_cart(&self, user_id: UserId, items: Vec<CartItem>) {
        self.carts.write().unwrap().insert(user_id, items);
    }

    /// Empties a user's cart.
    pub fn clear_cart(&self, user_id: UserId) {
        self.carts.write().unwrap().remove(&user_id);
    }

    /// Makes every call fail, for testing the unavailable path.
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.write().unwrap() = unavailable;
    }
}

#[async_trait]
impl CartClient for MemoryCartClient {
    async fn get_cart(&self, user_id: UserId) -> Result<Vec<CartItem>, CartError> {
        if *self.unavailable.read().unwrap() {
            return Err(CartError::Unavailable("cart service down".to_string()));
        }
        Ok(self
            .carts
            .read()
            .unwrap()
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_cart_reads_as_empty() {
        let client = MemoryCartClient::new();
        let items = client.get_cart(UserId::new()).await.unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn set_and_get_cart() {
        let client = MemoryCartClient::new();
        let user = UserId::new();
        client.set_cart(
            user,
            vec![CartItem {
                book_id: BookId::new(7),
                title: "Hyperion".to_string(),
                qty: 1,
                unit_price: Money::from_cents(1250),
            }],
        );
        let items = client.get_cart(user).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Hyperion");
    }

    #[tokio::test]
    async fn unavailable_mode_fails_calls() {
        let client = MemoryCartClient::new();
        client.set_unavailable(true);
        assert!(client.get_cart(UserId::new()).await.is_err());
    }
}
