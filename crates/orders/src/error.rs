use common::OrderId;
use thiserror::Error;

use crate::status::OrderStatus;

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The caller's user id is missing or nil. Never retried.
    #[error("a valid user id is required")]
    InvalidUser,

    /// The caller's cart has no items. Never retried.
    #[error("cart is empty")]
    EmptyCart,

    /// The cart service could not be reached within the deadline.
    #[error("cart service unavailable: {0}")]
    CartUnavailable(String),

    /// No order exists with the given id.
    #[error("order not found: {0}")]
    NotFound(OrderId),

    /// The order is already in a terminal state.
    #[error("order {order_id} is already {status}")]
    TerminalState {
        order_id: OrderId,
        status: OrderStatus,
    },

    /// A database error occurred.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored value could not be decoded (e.g. an unknown status).
    #[error("corrupt order record: {0}")]
    Corrupt(String),
}
