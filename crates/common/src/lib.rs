//! Shared primitive types for the bookstore services.
//!
//! Every crate in the workspace speaks in terms of these identifiers and
//! the integer-cents [`Money`] type, so amounts and ids never get mixed up
//! across service boundaries.

pub mod money;
pub mod types;

pub use money::Money;
pub use types::{BookId, OrderId, UserId};
