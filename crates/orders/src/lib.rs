//! Order ledger and state machine owned by the Order service.
//!
//! An order is born `Created` when the caller's cart is snapshotted into
//! immutable, priced line items. From there the choreography drives it:
//! a reservation rejection or payment failure makes it `Failed`, a
//! successful payment makes it `Paid`, and an explicit rejection makes it
//! `Cancelled`. All three are terminal; nothing transitions out of them.
//!
//! The reactions themselves live in [`choreography`] as a pure function
//! over `(order, event)`, so the whole transition table is testable
//! without a bus or a store.

pub mod cart;
pub mod choreography;
pub mod consumer;
pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod service;
pub mod status;
pub mod store;

pub use cart::{CartClient, CartError, CartItem, MemoryCartClient};
pub use choreography::{react, InboundEvent, OutboundMessage, Reaction, ReleasePolicy};
pub use consumer::OrderConsumer;
pub use error::OrderError;
pub use memory::MemoryOrderStore;
pub use model::{Order, OrderItem};
pub use postgres::PostgresOrderStore;
pub use service::OrderService;
pub use status::OrderStatus;
pub use store::{OrderStore, UpdateOutcome};

/// Result type for order operations.
pub type Result<T> = std::result::Result<T, OrderError>;
