//! Stock ledger owned by the Inventory service.
//!
//! The ledger keeps one row per catalog item: `total_qty` physical units
//! owned and `reserved_qty` units provisionally held for in-flight orders.
//! The invariant `0 <= reserved_qty <= total_qty` holds at all times;
//! availability is the difference.
//!
//! Three mutations exist, all atomic across every line of a call:
//! reserve (provisional hold), confirm (units permanently consumed), and
//! release (hold returned, floored at zero). Concurrent reserves on the
//! same item serialize, so the availability check-then-write can never
//! oversell.
//!
//! [`consumer`] wires the ledger into the saga: it reacts to
//! `order.created`, `order.paid`, and `order.cancelled`, guarding the
//! confirm/release side against redelivery with a processed-event ledger.

pub mod consumer;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod processed;
pub mod store;

pub use consumer::InventoryConsumer;
pub use error::StockError;
pub use memory::MemoryStockStore;
pub use postgres::{PostgresProcessedLedger, PostgresStockStore};
pub use processed::{MemoryProcessedLedger, Operation, ProcessedLedger};
pub use store::{StockLevel, StockLine, StockStore};

/// Result type for stock ledger operations.
pub type Result<T> = std::result::Result<T, StockError>;
