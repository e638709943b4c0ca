//! Payment service: charges orders and remembers the outcome.
//!
//! The service is a consumer of `payment.charge.requested`. Every charge
//! request first lands as a `pending` record; the provider is only called
//! when that record is not already settled, which is what keeps a
//! redelivered request from charging the customer twice. Settled outcomes
//! are re-announced verbatim instead.

pub mod consumer;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod provider;
pub mod store;

pub use consumer::PaymentConsumer;
pub use error::PaymentError;
pub use memory::MemoryPaymentStore;
pub use postgres::PostgresPaymentStore;
pub use provider::{ChargeOutcome, FakeProvider, PaymentProvider};
pub use store::{PaymentRecord, PaymentState, PaymentStore};

/// Result type for payment operations.
pub type Result<T> = std::result::Result<T, PaymentError>;
