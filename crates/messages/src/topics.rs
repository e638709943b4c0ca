//! Routing keys for the choreography topics.
//!
//! Names follow the `service.event` convention of the broker exchange. The
//! transport only guarantees at-least-once delivery and gives no ordering
//! across topics.

/// Published by Order, consumed by Inventory.
pub const ORDER_CREATED: &str = "order.created";

/// Published by Inventory when a reservation succeeds, consumed by Order.
pub const INVENTORY_RESERVED: &str = "inventory.reserved";

/// Published by Inventory when a reservation is rejected, consumed by Order.
pub const INVENTORY_REJECTED: &str = "inventory.rejected";

/// Published by Order, consumed by Payment.
pub const PAYMENT_CHARGE_REQUESTED: &str = "payment.charge.requested";

/// Published by Payment, consumed by Order.
pub const PAYMENT_SUCCEEDED: &str = "payment.succeeded";

/// Published by Payment, consumed by Order.
pub const PAYMENT_FAILED: &str = "payment.failed";

/// Published by Order when it reaches `Paid`, consumed by Inventory
/// (confirm the reservation).
pub const ORDER_PAID: &str = "order.paid";

/// Published by Order on cancellation, consumed by Inventory (release the
/// reservation).
pub const ORDER_CANCELLED: &str = "order.cancelled";
