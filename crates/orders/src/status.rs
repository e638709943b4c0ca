//! Order state machine.

use serde::{Deserialize, Serialize};

/// The state of an order in its lifecycle.
///
/// State transitions:
/// ```text
/// Created ──┬──► Paid
///           ├──► Failed
///           └──► Cancelled
/// ```
///
/// `Paid`, `Failed`, and `Cancelled` are terminal; once reached, no event
/// may move the order again. There is no persisted "unspecified" value —
/// an order either exists with one of these states or does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Persisted synchronously at creation; the saga is in flight.
    #[default]
    Created,

    /// Payment captured; stock confirm requested (terminal state).
    Paid,

    /// Explicitly rejected by the caller (terminal state).
    Cancelled,

    /// Reservation rejected or payment failed (terminal state).
    Failed,
}

impl OrderStatus {
    /// Returns true if no further transition is permitted.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Paid | OrderStatus::Cancelled | OrderStatus::Failed
        )
    }

    /// Returns true if the order can still be explicitly cancelled.
    pub fn can_cancel(&self) -> bool {
        matches!(self, OrderStatus::Created)
    }

    /// Returns the status name as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "created",
            OrderStatus::Paid => "paid",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Failed => "failed",
        }
    }

    /// Parses a stored status name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(OrderStatus::Created),
            "paid" => Some(OrderStatus::Paid),
            "cancelled" => Some(OrderStatus::Cancelled),
            "failed" => Some(OrderStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_created() {
        assert_eq!(OrderStatus::default(), OrderStatus::Created);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!OrderStatus::Created.is_terminal());
        assert!(OrderStatus::Paid.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Failed.is_terminal());
    }

    #[test]
    fn test_only_created_can_cancel() {
        assert!(OrderStatus::Created.can_cancel());
        assert!(!OrderStatus::Paid.can_cancel());
        assert!(!OrderStatus::Cancelled.can_cancel());
        assert!(!OrderStatus::Failed.can_cancel());
    }

    #[test]
    fn test_display() {
        assert_eq!(OrderStatus::Created.to_string(), "created");
        assert_eq!(OrderStatus::Paid.to_string(), "paid");
        assert_eq!(OrderStatus::Cancelled.to_string(), "cancelled");
        assert_eq!(OrderStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn test_parse_roundtrip() {
        for status in [
            OrderStatus::Created,
            OrderStatus::Paid,
            OrderStatus::Cancelled,
            OrderStatus::Failed,
        ] {
            assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(OrderStatus::parse("draft"), None);
    }

    #[test]
    fn test_serialization() {
        let status = OrderStatus::Paid;
        let json = serde_json::to_string(&status).unwrap();
        assert_eq!(json, "\"paid\"");
        let deserialized: OrderStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(status, deserialized);
    }
}
