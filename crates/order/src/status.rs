use serde::{Deserialize, Serialize};

/// The status of an order in its saga lifecycle.
///
/// Status transitions:
/// ```text
/// Pending ──┬──► Confirmed
///           ├──► Failed ──► Cancelled
///           └──► Cancelled
/// ```
///
/// Confirmed and Cancelled are terminal. Failed is terminal for the saga
/// except for the one compensation acknowledgement: once the product
/// participant confirms reserved stock was released, Failed moves to
/// Cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Saga in progress; the only status from which outcomes branch.
    #[default]
    Pending,

    /// Stock reserved and payment captured (terminal).
    Confirmed,

    /// The saga failed; compensation may still be in flight.
    Failed,

    /// Compensation completed after a failure (terminal).
    Cancelled,
}

impl OrderStatus {
    /// Returns true if the move from `self` to `to` is legal.
    pub fn can_transition_to(&self, to: OrderStatus) -> bool {
        matches!(
            (self, to),
            (
                OrderStatus::Pending,
                OrderStatus::Confirmed | OrderStatus::Failed | OrderStatus::Cancelled
            ) | (OrderStatus::Failed, OrderStatus::Cancelled)
        )
    }

    /// Returns true if no saga-driven transition leaves this status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Confirmed | OrderStatus::Cancelled)
    }

    /// Returns the status name as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Failed => "FAILED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    /// Parses a database status string.
    pub fn parse(s: &str) -> Option<OrderStatus> {
        match s {
            "PENDING" => Some(OrderStatus::Pending),
            "CONFIRMED" => Some(OrderStatus::Confirmed),
            "FAILED" => Some(OrderStatus::Failed),
            "CANCELLED" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
