//! Order status.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::OrderError;

/// The status of an order in its lifecycle.
///
/// The fulfillment saga drives orders out of `Pending`:
/// ```text
/// Pending ──┬──► Confirmed ──► Shipped ──► Delivered
///           └──► Cancelled
/// ```
/// Later transitions are administrative and not enforced; any status may be
/// set from any other through a status update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    /// Persisted, stock reservation in progress.
    #[default]
    Pending,

    /// All stock reserved (saga success).
    Confirmed,

    /// Rejected or cancelled (saga failure, or cancelled later).
    Cancelled,

    /// Handed to the carrier.
    Shipped,

    /// Received by the customer.
    Delivered,
}

impl OrderStatus {
    /// Every known status.
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Cancelled,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
    ];

    /// Returns true if the saga has finished with this order.
    pub fn is_settled(&self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Confirmed => "Confirmed",
            OrderStatus::Cancelled => "Cancelled",
            OrderStatus::Shipped => "Shipped",
            OrderStatus::Delivered => "Delivered",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = OrderError;

    /// Parses a status name, ignoring case and surrounding whitespace.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| OrderError::UnknownStatus(s.to_string()))
    }
}
