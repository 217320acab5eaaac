//! Order records and related types.

mod model;
mod state;
mod value_objects;

pub use model::{NewOrder, Order};
pub use state::OrderStatus;
pub use value_objects::OrderItem;

use thiserror::Error;

/// Errors that can occur when building or updating orders.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Order has no items.
    #[error("Order has no items")]
    NoItems,

    /// Order has more lines than can be numbered.
    #[error("Order has too many items")]
    TooManyItems,

    /// Invalid quantity.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    /// A line total or the order total does not fit in the money range.
    #[error("Order amount is too large")]
    AmountOverflow,

    /// The status name is not recognised.
    #[error("Unknown order status: '{0}'")]
    UnknownStatus(String),
}
