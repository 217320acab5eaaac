//! Shared identifiers and value types used across the order fulfillment crates.

mod money;
mod types;

pub use money::Money;
pub use types::{CustomerId, OrderId, ParseReservationKeyError, ProductId, ReservationKey};
