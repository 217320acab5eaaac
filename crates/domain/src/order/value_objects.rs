//! Value objects for the order domain.

use common::{Money, ProductId};
use serde::{Deserialize, Serialize};

use super::OrderError;

/// A line item within an order.
///
/// Name and unit price are a snapshot taken from the product when the order
/// was priced; they never follow later product changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    /// 1-based position of the line in the submitted order.
    pub line_no: u32,

    /// The product ID.
    pub product_id: ProductId,

    /// Product name at the time of ordering.
    pub product_name: String,

    /// Quantity ordered.
    pub quantity: u32,

    /// Price per unit at the time of ordering.
    pub unit_price: Money,
}

impl OrderItem {
    /// Creates a new order item. The line number is assigned when the item is
    /// attached to a [`NewOrder`](super::NewOrder).
    pub fn new(
        product_id: ProductId,
        product_name: impl Into<String>,
        quantity: u32,
        unit_price: Money,
    ) -> Self {
        Self {
            line_no: 0,
            product_id,
            product_name: product_name.into(),
            quantity,
            unit_price,
        }
    }

    /// Returns the line total, `unit_price * quantity`.
    ///
    /// Not stored; derived from the snapshot fields. Fails with
    /// [`OrderError::AmountOverflow`] when the product does not fit in cents.
    pub fn total_price(&self) -> Result<Money, OrderError> {
        self.unit_price
            .multiply(self.quantity)
            .ok_or(OrderError::AmountOverflow)
    }
}
