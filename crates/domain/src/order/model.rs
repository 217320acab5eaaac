//! Persisted order records.

use chrono::{DateTime, Utc};
use common::{CustomerId, Money, OrderId, ReservationKey};
use serde::{Deserialize, Serialize};

use super::{OrderError, OrderItem, OrderStatus};

/// A priced order ready to be persisted in `Pending` status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    customer_id: CustomerId,
    items: Vec<OrderItem>,
    total_amount: Money,
}

impl NewOrder {
    /// Builds an order from priced items in submission order.
    ///
    /// Line numbers are assigned from the item positions, starting at 1, and
    /// the total is computed once here.
    pub fn new(customer_id: CustomerId, items: Vec<OrderItem>) -> Result<Self, OrderError> {
        if items.is_empty() {
            return Err(OrderError::NoItems);
        }

        let mut numbered = Vec::with_capacity(items.len());
        for (index, mut item) in items.into_iter().enumerate() {
            if item.quantity == 0 {
                return Err(OrderError::InvalidQuantity {
                    quantity: item.quantity,
                });
            }
            item.line_no = u32::try_from(index + 1).map_err(|_| OrderError::TooManyItems)?;
            numbered.push(item);
        }

        let line_totals = numbered
            .iter()
            .map(OrderItem::total_price)
            .collect::<Result<Vec<_>, _>>()?;
        let total_amount = Money::checked_sum(line_totals).ok_or(OrderError::AmountOverflow)?;
        Ok(Self {
            customer_id,
            items: numbered,
            total_amount,
        })
    }

    /// Returns the customer placing the order.
    pub fn customer_id(&self) -> &CustomerId {
        &self.customer_id
    }

    /// Returns the line items.
    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    /// Returns the total amount.
    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    /// Converts into a stored order with the given identity.
    pub fn into_order(self, id: OrderId, created_at: DateTime<Utc>) -> Order {
        Order {
            id,
            customer_id: self.customer_id,
            created_at,
            updated_at: created_at,
            status: OrderStatus::Pending,
            total_amount: self.total_amount,
            items: self.items,
        }
    }
}

/// A persisted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: OrderStatus,
    pub total_amount: Money,
    pub items: Vec<OrderItem>,
}

impl Order {
    /// Returns the reservation key of each line, in line order.
    pub fn reservation_keys(&self) -> impl Iterator<Item = (&OrderItem, ReservationKey)> {
        self.items
            .iter()
            .map(|item| (item, ReservationKey::for_line(self.id, item.line_no)))
    }

    /// Returns true if the order belongs to `customer_id`.
    pub fn is_owned_by(&self, customer_id: &CustomerId) -> bool {
        &self.customer_id == customer_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::ProductId;

    fn items() -> Vec<OrderItem> {
        vec![
            OrderItem::new(ProductId::new(1), "Widget", 2, Money::from_cents(1000)),
            OrderItem::new(ProductId::new(2), "Gadget", 1, Money::from_cents(550)),
        ]
    }

    #[test]
    fn test_new_order_numbers_lines_and_totals() {
        let order = NewOrder::new(CustomerId::from("alice"), items()).unwrap();
        assert_eq!(order.items()[0].line_no, 1);
        assert_eq!(order.items()[1].line_no, 2);
        assert_eq!(order.total_amount(), Money::from_cents(2550));
    }

    #[test]
    fn test_new_order_requires_items() {
        let result = NewOrder::new(CustomerId::from("alice"), Vec::new());
        assert!(matches!(result, Err(OrderError::NoItems)));
    }

    #[test]
    fn test_new_order_rejects_zero_quantity() {
        let mut lines = items();
        lines[1].quantity = 0;
        let result = NewOrder::new(CustomerId::from("alice"), lines);
        assert!(matches!(
            result,
            Err(OrderError::InvalidQuantity { quantity: 0 })
        ));
    }

    #[test]
    fn test_new_order_rejects_overflowing_total() {
        let lines = vec![
            OrderItem::new(ProductId::new(1), "Yacht", 1, Money::from_cents(i64::MAX / 2)),
            OrderItem::new(ProductId::new(2), "Yacht", 2, Money::from_cents(i64::MAX / 2)),
        ];
        let result = NewOrder::new(CustomerId::from("alice"), lines);
        assert!(matches!(result, Err(OrderError::AmountOverflow)));

        let line = vec![OrderItem::new(ProductId::new(1), "Yacht", 3, Money::from_cents(i64::MAX / 2))];
        let result = NewOrder::new(CustomerId::from("alice"), line);
        assert!(matches!(result, Err(OrderError::AmountOverflow)));
    }

    #[test]
    fn test_reservation_keys_follow_lines() {
        let order = NewOrder::new(CustomerId::from("alice"), items())
            .unwrap()
            .into_order(OrderId::new(9), Utc::now());

        let keys: Vec<String> = order
            .reservation_keys()
            .map(|(_, key)| key.to_string())
            .collect();
        assert_eq!(keys, vec!["9:1", "9:2"]);
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(order.is_owned_by(&CustomerId::from("alice")));
        assert!(!order.is_owned_by(&CustomerId::from("bob")));
    }
}
