//! Messages exchanged with the inventory service over the channel.

use common::{OrderId, ProductId, ReservationKey};
use serde::{Deserialize, Serialize};

/// Topic carrying [`StockUpdateEvent`]s from the order saga to inventory.
pub const STOCK_UPDATES_TOPIC: &str = "stock-updates";

/// "This many units were committed against this product."
///
/// Emitted once per reserved order line after the saga's reservations all
/// succeeded. The key ties the event to the reservation that was already
/// applied synchronously, so the consumer can recognise it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockUpdateEvent {
    pub product_id: ProductId,
    pub quantity: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reservation_key: Option<ReservationKey>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<OrderId>,
}

impl StockUpdateEvent {
    /// Creates an event for a keyed reservation of an order line.
    pub fn for_reservation(
        order_id: OrderId,
        product_id: ProductId,
        quantity: u32,
        key: ReservationKey,
    ) -> Self {
        Self {
            product_id,
            quantity,
            reservation_key: Some(key),
            order_id: Some(order_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let event = StockUpdateEvent::for_reservation(
            OrderId::new(7),
            ProductId::new(3),
            2,
            ReservationKey::for_line(OrderId::new(7), 1),
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "product_id": 3,
                "quantity": 2,
                "reservation_key": "7:1",
                "order_id": 7
            })
        );
    }

    #[test]
    fn test_keyless_event_is_accepted() {
        let event: StockUpdateEvent =
            serde_json::from_value(serde_json::json!({"product_id": 3, "quantity": 2})).unwrap();
        assert_eq!(event.reservation_key, None);
        assert_eq!(event.order_id, None);
    }
}
