//! Asynchronous consumer of stock-update events.

use async_trait::async_trait;
use messaging::{HandlerError, MessageHandler};

use crate::{InventoryService, InventoryStore, ReserveOutcome, StockUpdateEvent};

/// Applies [`StockUpdateEvent`]s delivered on the stock-updates topic.
///
/// An event is the echo of a reservation the saga already made synchronously.
/// The consumer replays it as a keyed reservation, which is a no-op when the
/// key was applied (or released) before, so a sale decrements stock once no
/// matter how often its event is delivered. Events without a key cannot be
/// matched to a reservation and are treated as informational.
pub struct StockUpdateConsumer<S: InventoryStore + ?Sized> {
    inventory: InventoryService<S>,
}

impl<S: InventoryStore + ?Sized> StockUpdateConsumer<S> {
    /// Creates a consumer applying events through `inventory`.
    pub fn new(inventory: InventoryService<S>) -> Self {
        Self { inventory }
    }
}

#[async_trait]
impl<S: InventoryStore + ?Sized + 'static> MessageHandler<StockUpdateEvent>
    for StockUpdateConsumer<S>
{
    #[tracing::instrument(skip(self, event), fields(product_id = %event.product_id, quantity = event.quantity))]
    async fn handle(&self, event: StockUpdateEvent) -> Result<(), HandlerError> {
        let Some(key) = event.reservation_key.as_ref() else {
            tracing::info!("Stock update without reservation key, nothing to apply");
            return Ok(());
        };

        let outcome = self
            .inventory
            .reserve_stock(event.product_id, event.quantity, Some(key))
            .await?;

        match outcome {
            ReserveOutcome::AlreadyApplied | ReserveOutcome::AlreadyReleased => {
                tracing::debug!(reservation_key = %key, outcome = outcome.as_str(), "Stock update already settled");
            }
            ReserveOutcome::Reserved => {
                tracing::warn!(reservation_key = %key, "Stock update applied a reservation the saga had not");
            }
            // Retrying cannot change these; acknowledge and leave a trace.
            ReserveOutcome::InsufficientStock | ReserveOutcome::ProductNotFound => {
                tracing::warn!(reservation_key = %key, outcome = outcome.as_str(), "Stock update could not be applied");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use common::{Money, OrderId, ReservationKey};
    use messaging::{
        ConsumerOptions, InMemoryChannel, MessageChannel, MessageChannelExt, drain,
    };

    use super::*;
    use crate::{InMemoryInventoryStore, NewProduct, STOCK_UPDATES_TOPIC};

    async fn setup(quantity: u32) -> (InventoryService<InMemoryInventoryStore>, common::ProductId) {
        let inventory = InventoryService::new(Arc::new(InMemoryInventoryStore::new()));
        let product = inventory
            .create_product(NewProduct {
                name: "Widget".to_string(),
                description: String::new(),
                unit_price: Money::from_cents(1000),
                quantity_on_hand: quantity,
            })
            .await
            .unwrap();
        (inventory, product.id)
    }

    #[tokio::test]
    async fn test_event_for_applied_reservation_does_not_decrement_again() {
        let (inventory, product_id) = setup(10).await;
        let key = ReservationKey::for_line(OrderId::new(1), 1);
        inventory
            .reserve_stock(product_id, 3, Some(&key))
            .await
            .unwrap();

        let channel = InMemoryChannel::new();
        let event = StockUpdateEvent::for_reservation(OrderId::new(1), product_id, 3, key);
        // Same event delivered twice
        channel.publish(STOCK_UPDATES_TOPIC, &event).await.unwrap();
        channel.publish(STOCK_UPDATES_TOPIC, &event).await.unwrap();

        let consumer = StockUpdateConsumer::new(inventory.clone());
        let handled = drain(&channel, STOCK_UPDATES_TOPIC, &consumer, &ConsumerOptions::default())
            .await
            .unwrap();

        assert_eq!(handled, 2);
        assert_eq!(channel.pending_count(STOCK_UPDATES_TOPIC).await.unwrap(), 0);
        let product = inventory.get_product(product_id).await.unwrap();
        assert_eq!(product.quantity_on_hand, 7);
    }

    #[tokio::test]
    async fn test_keyless_event_is_informational() {
        let (inventory, product_id) = setup(10).await;
        let consumer = StockUpdateConsumer::new(inventory.clone());

        consumer
            .handle(StockUpdateEvent {
                product_id,
                quantity: 4,
                reservation_key: None,
                order_id: None,
            })
            .await
            .unwrap();

        let product = inventory.get_product(product_id).await.unwrap();
        assert_eq!(product.quantity_on_hand, 10);
    }

    #[tokio::test]
    async fn test_event_for_released_reservation_is_ignored() {
        let (inventory, product_id) = setup(10).await;
        let key = ReservationKey::for_line(OrderId::new(2), 1);
        inventory
            .release_stock(product_id, 3, Some(&key))
            .await
            .unwrap();

        let consumer = StockUpdateConsumer::new(inventory.clone());
        consumer
            .handle(StockUpdateEvent::for_reservation(
                OrderId::new(2),
                product_id,
                3,
                key,
            ))
            .await
            .unwrap();

        let product = inventory.get_product(product_id).await.unwrap();
        assert_eq!(product.quantity_on_hand, 10);
    }
}
