use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CustomerId, OrderId};
use tokio::sync::RwLock;

use crate::{DomainError, NewOrder, Order, OrderStatus, OrderStore, Result};

#[derive(Debug, Default)]
struct InMemoryOrderState {
    orders: BTreeMap<OrderId, Order>,
    next_id: i64,
    fail_on_create: bool,
}

/// In-memory order store for testing and single-process deployments.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderStore {
    state: Arc<RwLock<InMemoryOrderState>>,
}

impl InMemoryOrderStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the store to fail on create (for testing).
    pub async fn set_fail_on_create(&self, fail: bool) {
        self.state.write().await.fail_on_create = fail;
    }

    /// Returns the number of stored orders.
    pub async fn len(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Returns true if no orders are stored.
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.orders.is_empty()
    }

    /// Overwrites an order's creation time (for testing stale-order sweeps).
    pub async fn backdate(&self, id: OrderId, created_at: DateTime<Utc>) {
        if let Some(order) = self.state.write().await.orders.get_mut(&id) {
            order.created_at = created_at;
        }
    }

    fn newest_first(mut orders: Vec<Order>) -> Vec<Order> {
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        orders
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create(&self, order: NewOrder) -> Result<Order> {
        let mut state = self.state.write().await;
        if state.fail_on_create {
            return Err(DomainError::Unavailable(
                "order store rejected the write".to_string(),
            ));
        }

        state.next_id += 1;
        let order = order.into_order(OrderId::new(state.next_id), Utc::now());
        state.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn list_all(&self) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        Ok(Self::newest_first(state.orders.values().cloned().collect()))
    }

    async fn list_by_customer(&self, customer_id: &CustomerId) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        Ok(Self::newest_first(
            state
                .orders
                .values()
                .filter(|o| o.is_owned_by(customer_id))
                .cloned()
                .collect(),
        ))
    }

    async fn update_status(&self, id: OrderId, status: OrderStatus) -> Result<bool> {
        let mut state = self.state.write().await;
        Ok(state
            .orders
            .get_mut(&id)
            .map(|order| {
                order.status = status;
                order.updated_at = Utc::now();
            })
            .is_some())
    }

    async fn transition_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.orders.get_mut(&id) {
            Some(order) if order.status == from => {
                order.status = to;
                order.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_stale_pending(&self, older_than: DateTime<Utc>) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        let mut stale: Vec<Order> = state
            .orders
            .values()
            .filter(|o| !o.status.is_settled() && o.created_at < older_than)
            .cloned()
            .collect();
        stale.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(stale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OrderItem;
    use common::{Money, ProductId};

    fn new_order(customer: &str) -> NewOrder {
        NewOrder::new(
            CustomerId::from(customer),
            vec![OrderItem::new(
                ProductId::new(1),
                "Widget",
                1,
                Money::from_cents(100),
            )],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_assigns_ids_and_pending_status() {
        let store = InMemoryOrderStore::new();
        let first = store.create(new_order("alice")).await.unwrap();
        let second = store.create(new_order("alice")).await.unwrap();

        assert_eq!(first.id, OrderId::new(1));
        assert_eq!(second.id, OrderId::new(2));
        assert_eq!(first.status, OrderStatus::Pending);
        assert_eq!(store.get(first.id).await.unwrap(), Some(first));
    }

    #[tokio::test]
    async fn test_lists_are_newest_first() {
        let store = InMemoryOrderStore::new();
        let a = store.create(new_order("alice")).await.unwrap();
        let b = store.create(new_order("bob")).await.unwrap();
        let c = store.create(new_order("alice")).await.unwrap();

        let all: Vec<OrderId> = store.list_all().await.unwrap().iter().map(|o| o.id).collect();
        assert_eq!(all, vec![c.id, b.id, a.id]);

        let alice: Vec<OrderId> = store
            .list_by_customer(&CustomerId::from("alice"))
            .await
            .unwrap()
            .iter()
            .map(|o| o.id)
            .collect();
        assert_eq!(alice, vec![c.id, a.id]);
    }

    #[tokio::test]
    async fn test_update_status_is_unconditional() {
        let store = InMemoryOrderStore::new();
        let order = store.create(new_order("alice")).await.unwrap();

        assert!(store.update_status(order.id, OrderStatus::Delivered).await.unwrap());
        assert!(store.update_status(order.id, OrderStatus::Pending).await.unwrap());
        assert!(!store.update_status(OrderId::new(99), OrderStatus::Shipped).await.unwrap());
    }

    #[tokio::test]
    async fn test_transition_status_compares_first() {
        let store = InMemoryOrderStore::new();
        let order = store.create(new_order("alice")).await.unwrap();

        assert!(
            store
                .transition_status(order.id, OrderStatus::Pending, OrderStatus::Confirmed)
                .await
                .unwrap()
        );
        assert!(
            !store
                .transition_status(order.id, OrderStatus::Pending, OrderStatus::Cancelled)
                .await
                .unwrap()
        );
        let stored = store.get(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_stale_pending_orders() {
        let store = InMemoryOrderStore::new();
        let old = store.create(new_order("alice")).await.unwrap();
        let fresh = store.create(new_order("alice")).await.unwrap();
        let settled = store.create(new_order("alice")).await.unwrap();

        let an_hour_ago = Utc::now() - chrono::Duration::hours(1);
        store.backdate(old.id, an_hour_ago).await;
        store.backdate(settled.id, an_hour_ago).await;
        store
            .update_status(settled.id, OrderStatus::Confirmed)
            .await
            .unwrap();

        let cutoff = Utc::now() - chrono::Duration::minutes(5);
        let stale = store.list_stale_pending(cutoff).await.unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, old.id);
        assert_ne!(stale[0].id, fresh.id);
    }

    #[tokio::test]
    async fn test_fail_on_create() {
        let store = InMemoryOrderStore::new();
        store.set_fail_on_create(true).await;
        let result = store.create(new_order("alice")).await;
        assert!(matches!(result, Err(DomainError::Unavailable(_))));
        assert!(store.is_empty().await);
    }
}
