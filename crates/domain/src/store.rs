use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CustomerId, OrderId};

use crate::{NewOrder, Order, OrderStatus, Result};

/// Durable storage for orders and their line items.
///
/// Every status change is a single-record atomic update. Listings are ordered
/// newest first.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists a new order in `Pending` status and assigns its ID.
    async fn create(&self, order: NewOrder) -> Result<Order>;

    /// Returns an order by ID.
    async fn get(&self, id: OrderId) -> Result<Option<Order>>;

    /// Returns every order, newest first.
    async fn list_all(&self) -> Result<Vec<Order>>;

    /// Returns a customer's orders, newest first.
    async fn list_by_customer(&self, customer_id: &CustomerId) -> Result<Vec<Order>>;

    /// Sets the status unconditionally. Returns false if the order does not
    /// exist.
    async fn update_status(&self, id: OrderId, status: OrderStatus) -> Result<bool>;

    /// Sets the status only if it currently equals `from`.
    ///
    /// Returns false if the order does not exist or is in another status.
    async fn transition_status(&self, id: OrderId, from: OrderStatus, to: OrderStatus)
    -> Result<bool>;

    /// Returns `Pending` orders created before `older_than`, oldest first.
    async fn list_stale_pending(&self, older_than: DateTime<Utc>) -> Result<Vec<Order>>;
}
