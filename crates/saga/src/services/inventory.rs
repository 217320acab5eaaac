//! Inventory client used by the saga, in-process or over HTTP.

use std::sync::Arc;

use async_trait::async_trait;
use common::{ProductId, ReservationKey};
use inventory::{InventoryError, InventoryService, InventoryStore, Product};
use reqwest::StatusCode;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};

use crate::caller::{Caller, USER_ID_HEADER, USER_ROLE_HEADER};
use crate::error::{Result, SagaError};

/// The inventory operations the order saga depends on.
///
/// Every call is made on behalf of a [`Caller`] whose identity and credential
/// implementations forward unchanged. Reserve and release never fail for a missing product; that is
/// reported as `false` or a no-op.
#[async_trait]
pub trait InventoryClient: Send + Sync {
    /// Returns a product, or `None` if it does not exist.
    async fn get_product(&self, caller: &Caller, id: ProductId) -> Result<Option<Product>>;

    /// Advisory check; does not reserve.
    async fn check_availability(
        &self,
        caller: &Caller,
        id: ProductId,
        quantity: u32,
    ) -> Result<bool>;

    /// Atomically reserves `quantity` units under `key`. Returns true if the
    /// reservation is in effect after the call.
    async fn reserve_stock(
        &self,
        caller: &Caller,
        id: ProductId,
        quantity: u32,
        key: &ReservationKey,
    ) -> Result<bool>;

    /// Releases the reservation made under `key`.
    async fn release_stock(
        &self,
        caller: &Caller,
        id: ProductId,
        quantity: u32,
        key: &ReservationKey,
    ) -> Result<()>;
}

fn inventory_failure(error: InventoryError) -> SagaError {
    SagaError::InventoryService(error.to_string())
}

/// Calls an in-process [`InventoryService`].
///
/// There is no request layer in between, so the caller has already been
/// authorized by the request that started the saga.
pub struct LocalInventoryClient<S: InventoryStore + ?Sized> {
    service: InventoryService<S>,
}

impl<S: InventoryStore + ?Sized> LocalInventoryClient<S> {
    pub fn new(service: InventoryService<S>) -> Self {
        Self { service }
    }

    pub fn from_store(store: Arc<S>) -> Self {
        Self::new(InventoryService::new(store))
    }

    pub fn service(&self) -> &InventoryService<S> {
        &self.service
    }
}

#[async_trait]
impl<S: InventoryStore + ?Sized + 'static> InventoryClient for LocalInventoryClient<S> {
    async fn get_product(
        &self,
        _caller: &Caller,
        id: ProductId,
    ) -> Result<Option<Product>> {
        match self.service.get_product(id).await {
            Ok(product) => Ok(Some(product)),
            Err(InventoryError::ProductNotFound(_)) => Ok(None),
            Err(e) => Err(inventory_failure(e)),
        }
    }

    async fn check_availability(
        &self,
        _caller: &Caller,
        id: ProductId,
        quantity: u32,
    ) -> Result<bool> {
        self.service
            .check_availability(id, quantity)
            .await
            .map_err(inventory_failure)
    }

    async fn reserve_stock(
        &self,
        _caller: &Caller,
        id: ProductId,
        quantity: u32,
        key: &ReservationKey,
    ) -> Result<bool> {
        let outcome = self
            .service
            .reserve_stock(id, quantity, Some(key))
            .await
            .map_err(inventory_failure)?;
        Ok(outcome.is_success())
    }

    async fn release_stock(
        &self,
        _caller: &Caller,
        id: ProductId,
        quantity: u32,
        key: &ReservationKey,
    ) -> Result<()> {
        self.service
            .release_stock(id, quantity, Some(key))
            .await
            .map_err(inventory_failure)?;
        Ok(())
    }
}

/// Request body for the stock reserve and release endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovementRequest {
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reservation_key: Option<ReservationKey>,
}

/// Response body of the availability check endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityResponse {
    pub is_available: bool,
}

/// Calls a remote inventory service through its HTTP API.
///
/// The caller's identity goes in the `x-user-id` and `x-user-role` headers and
/// its credential, verbatim, in `Authorization`.
#[derive(Debug, Clone)]
pub struct HttpInventoryClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpInventoryClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    fn product_url(&self, id: ProductId) -> String {
        format!("{}/api/stock/products/{}", self.base_url, id)
    }

    fn authorize(request: reqwest::RequestBuilder, caller: &Caller) -> reqwest::RequestBuilder {
        let request = request
            .header(USER_ID_HEADER, caller.customer_id.as_str())
            .header(USER_ROLE_HEADER, caller.role.as_str());
        match caller.credential() {
            Some(value) => request.header(AUTHORIZATION, value),
            None => request,
        }
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        caller: &Caller,
    ) -> Result<reqwest::Response> {
        Self::authorize(request, caller)
            .send()
            .await
            .map_err(|e| SagaError::InventoryService(e.to_string()))
    }

    fn unexpected(response: &reqwest::Response) -> SagaError {
        SagaError::InventoryService(format!(
            "unexpected status {} from {}",
            response.status(),
            response.url()
        ))
    }
}

#[async_trait]
impl InventoryClient for HttpInventoryClient {
    async fn get_product(
        &self,
        caller: &Caller,
        id: ProductId,
    ) -> Result<Option<Product>> {
        let response = self
            .send(self.client.get(self.product_url(id)), caller)
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response
                .json::<Product>()
                .await
                .map(Some)
                .map_err(|e| SagaError::InventoryService(e.to_string())),
            _ => Err(Self::unexpected(&response)),
        }
    }

    async fn check_availability(
        &self,
        caller: &Caller,
        id: ProductId,
        quantity: u32,
    ) -> Result<bool> {
        let url = format!("{}/stock/check/{}", self.product_url(id), quantity);
        let response = self.send(self.client.get(url), caller).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => response
                .json::<AvailabilityResponse>()
                .await
                .map(|body| body.is_available)
                .map_err(|e| SagaError::InventoryService(e.to_string())),
            _ => Err(Self::unexpected(&response)),
        }
    }

    async fn reserve_stock(
        &self,
        caller: &Caller,
        id: ProductId,
        quantity: u32,
        key: &ReservationKey,
    ) -> Result<bool> {
        let body = StockMovementRequest {
            quantity,
            reservation_key: Some(key.clone()),
        };
        let url = format!("{}/stock/reserve", self.product_url(id));
        let response = self
            .send(self.client.post(url).json(&body), caller)
            .await?;

        match response.status() {
            StatusCode::CONFLICT | StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            _ => Err(Self::unexpected(&response)),
        }
    }

    async fn release_stock(
        &self,
        caller: &Caller,
        id: ProductId,
        quantity: u32,
        key: &ReservationKey,
    ) -> Result<()> {
        let body = StockMovementRequest {
            quantity,
            reservation_key: Some(key.clone()),
        };
        let url = format!("{}/stock/release", self.product_url(id));
        let response = self
            .send(self.client.post(url).json(&body), caller)
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(()),
            status if status.is_success() => Ok(()),
            _ => Err(Self::unexpected(&response)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Money, OrderId};
    use inventory::{InMemoryInventoryStore, NewProduct};

    fn alice() -> Caller {
        Caller::customer("alice")
    }

    async fn client_with_stock(quantity: u32) -> (LocalInventoryClient<InMemoryInventoryStore>, ProductId) {
        let client = LocalInventoryClient::from_store(Arc::new(InMemoryInventoryStore::new()));
        let product = client
            .service()
            .create_product(NewProduct {
                name: "Widget".to_string(),
                description: String::new(),
                unit_price: Money::from_cents(500),
                quantity_on_hand: quantity,
            })
            .await
            .unwrap();
        (client, product.id)
    }

    #[tokio::test]
    async fn test_local_missing_product_is_none() {
        let (client, _) = client_with_stock(1).await;
        let product = client.get_product(&alice(), ProductId::new(42)).await.unwrap();
        assert!(product.is_none());
    }

    #[tokio::test]
    async fn test_local_reserve_is_idempotent_per_key() {
        let (client, id) = client_with_stock(5).await;
        let key = ReservationKey::for_line(OrderId::new(1), 1);

        assert!(client.reserve_stock(&alice(), id, 3, &key).await.unwrap());
        assert!(client.reserve_stock(&alice(), id, 3, &key).await.unwrap());

        let product = client.get_product(&alice(), id).await.unwrap().unwrap();
        assert_eq!(product.quantity_on_hand, 2);
    }

    #[tokio::test]
    async fn test_local_reserve_reports_short_stock_as_false() {
        let (client, id) = client_with_stock(1).await;
        let key = ReservationKey::for_line(OrderId::new(1), 1);
        assert!(!client.reserve_stock(&alice(), id, 2, &key).await.unwrap());
        assert!(
            !client
                .reserve_stock(&alice(), ProductId::new(99), 1, &key)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_local_release_restores_stock() {
        let (client, id) = client_with_stock(4).await;
        let key = ReservationKey::for_line(OrderId::new(3), 1);
        client.reserve_stock(&alice(), id, 4, &key).await.unwrap();
        client.release_stock(&alice(), id, 4, &key).await.unwrap();
        client.release_stock(&alice(), id, 4, &key).await.unwrap();

        let product = client.get_product(&alice(), id).await.unwrap().unwrap();
        assert_eq!(product.quantity_on_hand, 4);
    }

    #[test]
    fn test_stock_movement_wire_format() {
        let body = StockMovementRequest {
            quantity: 2,
            reservation_key: Some(ReservationKey::for_line(OrderId::new(5), 2)),
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({"quantity": 2, "reservation_key": "5:2"})
        );

        let unkeyed: StockMovementRequest =
            serde_json::from_value(serde_json::json!({"quantity": 1})).unwrap();
        assert_eq!(unkeyed.reservation_key, None);
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let client = HttpInventoryClient::new("http://inventory:8080/");
        assert_eq!(
            client.product_url(ProductId::new(3)),
            "http://inventory:8080/api/stock/products/3"
        );
    }
}
