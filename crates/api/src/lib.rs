//! HTTP API server for order fulfillment and inventory.
//!
//! Provides REST endpoints for orders (`/api/orders`) and the product
//! catalogue (`/api/stock/products`), with structured logging (tracing) and
//! Prometheus metrics.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use domain::{InMemoryOrderStore, OrderStore, PostgresOrderStore};
use inventory::{InMemoryInventoryStore, InventoryService, InventoryStore, PostgresInventoryStore};
use messaging::{InMemoryChannel, MessageChannel, PostgresChannel};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{HttpInventoryClient, InventoryClient, LocalInventoryClient, OrderSaga, SagaOptions};
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// The saga as wired by the server, over trait objects.
pub type Saga = OrderSaga<dyn OrderStore, dyn InventoryClient, dyn MessageChannel>;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub saga: Saga,
    pub inventory: InventoryService<dyn InventoryStore>,
    pub channel: Arc<dyn MessageChannel>,
}

/// Storage shared by the handlers and the background tasks.
#[derive(Clone)]
pub struct Backends {
    pub orders: Arc<dyn OrderStore>,
    pub products: Arc<dyn InventoryStore>,
    pub channel: Arc<dyn MessageChannel>,
}

impl Backends {
    /// In-memory stores and channel; nothing survives a restart.
    pub fn in_memory() -> Self {
        Self {
            orders: Arc::new(InMemoryOrderStore::new()),
            products: Arc::new(InMemoryInventoryStore::new()),
            channel: Arc::new(InMemoryChannel::new()),
        }
    }

    /// PostgreSQL stores and channel over one pool. Applies pending
    /// migrations first.
    pub async fn postgres(pool: PgPool) -> inventory::Result<Self> {
        let products = PostgresInventoryStore::new(pool.clone());
        products.run_migrations().await?;

        Ok(Self {
            orders: Arc::new(PostgresOrderStore::new(pool.clone())),
            products: Arc::new(products),
            channel: Arc::new(PostgresChannel::new(pool)),
        })
    }

    /// Returns the inventory client the saga should use: remote when a base
    /// URL is given, otherwise the local product store.
    pub fn inventory_client(&self, base_url: Option<&str>) -> Arc<dyn InventoryClient> {
        match base_url {
            Some(url) => Arc::new(HttpInventoryClient::new(url)),
            None => Arc::new(LocalInventoryClient::from_store(Arc::clone(&self.products))),
        }
    }
}

/// Builds the application state over `backends`.
pub fn create_state(
    backends: &Backends,
    inventory_client: Arc<dyn InventoryClient>,
    options: SagaOptions,
) -> Arc<AppState> {
    let saga = OrderSaga::with_options(
        Arc::clone(&backends.orders),
        inventory_client,
        Arc::clone(&backends.channel),
        options,
    );

    Arc::new(AppState {
        saga,
        inventory: InventoryService::new(Arc::clone(&backends.products)),
        channel: Arc::clone(&backends.channel),
    })
}

/// Creates in-memory state with the in-process inventory client.
pub fn create_default_state() -> (Arc<AppState>, Backends) {
    let backends = Backends::in_memory();
    let client = backends.inventory_client(None);
    let state = create_state(&backends, client, SagaOptions::default());
    (state, backends)
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    use routes::{ops, orders, products};

    let metrics_router = Router::new()
        .route("/metrics", get(ops::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(ops::health))
        .route("/api/orders", post(orders::create).get(orders::list_all))
        .route("/api/orders/my-orders", get(orders::list_mine))
        .route(
            "/api/orders/customer/{customer_id}",
            get(orders::list_by_customer),
        )
        .route("/api/orders/{id}", get(orders::get))
        .route("/api/orders/{id}/status", put(orders::update_status))
        .route("/api/orders/{id}/cancel", put(orders::cancel))
        .route(
            "/api/stock/products",
            get(products::list).post(products::create),
        )
        .route(
            "/api/stock/products/{id}",
            get(products::get)
                .put(products::update)
                .delete(products::delete),
        )
        .route(
            "/api/stock/products/{id}/stock/check/{quantity}",
            get(products::check_stock),
        )
        .route("/api/stock/products/{id}/stock", put(products::set_stock))
        .route(
            "/api/stock/products/{id}/stock/reserve",
            post(products::reserve_stock),
        )
        .route(
            "/api/stock/products/{id}/stock/release",
            post(products::release_stock),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
