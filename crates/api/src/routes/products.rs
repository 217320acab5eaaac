//! Product catalogue and stock endpoints of the inventory service.
//!
//! Every route needs an authenticated caller. Catalogue changes and stock
//! overwrites are admin only; reserve and release are open to any caller,
//! since the order saga makes them on the ordering customer's behalf.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::ProductId;
use inventory::{NewProduct, Product, ProductUpdate, ReleaseOutcome, ReserveOutcome};
use saga::{AvailabilityResponse, StockMovementRequest};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::auth::AuthenticatedCaller;
use crate::error::ApiError;

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct SetStockRequest {
    pub quantity: i64,
}

// -- Response types --

#[derive(Debug, Serialize, Deserialize)]
pub struct AvailabilityCheckResponse {
    pub product_id: i64,
    pub requested_quantity: u32,
    #[serde(flatten)]
    pub availability: AvailabilityResponse,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StockLevelResponse {
    pub product_id: i64,
    pub new_quantity: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReserveResponse {
    pub product_id: i64,
    pub reserved_quantity: u32,
    pub outcome: ReserveOutcome,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReleaseResponse {
    pub product_id: i64,
    pub released_quantity: u32,
    pub outcome: ReleaseOutcome,
}

fn positive_quantity(quantity: i64) -> Result<u32, ApiError> {
    u32::try_from(quantity)
        .ok()
        .filter(|q| *q > 0)
        .ok_or_else(|| ApiError::BadRequest("Quantity must be greater than zero".to_string()))
}

// -- Handlers --

/// GET /api/stock/products — list all products.
#[tracing::instrument(skip(state, _caller))]
pub async fn list(
    State(state): State<Arc<AppState>>,
    _caller: AuthenticatedCaller,
) -> Result<Json<Vec<Product>>, ApiError> {
    Ok(Json(state.inventory.list_products().await?))
}

/// GET /api/stock/products/{id} — load a product.
#[tracing::instrument(skip(state, _caller))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    _caller: AuthenticatedCaller,
    Path(id): Path<i64>,
) -> Result<Json<Product>, ApiError> {
    Ok(Json(state.inventory.get_product(ProductId::new(id)).await?))
}

/// POST /api/stock/products — create a product.
#[tracing::instrument(skip(state, caller, product))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    caller: AuthenticatedCaller,
    Json(product): Json<NewProduct>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    caller.require_admin()?;
    let product = state.inventory.create_product(product).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// PUT /api/stock/products/{id} — partially update a product.
#[tracing::instrument(skip(state, caller, update))]
pub async fn update(
    State(state): State<Arc<AppState>>,
    caller: AuthenticatedCaller,
    Path(id): Path<i64>,
    Json(update): Json<ProductUpdate>,
) -> Result<Json<Product>, ApiError> {
    caller.require_admin()?;
    let product = state
        .inventory
        .update_product(ProductId::new(id), update)
        .await?;
    Ok(Json(product))
}

/// DELETE /api/stock/products/{id} — delete a product.
#[tracing::instrument(skip(state, caller))]
pub async fn delete(
    State(state): State<Arc<AppState>>,
    caller: AuthenticatedCaller,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    caller.require_admin()?;
    state.inventory.delete_product(ProductId::new(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/stock/products/{id}/stock/check/{quantity} — advisory availability check.
#[tracing::instrument(skip(state, _caller))]
pub async fn check_stock(
    State(state): State<Arc<AppState>>,
    _caller: AuthenticatedCaller,
    Path((id, quantity)): Path<(i64, i64)>,
) -> Result<Json<AvailabilityCheckResponse>, ApiError> {
    let quantity = positive_quantity(quantity)?;
    let is_available = state
        .inventory
        .check_availability(ProductId::new(id), quantity)
        .await?;

    Ok(Json(AvailabilityCheckResponse {
        product_id: id,
        requested_quantity: quantity,
        availability: AvailabilityResponse { is_available },
    }))
}

/// PUT /api/stock/products/{id}/stock — overwrite the stock level.
#[tracing::instrument(skip(state, caller, req))]
pub async fn set_stock(
    State(state): State<Arc<AppState>>,
    caller: AuthenticatedCaller,
    Path(id): Path<i64>,
    Json(req): Json<SetStockRequest>,
) -> Result<Json<StockLevelResponse>, ApiError> {
    caller.require_admin()?;
    let quantity = u32::try_from(req.quantity)
        .map_err(|_| ApiError::BadRequest("Stock quantity cannot be negative".to_string()))?;
    state.inventory.set_stock(ProductId::new(id), quantity).await?;

    Ok(Json(StockLevelResponse {
        product_id: id,
        new_quantity: quantity,
    }))
}

/// POST /api/stock/products/{id}/stock/reserve — atomically reserve stock.
///
/// Responds 409 when the reservation is not in effect, 404 for an unknown
/// product.
#[tracing::instrument(skip(state, caller, req), fields(customer_id = %caller.0.customer_id, reservation_key = ?req.reservation_key))]
pub async fn reserve_stock(
    State(state): State<Arc<AppState>>,
    caller: AuthenticatedCaller,
    Path(id): Path<i64>,
    Json(req): Json<StockMovementRequest>,
) -> Result<Json<ReserveResponse>, ApiError> {
    let quantity = positive_quantity(i64::from(req.quantity))?;
    let outcome = state
        .inventory
        .reserve_stock(ProductId::new(id), quantity, req.reservation_key.as_ref())
        .await?;

    match outcome {
        ReserveOutcome::Reserved | ReserveOutcome::AlreadyApplied => Ok(Json(ReserveResponse {
            product_id: id,
            reserved_quantity: quantity,
            outcome,
        })),
        ReserveOutcome::ProductNotFound => Err(ApiError::NotFound(format!(
            "Product with ID {id} not found"
        ))),
        ReserveOutcome::InsufficientStock | ReserveOutcome::AlreadyReleased => {
            Err(ApiError::Conflict(format!(
                "Unable to reserve {quantity} units of product {id}"
            )))
        }
    }
}

/// POST /api/stock/products/{id}/stock/release — return reserved stock.
#[tracing::instrument(skip(state, caller, req), fields(customer_id = %caller.0.customer_id, reservation_key = ?req.reservation_key))]
pub async fn release_stock(
    State(state): State<Arc<AppState>>,
    caller: AuthenticatedCaller,
    Path(id): Path<i64>,
    Json(req): Json<StockMovementRequest>,
) -> Result<Json<ReleaseResponse>, ApiError> {
    let outcome = state
        .inventory
        .release_stock(ProductId::new(id), req.quantity, req.reservation_key.as_ref())
        .await?;

    if outcome == ReleaseOutcome::ProductNotFound {
        return Err(ApiError::NotFound(format!("Product with ID {id} not found")));
    }
    Ok(Json(ReleaseResponse {
        product_id: id,
        released_quantity: req.quantity,
        outcome,
    }))
}
