//! Order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{CustomerId, OrderId};
use domain::{Order, OrderItem};
use saga::{Caller, OrderLineRequest};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::auth::AuthenticatedCaller;
use crate::error::ApiError;

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub items: Vec<OrderLineRequest>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

// -- Response types --

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderResponse {
    pub id: i64,
    pub customer_id: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub total_cents: i64,
    pub items: Vec<OrderItemResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderItemResponse {
    pub line_no: u32,
    pub product_id: i64,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
    /// Absent only if the stored line cannot be totalled.
    pub total_price_cents: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusChangedResponse {
    pub order_id: i64,
    pub status: String,
}

impl From<&OrderItem> for OrderItemResponse {
    fn from(item: &OrderItem) -> Self {
        Self {
            line_no: item.line_no,
            product_id: item.product_id.as_i64(),
            product_name: item.product_name.clone(),
            quantity: item.quantity,
            unit_price_cents: item.unit_price.cents(),
            total_price_cents: item.total_price().ok().map(|total| total.cents()),
        }
    }
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id.as_i64(),
            customer_id: order.customer_id.to_string(),
            status: order.status.to_string(),
            created_at: order.created_at,
            updated_at: order.updated_at,
            total_cents: order.total_amount.cents(),
            items: order.items.iter().map(OrderItemResponse::from).collect(),
        }
    }
}

fn to_responses(orders: &[Order]) -> Vec<OrderResponse> {
    orders.iter().map(OrderResponse::from).collect()
}

async fn load_accessible(state: &AppState, caller: &Caller, id: OrderId) -> Result<Order, ApiError> {
    let order = state.saga.get_order(id).await?;
    if !caller.can_access(&order) {
        return Err(ApiError::Forbidden(
            "You can only access your own orders".to_string(),
        ));
    }
    Ok(order)
}

// -- Handlers --

/// POST /api/orders — create an order for the calling customer.
#[tracing::instrument(skip(state, caller, req), fields(customer_id = %caller.0.customer_id))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    caller: AuthenticatedCaller,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let order = state.saga.create_order(&caller.0, req.items).await?;
    Ok((StatusCode::CREATED, Json(OrderResponse::from(&order))))
}

/// GET /api/orders — list every order (admin only).
#[tracing::instrument(skip(state, caller))]
pub async fn list_all(
    State(state): State<Arc<AppState>>,
    caller: AuthenticatedCaller,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    caller.require_admin()?;
    let orders = state.saga.list_orders().await?;
    Ok(Json(to_responses(&orders)))
}

/// GET /api/orders/my-orders — list the caller's orders.
#[tracing::instrument(skip(state, caller))]
pub async fn list_mine(
    State(state): State<Arc<AppState>>,
    caller: AuthenticatedCaller,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders = state
        .saga
        .list_orders_for_customer(&caller.0.customer_id)
        .await?;
    Ok(Json(to_responses(&orders)))
}

/// GET /api/orders/customer/{customer_id} — list a customer's orders (admin only).
#[tracing::instrument(skip(state, caller))]
pub async fn list_by_customer(
    State(state): State<Arc<AppState>>,
    caller: AuthenticatedCaller,
    Path(customer_id): Path<String>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    caller.require_admin()?;
    let orders = state
        .saga
        .list_orders_for_customer(&CustomerId::new(customer_id))
        .await?;
    Ok(Json(to_responses(&orders)))
}

/// GET /api/orders/{id} — load an order (owner or admin).
#[tracing::instrument(skip(state, caller))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    caller: AuthenticatedCaller,
    Path(id): Path<i64>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = load_accessible(&state, &caller.0, OrderId::new(id)).await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// PUT /api/orders/{id}/status — set any known status (admin only).
#[tracing::instrument(skip(state, caller, req))]
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    caller: AuthenticatedCaller,
    Path(id): Path<i64>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<StatusChangedResponse>, ApiError> {
    caller.require_admin()?;
    if req.status.trim().is_empty() {
        return Err(ApiError::BadRequest("Status is required".to_string()));
    }

    let order = state
        .saga
        .update_order_status(OrderId::new(id), req.status.trim())
        .await?;
    Ok(Json(StatusChangedResponse {
        order_id: order.id.as_i64(),
        status: order.status.to_string(),
    }))
}

/// PUT /api/orders/{id}/cancel — cancel an order (owner or admin).
#[tracing::instrument(skip(state, caller))]
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    caller: AuthenticatedCaller,
    Path(id): Path<i64>,
) -> Result<Json<StatusChangedResponse>, ApiError> {
    let order = load_accessible(&state, &caller.0, OrderId::new(id)).await?;
    let order = state.saga.cancel_order(order.id).await?;
    Ok(Json(StatusChangedResponse {
        order_id: order.id.as_i64(),
        status: order.status.to_string(),
    }))
}
