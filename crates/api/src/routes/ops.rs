//! Health and metrics endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use inventory::STOCK_UPDATES_TOPIC;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};

use crate::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    /// Stock updates waiting to be consumed, if the channel answered.
    pub pending_stock_updates: Option<usize>,
}

/// GET /health — reports whether the message channel is reachable.
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    match state.channel.pending_count(STOCK_UPDATES_TOPIC).await {
        Ok(pending) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok".to_string(),
                pending_stock_updates: Some(pending),
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check could not reach the channel");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "degraded".to_string(),
                    pending_stock_updates: None,
                }),
            )
        }
    }
}

/// GET /metrics — Prometheus text exposition.
pub async fn metrics(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        handle.render(),
    )
}
