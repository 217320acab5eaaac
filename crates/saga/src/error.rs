//! Saga error types.

use common::{OrderId, ProductId};
use thiserror::Error;

use crate::state::SagaState;

/// Errors that can occur during saga operations.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The request was rejected before any side effect.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A requested product does not exist.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// Not enough stock to fulfil a line.
    #[error("Insufficient stock for product {product_id}")]
    InsufficientStock { product_id: ProductId },

    /// Order not found.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// A dependency failed or timed out; its effect is unknown.
    #[error("Dependency unavailable during '{step}': {reason}")]
    DependencyUnavailable { step: &'static str, reason: String },

    /// The order left `Pending` while the saga was still running.
    #[error("Order {0} was settled by another process during fulfillment")]
    OrderSettledDuringSaga(OrderId),

    /// The inventory service answered with something unexpected.
    #[error("Inventory service error: {0}")]
    InventoryService(String),

    /// Saga is in an invalid state for the requested operation.
    #[error("Invalid saga state: expected {expected}, actual {actual}")]
    InvalidState {
        expected: &'static str,
        actual: SagaState,
    },
}

impl SagaError {
    /// Returns a short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            SagaError::InvalidInput(_) => "invalid_input",
            SagaError::ProductNotFound(_) => "product_not_found",
            SagaError::InsufficientStock { .. } => "insufficient_stock",
            SagaError::OrderNotFound(_) => "order_not_found",
            SagaError::DependencyUnavailable { .. } => "dependency_unavailable",
            SagaError::OrderSettledDuringSaga(_) => "settled_during_saga",
            SagaError::InventoryService(_) => "inventory_error",
            SagaError::InvalidState { .. } => "invalid_state",
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
