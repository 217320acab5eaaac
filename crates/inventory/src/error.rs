use common::ProductId;
use thiserror::Error;

/// Errors that can occur in the inventory service.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// The product does not exist.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// Input failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A stored value does not fit the domain type.
    #[error("Corrupt inventory data: {0}")]
    CorruptData(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for inventory operations.
pub type Result<T> = std::result::Result<T, InventoryError>;
