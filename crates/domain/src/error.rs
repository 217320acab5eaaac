//! Domain error types.

use thiserror::Error;

use crate::order::OrderError;

/// Errors that can occur in the order store.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An order could not be built or updated.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// The store cannot be reached.
    #[error("Order store unavailable: {0}")]
    Unavailable(String),

    /// A stored value does not fit the domain type.
    #[error("Corrupt order data: {0}")]
    CorruptData(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for order store operations.
pub type Result<T> = std::result::Result<T, DomainError>;
