use thiserror::Error;

/// Errors that can occur when interacting with a message channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The channel could not accept the message.
    #[error("Publish to topic '{topic}' failed: {reason}")]
    PublishFailed { topic: String, reason: String },

    /// The envelope being acknowledged or requeued is not leased.
    #[error("Message {0} is not in flight")]
    NotInFlight(uuid::Uuid),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for channel operations.
pub type Result<T> = std::result::Result<T, ChannelError>;
