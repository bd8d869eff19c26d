use thiserror::Error;

/// Errors that can occur when interacting with the item store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A conditional write was rejected.
    #[error("Condition failed for item {key}: {reason}")]
    ConditionFailed { key: String, reason: String },

    /// The item or key is missing a key attribute, or it has the wrong type.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// An update tried to add to a non-numeric attribute.
    #[error("Attribute '{0}' is not an integer")]
    NotNumeric(String),

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

/// Result type for item store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
