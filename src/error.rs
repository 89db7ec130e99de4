//! Error types for the active collection.

use thiserror::Error;

/// Main error type for collection operations.
#[derive(Debug, Error)]
pub enum CollectionError {
    /// The operation is permanently unimplemented on a replicated view.
    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),

    /// A failure raised by the backing document store, passed through as-is.
    #[error(transparent)]
    Store(Box<dyn std::error::Error + Send + Sync>),

    #[error("Document has no usable id after save")]
    MissingId,

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Subscriber error: {0}")]
    Subscriber(String),
}

impl CollectionError {
    /// Wrap a store-side failure so it reaches the caller unchanged.
    pub fn store<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        CollectionError::Store(error.into())
    }

    /// Borrow the underlying store error, if this is one.
    pub fn store_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            CollectionError::Store(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for CollectionError {
    fn from(e: serde_json::Error) -> Self {
        CollectionError::Serialization(e.to_string())
    }
}

/// Result type for collection operations.
pub type Result<T> = std::result::Result<T, CollectionError>;
