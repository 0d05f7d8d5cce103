use thiserror::Error;

/// Errors produced by the document store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A partial update targeted a document that does not exist.
    #[error("Document not found: {0}")]
    NotFound(String),

    /// A create targeted a document that already exists.
    #[error("Document already exists: {0}")]
    AlreadyExists(String),

    /// The query needs an index the backend does not have (ordered queries).
    #[error("Query requires an index: {0}")]
    QueryUnsupported(String),

    /// Network or service failure.
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// Malformed document path or field path.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// A document could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The store task is gone.
    #[error("Store task has shut down")]
    Closed,
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
