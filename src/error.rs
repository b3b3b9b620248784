use thiserror::Error;

use crate::entity::EntityRef;

/// Main error type for Relgraph
#[derive(Error, Debug)]
pub enum RelgraphError {
    /// Relational backend errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// additional_info could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A relation or key failed validation before reaching the store
    #[error("Validation error: {0}")]
    Validation(String),

    /// Backend failure not covered by a more specific variant
    #[error("Storage error: {0}")]
    Storage(String),

    /// The traversal watchdog fired before the search finished
    #[error("Traversal from {root} timed out after {timeout_ms} ms")]
    TraversalTimeout { root: EntityRef, timeout_ms: u64 },

    /// The traversal worker died (panic or cancellation)
    #[error("Traversal failed: {0}")]
    TraversalFailed(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl RelgraphError {
    pub fn is_validation(&self) -> bool {
        matches!(self, RelgraphError::Validation(_))
    }

    /// True for every failure that originates in the backing store.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            RelgraphError::Database(_)
                | RelgraphError::Io(_)
                | RelgraphError::Serialization(_)
                | RelgraphError::Storage(_)
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, RelgraphError::TraversalTimeout { .. })
    }
}

/// Convenient Result type using RelgraphError
pub type Result<T> = std::result::Result<T, RelgraphError>;
