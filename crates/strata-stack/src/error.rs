//! Error types for stack persistence

use strata_core::PlatformId;
use thiserror::Error;

/// Result type for strata-stack operations
pub type Result<T> = std::result::Result<T, StackError>;

/// Errors that can occur during stack persistence
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StackError {
    /// No stack with the given identifier
    #[error("stack '{id}' not found")]
    StackNotFound { id: PlatformId },

    /// A stack with the given identifier already exists
    #[error("stack '{id}' already exists")]
    StackAlreadyExists { id: PlatformId },

    /// Underlying store failure
    #[error("stack store error: {0}")]
    Internal(String),

    /// IO error from a file-backed store
    #[error("stack io error: {0}")]
    Io(#[from] std::io::Error),

    /// Persisted stack data could not be encoded or decoded
    #[error("stack serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StackError {
    /// Check if this is a not-found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, StackError::StackNotFound { .. })
    }
}
