//! Repository error types.

use thiserror::Error;

use crate::store::StoreError;

/// Result type for repository operations.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Store error, passed through unchanged.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A document or id could not be converted to or from JSON.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The caller's cancellation token fired while the store call was in flight.
    #[error("repository operation cancelled")]
    Cancelled,
}

impl RepositoryError {
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, RepositoryError::Store(err) if err.is_duplicate_key())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, RepositoryError::Store(err) if err.is_transient())
    }
}
