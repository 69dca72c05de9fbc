//! Transaction error types.

use thiserror::Error;

use crate::store::StoreError;

/// Result type for transaction operations.
pub type TransactionResult<T> = Result<T, TransactionError>;

/// Errors that can occur while driving a transaction scope.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// `start` was called while a transaction is running. Nested scopes are
    /// not supported.
    #[error("a transaction is already in progress")]
    AlreadyStarted,

    /// `commit`, `abort` or `session` was used with no running transaction.
    #[error("no transaction has been started; call start before performing transaction operations")]
    NotStarted,

    /// The caller's cancellation token fired while the store call was in flight.
    #[error("transaction operation cancelled")]
    Cancelled,

    /// Store layer error, passed through unchanged.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl TransactionError {
    /// Check if this error signals a caller logic error rather than a store failure.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            TransactionError::AlreadyStarted | TransactionError::NotStarted
        )
    }

    /// Check if retrying the whole unit of work may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransactionError::Store(err) => err.is_transient(),
            _ => false,
        }
    }
}
