//! Store layer error types
//!
//! Every failure a collaborator store can report is defined here. The upper
//! layers pass these through unchanged.

use thiserror::Error;

use crate::store::results::{BulkFailureKind, BulkWriteFailure};
use crate::store::types::{InvalidNameError, Namespace};

/// the main error type for store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// a document with the same `_id` already exists
    #[error("duplicate key: namespace={namespace}, id={id}")]
    DuplicateKey { namespace: Namespace, id: String },

    /// a transaction touched documents that were changed after it read them
    ///
    /// Documents are reported as `{namespace}/{id}`.
    #[error("write conflict on: {}", .documents.join(", "))]
    WriteConflict { documents: Vec<String> },

    /// some entries of a bulk write failed
    #[error("bulk write to {namespace} failed for {} of {attempted} entries", .failures.len())]
    BulkWrite {
        namespace: Namespace,
        attempted: usize,
        failures: Vec<BulkWriteFailure>,
    },

    /// documents must be JSON objects carrying a scalar `_id`
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// a replacement tried to change the `_id` of the matched document
    #[error("replacement would change immutable _id from {expected} to {found}")]
    ImmutableId { expected: String, found: String },

    /// operation issued on a session that was already ended
    #[error("session {0} has ended")]
    SessionEnded(String),

    /// transaction control issued while no transaction is running
    #[error("no transaction in progress on session {0}")]
    NoTransaction(String),

    /// `start_transaction` issued while one is already running
    #[error("transaction already in progress on session {0}")]
    TransactionInProgress(String),

    /// the store cannot be reached
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// invalid database or collection name
    #[error("invalid name: {0}")]
    InvalidName(#[from] InvalidNameError),

    /// JSON serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// internal error that shouldn't happen
    #[error("internal error: {0}")]
    Internal(String),
}

impl StoreError {
    /// check if this error is a key uniqueness violation
    pub fn is_duplicate_key(&self) -> bool {
        match self {
            StoreError::DuplicateKey { .. } => true,
            StoreError::BulkWrite { failures, .. } => failures
                .iter()
                .any(|failure| failure.kind == BulkFailureKind::DuplicateKey),
            _ => false,
        }
    }

    /// check if retrying the whole unit of work may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::WriteConflict { .. } | StoreError::Unavailable(_)
        )
    }

    /// check if this error comes from misusing a session
    pub fn is_session_misuse(&self) -> bool {
        matches!(
            self,
            StoreError::SessionEnded(_)
                | StoreError::NoTransaction(_)
                | StoreError::TransactionInProgress(_)
        )
    }
}

/// result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;
