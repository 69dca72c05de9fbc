//! Generic repositories over one collection.
//!
//! A [`Repository`] translates typed CRUD calls into store operations. Every
//! call takes the caller's [`TransactionScope`](crate::transaction::TransactionScope),
//! if any: while the scope is active the store call is bound to its session,
//! otherwise it runs on its own and is visible immediately.

mod crud;
mod error;

use serde::de::DeserializeOwned;
use serde::Serialize;

pub use crud::Repository;
pub use error::{RepositoryError, RepositoryResult};

/// A type stored as a JSON document in a fixed collection.
///
/// The serialized form must be a JSON object whose `_id` member holds the
/// primary key, typically via `#[serde(rename = "_id")]` on the id field.
pub trait Document: Serialize + DeserializeOwned + Send + Sync {
    /// Name of the collection this document type lives in.
    const COLLECTION: &'static str;
}
