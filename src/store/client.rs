//! Collaborator contract consumed by the transaction and repository layers.
//!
//! A [`Client`] opens [`Session`]s and hands out [`Collection`] handles.
//! Every collection operation takes an optional session: `Some` binds the call
//! to that session's transaction, `None` runs it on its own.

use async_trait::async_trait;
use serde_json::Value;

use crate::store::error::StoreResult;
use crate::store::filter::Filter;
use crate::store::results::{DeleteResult, InsertManyResult, ReplaceResult};
use crate::store::types::{CollectionName, DatabaseName, Namespace, SessionId};

/// Entry point to a document store.
///
/// Clients are cheap handles over a shared connection pool.
#[async_trait]
pub trait Client: Clone + Send + Sync + 'static {
    type Session: Session;
    type Collection: Collection<Session = Self::Session>;

    /// Open a new session. Fails when the store is unreachable or refuses it.
    async fn start_session(&self) -> StoreResult<Self::Session>;

    /// Handle to a named collection.
    fn collection(&self, database: &DatabaseName, name: &CollectionName) -> Self::Collection;
}

/// A store session that can carry at most one transaction at a time.
#[async_trait]
pub trait Session: Send + Sync + 'static {
    fn id(&self) -> &SessionId;

    /// Begin a transaction on this session.
    fn start_transaction(&mut self) -> StoreResult<()>;

    /// Make the transaction's writes visible. The transaction is over afterwards,
    /// whether or not the commit succeeded.
    async fn commit_transaction(&mut self) -> StoreResult<()>;

    /// Discard the transaction's writes.
    async fn abort_transaction(&mut self) -> StoreResult<()>;

    fn is_in_transaction(&self) -> bool;

    /// Release the session. Aborts any open transaction. Idempotent.
    fn end(&mut self);
}

/// Operations on one collection of JSON documents keyed by `_id`.
#[async_trait]
pub trait Collection: Send + Sync + 'static {
    type Session: Session;

    fn namespace(&self) -> &Namespace;

    /// First document matching the filter, in key order.
    async fn find_one(
        &self,
        filter: &Filter,
        session: Option<&Self::Session>,
    ) -> StoreResult<Option<Value>>;

    /// All documents matching the filter, in key order.
    async fn find(&self, filter: &Filter, session: Option<&Self::Session>)
        -> StoreResult<Vec<Value>>;

    /// Insert one document, returning its `_id`.
    async fn insert_one(&self, document: Value, session: Option<&Self::Session>)
        -> StoreResult<Value>;

    async fn insert_many(
        &self,
        documents: Vec<Value>,
        session: Option<&Self::Session>,
    ) -> StoreResult<InsertManyResult>;

    /// Replace the first document matching the filter. No match is not an error.
    async fn replace_one(
        &self,
        filter: &Filter,
        replacement: Value,
        session: Option<&Self::Session>,
    ) -> StoreResult<ReplaceResult>;

    /// One bulk write made of replace-one models.
    async fn bulk_replace(
        &self,
        replacements: Vec<(Filter, Value)>,
        session: Option<&Self::Session>,
    ) -> StoreResult<ReplaceResult>;

    async fn delete_one(&self, filter: &Filter, session: Option<&Self::Session>)
        -> StoreResult<DeleteResult>;

    async fn delete_many(
        &self,
        filter: &Filter,
        session: Option<&Self::Session>,
    ) -> StoreResult<DeleteResult>;
}
