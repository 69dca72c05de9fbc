//! The generic CRUD repository.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::conventions::ConventionRegistry;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::store::{
    Client, Collection, DeleteResult, Filter, Namespace, ReplaceResult, StoreError, StoreResult,
    ID_FIELD,
};
use crate::transaction::TransactionScope;

/// CRUD over the documents of one collection.
///
/// Holds no per-call state. The scope is passed into each call and only
/// observed, never started or concluded, so one repository can serve any
/// number of units of work.
pub struct Repository<D, Id, C: Client> {
    collection: C::Collection,
    conventions: Arc<ConventionRegistry>,
    _marker: PhantomData<fn() -> (D, Id)>,
}

impl<D, Id, C: Client> Repository<D, Id, C> {
    /// Repository over `collection` that writes documents exactly as serde
    /// encodes them.
    pub fn new(collection: C::Collection) -> Self {
        Self {
            collection,
            conventions: Arc::new(ConventionRegistry::new()),
            _marker: PhantomData,
        }
    }

    /// Apply `conventions` to every document written.
    pub fn with_conventions(mut self, conventions: Arc<ConventionRegistry>) -> Self {
        self.conventions = conventions;
        self
    }

    pub fn collection(&self) -> &C::Collection {
        &self.collection
    }

    pub fn namespace(&self) -> &Namespace {
        self.collection.namespace()
    }
}

impl<D, Id, C> Repository<D, Id, C>
where
    D: Serialize + DeserializeOwned + Send + Sync,
    Id: Serialize + Send + Sync,
    C: Client,
{
    /// Fetch the document with the given id. Absence is `Ok(None)`.
    pub async fn get_by_id(
        &self,
        id: &Id,
        scope: Option<&TransactionScope<C>>,
        cancel: &CancellationToken,
    ) -> RepositoryResult<Option<D>> {
        let filter = Filter::IdEq(serde_json::to_value(id)?);
        let session = self.bind(scope, "get_by_id");
        let found = cancellable(cancel, self.collection.find_one(&filter, session)).await?;
        found
            .map(serde_json::from_value)
            .transpose()
            .map_err(RepositoryError::from)
    }

    /// Insert one document and return it as stored.
    pub async fn add(
        &self,
        document: &D,
        scope: Option<&TransactionScope<C>>,
        cancel: &CancellationToken,
    ) -> RepositoryResult<D> {
        let encoded = self.encode(document)?;
        let session = self.bind(scope, "add");
        cancellable(cancel, self.collection.insert_one(encoded.clone(), session)).await?;
        Ok(serde_json::from_value(encoded)?)
    }

    /// Insert documents in one bulk call and return them as stored.
    ///
    /// Unbound, the store attempts every document and reports the ones that
    /// failed; the others stay inserted. Bound to an active scope, the whole
    /// batch is atomic with the rest of the transaction.
    pub async fn add_many(
        &self,
        documents: &[D],
        scope: Option<&TransactionScope<C>>,
        cancel: &CancellationToken,
    ) -> RepositoryResult<Vec<D>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        let encoded = documents
            .iter()
            .map(|document| self.encode(document))
            .collect::<RepositoryResult<Vec<_>>>()?;
        let session = self.bind(scope, "add_many");
        cancellable(cancel, self.collection.insert_many(encoded.clone(), session)).await?;
        encoded
            .into_iter()
            .map(|value| serde_json::from_value(value).map_err(RepositoryError::from))
            .collect()
    }

    /// Replace the document with the given id.
    ///
    /// A missing id is not an error: the result reports zero matches.
    pub async fn update(
        &self,
        id: &Id,
        document: &D,
        scope: Option<&TransactionScope<C>>,
        cancel: &CancellationToken,
    ) -> RepositoryResult<ReplaceResult> {
        let id = serde_json::to_value(id)?;
        let replacement = self.encode_replacement(&id, document)?;
        let session = self.bind(scope, "update");
        cancellable(
            cancel,
            self.collection
                .replace_one(&Filter::IdEq(id), replacement, session),
        )
        .await
    }

    /// Replace many documents by id in one bulk call.
    pub async fn update_many(
        &self,
        documents: &[(Id, D)],
        scope: Option<&TransactionScope<C>>,
        cancel: &CancellationToken,
    ) -> RepositoryResult<ReplaceResult> {
        if documents.is_empty() {
            return Ok(ReplaceResult::default());
        }
        let mut replacements = Vec::with_capacity(documents.len());
        for (id, document) in documents {
            let id = serde_json::to_value(id)?;
            let replacement = self.encode_replacement(&id, document)?;
            replacements.push((Filter::IdEq(id), replacement));
        }
        let session = self.bind(scope, "update_many");
        cancellable(cancel, self.collection.bulk_replace(replacements, session)).await
    }

    /// Delete the document with the given id. A missing id deletes nothing.
    pub async fn delete(
        &self,
        id: &Id,
        scope: Option<&TransactionScope<C>>,
        cancel: &CancellationToken,
    ) -> RepositoryResult<DeleteResult> {
        let filter = Filter::IdEq(serde_json::to_value(id)?);
        let session = self.bind(scope, "delete");
        cancellable(cancel, self.collection.delete_one(&filter, session)).await
    }

    /// Delete every document whose id is in `ids`, in one call.
    pub async fn delete_many(
        &self,
        ids: &[Id],
        scope: Option<&TransactionScope<C>>,
        cancel: &CancellationToken,
    ) -> RepositoryResult<DeleteResult> {
        if ids.is_empty() {
            return Ok(DeleteResult::default());
        }
        let ids = ids
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        let session = self.bind(scope, "delete_many");
        cancellable(cancel, self.collection.delete_many(&Filter::IdIn(ids), session)).await
    }

    /// The session to bind a call to: the scope's, but only while it is active.
    fn bind<'s>(
        &self,
        scope: Option<&'s TransactionScope<C>>,
        operation: &'static str,
    ) -> Option<&'s C::Session> {
        let session = scope
            .filter(|scope| scope.is_active())
            .and_then(|scope| scope.session().ok());
        debug!(
            namespace = %self.collection.namespace(),
            operation,
            transactional = session.is_some(),
            "repository dispatch"
        );
        session
    }

    fn encode(&self, document: &D) -> RepositoryResult<Value> {
        let mut value = to_object(document)?;
        self.conventions.apply(&mut value);
        Ok(value)
    }

    /// Encode a replacement, taking `_id` from the key when the document
    /// leaves it blank.
    fn encode_replacement(&self, id: &Value, document: &D) -> RepositoryResult<Value> {
        let mut value = to_object(document)?;
        if let Value::Object(object) = &mut value {
            let blank = match object.get(ID_FIELD) {
                None | Some(Value::Null) => true,
                Some(Value::String(existing)) => existing.is_empty(),
                Some(_) => false,
            };
            if blank {
                object.insert(ID_FIELD.to_string(), id.clone());
            }
        }
        self.conventions.apply(&mut value);
        Ok(value)
    }
}

impl<D, Id, C: Client> Clone for Repository<D, Id, C>
where
    C::Collection: Clone,
{
    fn clone(&self) -> Self {
        Self {
            collection: self.collection.clone(),
            conventions: self.conventions.clone(),
            _marker: PhantomData,
        }
    }
}

impl<D, Id, C: Client> fmt::Debug for Repository<D, Id, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("namespace", &self.collection.namespace().to_string())
            .field("conventions", &self.conventions)
            .finish()
    }
}

fn to_object<D: Serialize>(document: &D) -> RepositoryResult<Value> {
    let value = serde_json::to_value(document)?;
    if !value.is_object() {
        return Err(StoreError::InvalidDocument(
            "documents must serialize to a JSON object".into(),
        )
        .into());
    }
    Ok(value)
}

/// Await a store call unless `cancel` fires first.
async fn cancellable<T, F>(cancel: &CancellationToken, call: F) -> RepositoryResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RepositoryError::Cancelled),
        result = call => result.map_err(RepositoryError::from),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde::Deserialize;

    use std::collections::BTreeMap;

    use crate::store::{BulkFailureKind, CollectionName, DatabaseName, MemoryClient};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct User {
        #[serde(rename = "_id", default)]
        id: String,
        name: String,
        #[serde(default)]
        email: Option<String>,
    }

    fn user(id: &str, name: &str) -> User {
        User {
            id: id.to_string(),
            name: name.to_string(),
            email: None,
        }
    }

    fn users(client: &MemoryClient) -> Repository<User, String, MemoryClient> {
        let collection = client.collection(
            &DatabaseName::default(),
            &CollectionName::new("users").unwrap(),
        );
        Repository::new(collection).with_conventions(Arc::new(ConventionRegistry::with_defaults()))
    }

    #[tokio::test]
    async fn test_unbound_writes_are_visible_immediately() {
        let client = MemoryClient::new();
        let repo = users(&client);
        let cancel = CancellationToken::new();

        repo.add(&user("a", "Alice"), None, &cancel).await.unwrap();
        let found = repo.get_by_id(&"a".to_string(), None, &cancel).await.unwrap();
        assert_eq!(found, Some(user("a", "Alice")));

        let result = repo
            .update(&"a".to_string(), &user("a", "Alicia"), None, &cancel)
            .await
            .unwrap();
        assert_eq!(result.matched_count, 1);
        assert_eq!(result.modified_count, 1);

        let found = repo.get_by_id(&"a".to_string(), None, &cancel).await.unwrap();
        assert_eq!(found.unwrap().name, "Alicia");
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let client = MemoryClient::new();
        let repo = users(&client);
        let found = repo
            .get_by_id(&"missing".to_string(), None, &CancellationToken::new())
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_active_scope_binds_calls() {
        let client = MemoryClient::new();
        let repo = users(&client);
        let cancel = CancellationToken::new();
        let mut scope = TransactionScope::new(client.clone());
        scope.start(&cancel).await.unwrap();

        repo.add(&user("a", "Alice"), Some(&scope), &cancel).await.unwrap();

        // visible inside the transaction, not outside it
        assert!(repo
            .get_by_id(&"a".to_string(), Some(&scope), &cancel)
            .await
            .unwrap()
            .is_some());
        assert!(repo
            .get_by_id(&"a".to_string(), None, &cancel)
            .await
            .unwrap()
            .is_none());

        scope.commit(&cancel).await.unwrap();
        assert!(repo
            .get_by_id(&"a".to_string(), None, &cancel)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_inactive_scope_runs_unbound() {
        let client = MemoryClient::new();
        let repo = users(&client);
        let cancel = CancellationToken::new();
        let scope = TransactionScope::new(client.clone());

        repo.add(&user("a", "Alice"), Some(&scope), &cancel).await.unwrap();
        assert!(repo
            .get_by_id(&"a".to_string(), None, &cancel)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_add_applies_conventions() {
        let client = MemoryClient::new();
        let repo = users(&client);
        let cancel = CancellationToken::new();

        let stored = repo.add(&user("", "Anon"), None, &cancel).await.unwrap();
        assert_eq!(stored.id.len(), 26);

        let raw = repo
            .collection()
            .find_one(&Filter::id_eq(stored.id.clone()), None)
            .await
            .unwrap()
            .unwrap();
        // email was None and is not stored at all
        assert!(raw.get("email").is_none());
    }

    #[tokio::test]
    async fn test_update_fills_blank_id_from_key() {
        let client = MemoryClient::new();
        let repo = users(&client);
        let cancel = CancellationToken::new();
        repo.add(&user("a", "Alice"), None, &cancel).await.unwrap();

        let result = repo
            .update(&"a".to_string(), &user("", "Alicia"), None, &cancel)
            .await
            .unwrap();
        assert!(result.matched_any());
        let found = repo.get_by_id(&"a".to_string(), None, &cancel).await.unwrap();
        assert_eq!(found, Some(user("a", "Alicia")));
    }

    #[tokio::test]
    async fn test_missing_ids_are_not_errors() {
        let client = MemoryClient::new();
        let repo = users(&client);
        let cancel = CancellationToken::new();

        let replaced = repo
            .update(&"ghost".to_string(), &user("ghost", "Nobody"), None, &cancel)
            .await
            .unwrap();
        assert_eq!(replaced, ReplaceResult::default());

        let deleted = repo.delete(&"ghost".to_string(), None, &cancel).await.unwrap();
        assert_eq!(deleted.deleted_count, 0);
    }

    #[tokio::test]
    async fn test_bulk_operations() {
        let client = MemoryClient::new();
        let repo = users(&client);
        let cancel = CancellationToken::new();

        let stored = repo
            .add_many(&[user("a", "A"), user("b", "B"), user("c", "C")], None, &cancel)
            .await
            .unwrap();
        assert_eq!(stored.len(), 3);

        let result = repo
            .update_many(
                &[
                    ("a".to_string(), user("a", "A2")),
                    ("zz".to_string(), user("zz", "nobody")),
                ],
                None,
                &cancel,
            )
            .await
            .unwrap();
        assert_eq!(result.matched_count, 1);

        let deleted = repo
            .delete_many(&["b".to_string(), "c".to_string(), "q".to_string()], None, &cancel)
            .await
            .unwrap();
        assert_eq!(deleted.deleted_count, 2);

        let a = repo.get_by_id(&"a".to_string(), None, &cancel).await.unwrap();
        assert_eq!(a.unwrap().name, "A2");
    }

    #[tokio::test]
    async fn test_empty_bulk_calls_skip_the_store() {
        let client = MemoryClient::new();
        let repo = users(&client);
        let cancel = CancellationToken::new();
        // any store call would fail now
        client.shutdown();

        assert!(repo.add_many(&[], None, &cancel).await.unwrap().is_empty());
        assert_eq!(
            repo.update_many(&[], None, &cancel).await.unwrap(),
            ReplaceResult::default()
        );
        assert_eq!(
            repo.delete_many(&[], None, &cancel).await.unwrap(),
            DeleteResult::default()
        );
    }

    #[tokio::test]
    async fn test_unbound_bulk_insert_keeps_successes() {
        let client = MemoryClient::new();
        let repo = users(&client);
        let cancel = CancellationToken::new();
        repo.add(&user("b", "B"), None, &cancel).await.unwrap();

        let err = repo
            .add_many(&[user("a", "A"), user("b", "dup"), user("c", "C")], None, &cancel)
            .await
            .unwrap_err();
        assert!(err.is_duplicate_key());

        for id in ["a", "c"] {
            assert!(repo
                .get_by_id(&id.to_string(), None, &cancel)
                .await
                .unwrap()
                .is_some());
        }
    }

    #[tokio::test]
    async fn test_store_errors_pass_through() {
        let client = MemoryClient::new();
        let repo = users(&client);
        let cancel = CancellationToken::new();
        repo.add(&user("a", "A"), None, &cancel).await.unwrap();

        let err = repo.add(&user("a", "again"), None, &cancel).await.unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::Store(StoreError::DuplicateKey { .. })
        ));
    }

    #[tokio::test]
    async fn test_cancelled_call_leaves_scope_active() {
        let client = MemoryClient::new();
        let repo = users(&client);
        let mut scope = TransactionScope::new(client.clone());
        scope.start(&CancellationToken::new()).await.unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = repo
            .add(&user("a", "A"), Some(&scope), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Cancelled));
        assert!(scope.is_active());

        scope.abort(&CancellationToken::new()).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_in_flight_call() {
        let client = MemoryClient::with_latency(Duration::from_millis(100));
        let repo = users(&client);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let err = repo.add(&user("a", "A"), None, &cancel).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Cancelled));

        let found = repo
            .get_by_id(&"a".to_string(), None, &CancellationToken::new())
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct OrderKey {
        shop: u32,
        seq: u32,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Order {
        #[serde(rename = "_id")]
        id: OrderKey,
        total: u32,
    }

    #[tokio::test]
    async fn test_struct_ids() {
        let client = MemoryClient::new();
        let collection = client.collection(
            &DatabaseName::default(),
            &CollectionName::new("orders").unwrap(),
        );
        let repo: Repository<Order, OrderKey, MemoryClient> = Repository::new(collection)
            .with_conventions(Arc::new(ConventionRegistry::with_defaults()));
        let cancel = CancellationToken::new();
        let key = OrderKey { shop: 1, seq: 2 };
        let order = Order {
            id: key.clone(),
            total: 10,
        };

        let stored = repo.add(&order, None, &cancel).await.unwrap();
        assert_eq!(stored, order);
        assert_eq!(
            repo.get_by_id(&key, None, &cancel).await.unwrap(),
            Some(order.clone())
        );

        let updated = Order {
            id: key.clone(),
            total: 25,
        };
        let result = repo.update(&key, &updated, None, &cancel).await.unwrap();
        assert_eq!(result.modified_count, 1);
        assert_eq!(
            repo.get_by_id(&key, None, &cancel).await.unwrap(),
            Some(updated)
        );

        let other = OrderKey { shop: 2, seq: 1 };
        assert!(repo.get_by_id(&other, None, &cancel).await.unwrap().is_none());

        let deleted = repo.delete(&key, None, &cancel).await.unwrap();
        assert_eq!(deleted.deleted_count, 1);
        assert!(repo.get_by_id(&key, None, &cancel).await.unwrap().is_none());
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Profile {
        #[serde(rename = "_id")]
        id: String,
        flags: BTreeMap<String, Option<bool>>,
    }

    #[tokio::test]
    async fn test_map_values_round_trip_with_default_conventions() {
        let client = MemoryClient::new();
        let collection = client.collection(
            &DatabaseName::default(),
            &CollectionName::new("profiles").unwrap(),
        );
        let repo: Repository<Profile, String, MemoryClient> = Repository::new(collection)
            .with_conventions(Arc::new(ConventionRegistry::with_defaults()));
        let cancel = CancellationToken::new();
        let profile = Profile {
            id: "p1".to_string(),
            flags: BTreeMap::from([
                ("dark".to_string(), None),
                ("beta".to_string(), Some(true)),
            ]),
        };

        repo.add(&profile, None, &cancel).await.unwrap();
        let found = repo.get_by_id(&"p1".to_string(), None, &cancel).await.unwrap();
        assert_eq!(found, Some(profile));
    }

    fn bulk_failures(err: RepositoryError) -> Vec<crate::store::BulkWriteFailure> {
        match err {
            RepositoryError::Store(StoreError::BulkWrite { failures, .. }) => failures,
            other => panic!("expected bulk write error, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_bound_update_many_is_all_or_nothing() {
        let client = MemoryClient::new();
        let repo = users(&client);
        let cancel = CancellationToken::new();
        repo.add_many(&[user("a", "A"), user("b", "B")], None, &cancel)
            .await
            .unwrap();

        let mut scope = TransactionScope::new(client.clone());
        scope.start(&cancel).await.unwrap();
        let err = repo
            .update_many(
                &[
                    ("a".to_string(), user("a", "A2")),
                    ("b".to_string(), user("b-moved", "B2")),
                ],
                Some(&scope),
                &cancel,
            )
            .await
            .unwrap_err();
        let failures = bulk_failures(err);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].index, 1);
        assert_eq!(failures[0].kind, BulkFailureKind::ImmutableId);

        // nothing was staged, not even the valid entry
        let inside = repo
            .get_by_id(&"a".to_string(), Some(&scope), &cancel)
            .await
            .unwrap();
        assert_eq!(inside.unwrap().name, "A");
        scope.commit(&cancel).await.unwrap();

        let a = repo.get_by_id(&"a".to_string(), None, &cancel).await.unwrap();
        assert_eq!(a.unwrap().name, "A");
    }

    #[tokio::test]
    async fn test_unbound_update_many_keeps_valid_replacements() {
        let client = MemoryClient::new();
        let repo = users(&client);
        let cancel = CancellationToken::new();
        repo.add_many(&[user("a", "A"), user("b", "B")], None, &cancel)
            .await
            .unwrap();

        let err = repo
            .update_many(
                &[
                    ("a".to_string(), user("a", "A2")),
                    ("b".to_string(), user("b-moved", "B2")),
                ],
                None,
                &cancel,
            )
            .await
            .unwrap_err();
        let failures = bulk_failures(err);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].kind, BulkFailureKind::ImmutableId);

        let a = repo.get_by_id(&"a".to_string(), None, &cancel).await.unwrap();
        assert_eq!(a.unwrap().name, "A2");
        let b = repo.get_by_id(&"b".to_string(), None, &cancel).await.unwrap();
        assert_eq!(b, Some(user("b", "B")));
    }

    #[tokio::test]
    async fn test_non_object_documents_are_rejected() {
        let client = MemoryClient::new();
        let collection = client.collection(
            &DatabaseName::default(),
            &CollectionName::new("numbers").unwrap(),
        );
        let repo: Repository<i64, i64, MemoryClient> = Repository::new(collection);

        let err = repo.add(&5, None, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::Store(StoreError::InvalidDocument(_))
        ));
    }
}
