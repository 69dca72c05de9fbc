//! Collection handles of the in-memory store.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::store::client::Collection;
use crate::store::error::{StoreError, StoreResult};
use crate::store::filter::{id_of, Filter, ID_FIELD};
use crate::store::memory::engine::{Engine, Writer};
use crate::store::memory::session::MemorySession;
use crate::store::results::{
    BulkFailureKind, BulkWriteFailure, DeleteResult, InsertManyResult, ReplaceResult,
};
use crate::store::types::{DocumentKey, Namespace};

/// Handle to one collection. Cheap to clone.
#[derive(Clone)]
pub struct MemoryCollection {
    engine: Arc<Engine>,
    namespace: Namespace,
}

impl MemoryCollection {
    pub(crate) fn new(engine: Arc<Engine>, namespace: Namespace) -> Self {
        Self { engine, namespace }
    }

    fn duplicate(&self, key: &DocumentKey) -> StoreError {
        StoreError::DuplicateKey {
            namespace: self.namespace.clone(),
            id: key.to_string(),
        }
    }
}

impl std::fmt::Debug for MemoryCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCollection")
            .field("namespace", &self.namespace.to_string())
            .finish()
    }
}

/// First visible document matched by `filter`.
fn first_match(
    writer: &Writer<'_>,
    namespace: &Namespace,
    filter: &Filter,
) -> StoreResult<Option<DocumentKey>> {
    let candidates = match filter.keys()? {
        Some(keys) => keys,
        None => writer.keys(namespace),
    };
    Ok(candidates
        .into_iter()
        .find(|key| writer.get(namespace, key).is_some_and(|doc| filter.matches(doc))))
}

/// Check a replacement against the document it replaces and fill in `_id`.
fn prepare_replacement(mut replacement: Value, matched_id: &Value) -> StoreResult<Value> {
    let object = replacement
        .as_object_mut()
        .ok_or_else(|| StoreError::InvalidDocument("replacement must be a JSON object".into()))?;

    match object.get(ID_FIELD) {
        Some(id) if id != matched_id => {
            return Err(StoreError::ImmutableId {
                expected: matched_id.to_string(),
                found: id.to_string(),
            })
        }
        Some(_) => {}
        None => {
            object.insert(ID_FIELD.to_string(), matched_id.clone());
        }
    }
    Ok(replacement)
}

/// Replace the first match of `filter`. Returns `(matched, modified)`.
fn replace_first(
    writer: &mut Writer<'_>,
    namespace: &Namespace,
    filter: &Filter,
    replacement: Value,
) -> StoreResult<(bool, bool)> {
    if !replacement.is_object() {
        return Err(StoreError::InvalidDocument(
            "replacement must be a JSON object".into(),
        ));
    }
    let Some(key) = first_match(writer, namespace, filter)? else {
        return Ok((false, false));
    };
    let current = writer
        .get(namespace, &key)
        .cloned()
        .ok_or_else(|| StoreError::Internal(format!("matched document {key} vanished")))?;
    let matched_id = current.get(ID_FIELD).cloned().unwrap_or(Value::Null);

    let replacement = prepare_replacement(replacement, &matched_id)?;
    let modified = replacement != current;
    if modified {
        writer.put(namespace, key, replacement);
    }
    Ok((true, modified))
}

fn failure_kind(error: &StoreError) -> BulkFailureKind {
    match error {
        StoreError::DuplicateKey { .. } => BulkFailureKind::DuplicateKey,
        StoreError::ImmutableId { .. } => BulkFailureKind::ImmutableId,
        _ => BulkFailureKind::InvalidDocument,
    }
}

#[async_trait]
impl Collection for MemoryCollection {
    type Session = MemorySession;

    fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    async fn find_one(
        &self,
        filter: &Filter,
        session: Option<&MemorySession>,
    ) -> StoreResult<Option<Value>> {
        self.engine.io().await?;
        let keys = filter.keys()?;
        self.engine.read(session, |reader| match keys {
            Some(keys) => keys
                .iter()
                .filter_map(|key| reader.get(&self.namespace, key))
                .find(|doc| filter.matches(doc))
                .cloned(),
            None => reader
                .scan(&self.namespace)
                .into_iter()
                .find(|doc| filter.matches(doc))
                .cloned(),
        })
    }

    async fn find(
        &self,
        filter: &Filter,
        session: Option<&MemorySession>,
    ) -> StoreResult<Vec<Value>> {
        self.engine.io().await?;
        let keys = filter.keys()?;
        self.engine.read(session, |reader| match keys {
            Some(keys) => keys
                .iter()
                .filter_map(|key| reader.get(&self.namespace, key))
                .filter(|doc| filter.matches(doc))
                .cloned()
                .collect(),
            None => reader
                .scan(&self.namespace)
                .into_iter()
                .filter(|doc| filter.matches(doc))
                .cloned()
                .collect(),
        })
    }

    async fn insert_one(
        &self,
        document: Value,
        session: Option<&MemorySession>,
    ) -> StoreResult<Value> {
        self.engine.io().await?;
        let (id, key) = id_of(&document)?;
        self.engine.write(session, |writer| {
            if writer.get(&self.namespace, &key).is_some() {
                return Err(self.duplicate(&key));
            }
            writer.put(&self.namespace, key, document);
            Ok(id)
        })
    }

    async fn insert_many(
        &self,
        documents: Vec<Value>,
        session: Option<&MemorySession>,
    ) -> StoreResult<InsertManyResult> {
        self.engine.io().await?;
        let attempted = documents.len();
        self.engine.write(session, |writer| {
            let mut failures = Vec::new();
            let mut accepted = Vec::with_capacity(attempted);
            let mut seen = HashSet::new();

            for (index, document) in documents.into_iter().enumerate() {
                let checked = id_of(&document).and_then(|(id, key)| {
                    if seen.contains(&key) || writer.get(&self.namespace, &key).is_some() {
                        Err(self.duplicate(&key))
                    } else {
                        Ok((id, key))
                    }
                });
                match checked {
                    Ok((id, key)) => {
                        seen.insert(key.clone());
                        accepted.push((id, key, document));
                    }
                    Err(error) => failures.push(BulkWriteFailure {
                        index,
                        kind: failure_kind(&error),
                        message: error.to_string(),
                    }),
                }
            }

            // Inside a transaction the bulk write is all-or-nothing.
            if !failures.is_empty() && writer.is_transactional() {
                return Err(StoreError::BulkWrite {
                    namespace: self.namespace.clone(),
                    attempted,
                    failures,
                });
            }

            let mut inserted_ids = Vec::with_capacity(accepted.len());
            for (id, key, document) in accepted {
                writer.put(&self.namespace, key, document);
                inserted_ids.push(id);
            }

            if failures.is_empty() {
                Ok(InsertManyResult { inserted_ids })
            } else {
                Err(StoreError::BulkWrite {
                    namespace: self.namespace.clone(),
                    attempted,
                    failures,
                })
            }
        })
    }

    async fn replace_one(
        &self,
        filter: &Filter,
        replacement: Value,
        session: Option<&MemorySession>,
    ) -> StoreResult<ReplaceResult> {
        self.engine.io().await?;
        self.engine.write(session, |writer| {
            let (matched, modified) = replace_first(writer, &self.namespace, filter, replacement)?;
            let mut result = ReplaceResult::default();
            result.record(matched, modified);
            Ok(result)
        })
    }

    async fn bulk_replace(
        &self,
        replacements: Vec<(Filter, Value)>,
        session: Option<&MemorySession>,
    ) -> StoreResult<ReplaceResult> {
        self.engine.io().await?;
        let attempted = replacements.len();
        self.engine.write(session, |writer| {
            let transactional = writer.is_transactional();

            // Validate first so a transactional batch can be rejected untouched.
            if transactional {
                let view: &Writer<'_> = writer;
                let failures: Vec<_> = replacements
                    .iter()
                    .enumerate()
                    .filter_map(|(index, (filter, replacement))| {
                        let checked = first_match(view, &self.namespace, filter).and_then(|key| {
                            match key.and_then(|key| view.get(&self.namespace, &key)) {
                                Some(current) => {
                                    let matched_id =
                                        current.get(ID_FIELD).cloned().unwrap_or(Value::Null);
                                    prepare_replacement(replacement.clone(), &matched_id).map(|_| ())
                                }
                                None if replacement.is_object() => Ok(()),
                                None => Err(StoreError::InvalidDocument(
                                    "replacement must be a JSON object".into(),
                                )),
                            }
                        });
                        checked.err().map(|error| BulkWriteFailure {
                            index,
                            kind: failure_kind(&error),
                            message: error.to_string(),
                        })
                    })
                    .collect();
                if !failures.is_empty() {
                    return Err(StoreError::BulkWrite {
                        namespace: self.namespace.clone(),
                        attempted,
                        failures,
                    });
                }
            }

            let mut result = ReplaceResult::default();
            let mut failures = Vec::new();
            for (index, (filter, replacement)) in replacements.into_iter().enumerate() {
                match replace_first(writer, &self.namespace, &filter, replacement) {
                    Ok((matched, modified)) => result.record(matched, modified),
                    Err(error) => failures.push(BulkWriteFailure {
                        index,
                        kind: failure_kind(&error),
                        message: error.to_string(),
                    }),
                }
            }

            if failures.is_empty() {
                Ok(result)
            } else {
                Err(StoreError::BulkWrite {
                    namespace: self.namespace.clone(),
                    attempted,
                    failures,
                })
            }
        })
    }

    async fn delete_one(
        &self,
        filter: &Filter,
        session: Option<&MemorySession>,
    ) -> StoreResult<DeleteResult> {
        self.engine.io().await?;
        self.engine.write(session, |writer| {
            let mut result = DeleteResult::default();
            if let Some(key) = first_match(writer, &self.namespace, filter)? {
                if writer.remove(&self.namespace, &key) {
                    result.deleted_count = 1;
                }
            }
            Ok(result)
        })
    }

    async fn delete_many(
        &self,
        filter: &Filter,
        session: Option<&MemorySession>,
    ) -> StoreResult<DeleteResult> {
        self.engine.io().await?;
        self.engine.write(session, |writer| {
            let keys = match filter.keys()? {
                Some(keys) => keys,
                None => writer.keys(&self.namespace),
            };
            let mut result = DeleteResult::default();
            for key in keys {
                let matches = writer
                    .get(&self.namespace, &key)
                    .is_some_and(|doc| filter.matches(doc));
                if matches && writer.remove(&self.namespace, &key) {
                    result.deleted_count += 1;
                }
            }
            Ok(result)
        })
    }
}
