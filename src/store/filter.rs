//! Primary-key filters.
//!
//! The store contract only needs `_id` equality, `_id` membership and a
//! match-all scan. Anything richer belongs to the underlying store's query
//! language.

use serde_json::Value;

use crate::store::error::{StoreError, StoreResult};
use crate::store::types::DocumentKey;

/// The field every document is keyed by.
pub const ID_FIELD: &str = "_id";

/// A filter over documents in one collection.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `{ _id: value }`
    IdEq(Value),
    /// `{ _id: { $in: [values] } }`
    IdIn(Vec<Value>),
    /// `{}`
    All,
}

impl Filter {
    pub fn id_eq(id: impl Into<Value>) -> Self {
        Filter::IdEq(id.into())
    }

    pub fn id_in<I, V>(ids: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Filter::IdIn(ids.into_iter().map(Into::into).collect())
    }

    /// Keys addressed by this filter, or `None` for a full scan.
    ///
    /// Duplicate ids collapse to one key.
    pub(crate) fn keys(&self) -> StoreResult<Option<Vec<DocumentKey>>> {
        match self {
            Filter::IdEq(id) => Ok(Some(vec![key_of(id)?])),
            Filter::IdIn(ids) => {
                let mut keys = ids.iter().map(key_of).collect::<StoreResult<Vec<_>>>()?;
                keys.sort();
                keys.dedup();
                Ok(Some(keys))
            }
            Filter::All => Ok(None),
        }
    }

    /// Check a document against the filter.
    pub fn matches(&self, document: &Value) -> bool {
        match self {
            Filter::All => true,
            Filter::IdEq(id) => document.get(ID_FIELD) == Some(id),
            Filter::IdIn(ids) => document
                .get(ID_FIELD)
                .is_some_and(|value| ids.contains(value)),
        }
    }
}

/// Derive the storage key of an `_id` value.
pub(crate) fn key_of(id: &Value) -> StoreResult<DocumentKey> {
    DocumentKey::from_id(id)
        .ok_or_else(|| StoreError::InvalidDocument(format!("unsupported _id value: {id}")))
}

/// Extract the `_id` of a document, requiring an object with a scalar id.
pub(crate) fn id_of(document: &Value) -> StoreResult<(Value, DocumentKey)> {
    let object = document
        .as_object()
        .ok_or_else(|| StoreError::InvalidDocument("document must be a JSON object".into()))?;
    let id = object
        .get(ID_FIELD)
        .ok_or_else(|| StoreError::InvalidDocument("document has no _id field".into()))?;
    let key = key_of(id)?;
    Ok((id.clone(), key))
}
