//! Built-in document conventions.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use ulid::Ulid;

use crate::conventions::Convention;
use crate::store::ID_FIELD;

/// Drop top-level members whose value is `null`.
///
/// Nested objects are left alone: the encoded form cannot tell a struct
/// from a map, and a map with `None` values must read back unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IgnoreIfNull;

impl Convention for IgnoreIfNull {
    fn name(&self) -> &'static str {
        "ignore_if_null"
    }

    fn apply(&self, document: &mut Map<String, Value>) {
        document.retain(|_, value| !value.is_null());
    }
}

/// Give documents without a usable `_id` a fresh string id.
///
/// A missing, `null` or empty-string `_id` is replaced by a lowercase ULID.
/// Ids of any other shape are left alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenerateStringIds;

impl Convention for GenerateStringIds {
    fn name(&self) -> &'static str {
        "generate_string_ids"
    }

    fn apply(&self, document: &mut Map<String, Value>) {
        let needs_id = match document.get(ID_FIELD) {
            None | Some(Value::Null) => true,
            Some(Value::String(id)) => id.is_empty(),
            Some(_) => false,
        };
        if needs_id {
            let id = Ulid::new().to_string().to_lowercase();
            document.insert(ID_FIELD.to_string(), Value::String(id));
        }
    }
}

/// Store timestamps in UTC.
///
/// Any RFC 3339 string carrying a non-zero offset is rewritten to the same
/// instant in UTC. `_id` is never touched.
#[derive(Debug, Clone, Copy, Default)]
pub struct UtcTimestamps;

impl Convention for UtcTimestamps {
    fn name(&self) -> &'static str {
        "utc_timestamps"
    }

    fn apply(&self, document: &mut Map<String, Value>) {
        for (field, value) in document.iter_mut() {
            if field != ID_FIELD {
                normalize_timestamps(value);
            }
        }
    }
}

fn normalize_timestamps(value: &mut Value) {
    match value {
        Value::String(text) => {
            if let Some(utc) = to_utc(text) {
                *text = utc;
            }
        }
        Value::Array(items) => items.iter_mut().for_each(normalize_timestamps),
        Value::Object(object) => object.values_mut().for_each(normalize_timestamps),
        _ => {}
    }
}

fn to_utc(text: &str) -> Option<String> {
    let parsed = DateTime::parse_from_rfc3339(text).ok()?;
    if parsed.offset().local_minus_utc() == 0 {
        return None;
    }
    Some(
        parsed
            .with_timezone(&Utc)
            .to_rfc3339_opts(SecondsFormat::AutoSi, true),
    )
}
