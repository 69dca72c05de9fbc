//! Document conventions.
//!
//! A convention rewrites an encoded document before it reaches the store.
//! Conventions are registered explicitly, in order, on a
//! [`ConventionRegistry`]; repositories run the registry over every document
//! they write.

mod builtin;

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use builtin::{GenerateStringIds, IgnoreIfNull, UtcTimestamps};

/// A rewrite applied to every document written through a repository.
pub trait Convention: Send + Sync {
    /// Unique name. A registry holds at most one convention per name.
    fn name(&self) -> &'static str;

    fn apply(&self, document: &mut Map<String, Value>);
}

/// Built-in conventions that can be selected from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConventionKind {
    IgnoreIfNull,
    GenerateStringIds,
    UtcTimestamps,
}

impl ConventionKind {
    /// Every built-in, in the order the default registry applies them.
    pub const ALL: [ConventionKind; 3] = [
        ConventionKind::GenerateStringIds,
        ConventionKind::IgnoreIfNull,
        ConventionKind::UtcTimestamps,
    ];

    fn build(self) -> Box<dyn Convention> {
        match self {
            ConventionKind::IgnoreIfNull => Box::new(IgnoreIfNull),
            ConventionKind::GenerateStringIds => Box::new(GenerateStringIds),
            ConventionKind::UtcTimestamps => Box::new(UtcTimestamps),
        }
    }
}

/// Ordered set of conventions.
#[derive(Default)]
pub struct ConventionRegistry {
    conventions: Vec<Box<dyn Convention>>,
}

impl ConventionRegistry {
    /// An empty registry. Documents pass through unchanged.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in convention.
    pub fn with_defaults() -> Self {
        Self::from_kinds(&ConventionKind::ALL)
    }

    pub fn from_kinds(kinds: &[ConventionKind]) -> Self {
        let mut registry = Self::new();
        for kind in kinds {
            registry.register_boxed(kind.build());
        }
        registry
    }

    /// Append a convention. Returns false, leaving the registry unchanged,
    /// when one with the same name is already registered.
    pub fn register<T: Convention + 'static>(&mut self, convention: T) -> bool {
        self.register_boxed(Box::new(convention))
    }

    fn register_boxed(&mut self, convention: Box<dyn Convention>) -> bool {
        if self.contains(convention.name()) {
            return false;
        }
        self.conventions.push(convention);
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.conventions.iter().any(|c| c.name() == name)
    }

    /// Registered names, in application order.
    pub fn names(&self) -> Vec<&'static str> {
        self.conventions.iter().map(|c| c.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.conventions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conventions.is_empty()
    }

    /// Run every convention over `document`. Non-object values are left as is.
    pub fn apply(&self, document: &mut Value) {
        if let Value::Object(object) = document {
            for convention in &self.conventions {
                convention.apply(object);
            }
        }
    }
}

impl fmt::Debug for ConventionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Stamp;

    impl Convention for Stamp {
        fn name(&self) -> &'static str {
            "stamp"
        }

        fn apply(&self, document: &mut Map<String, Value>) {
            document.insert("stamped".into(), Value::Bool(true));
        }
    }

    #[test]
    fn test_register_dedupes_by_name() {
        let mut registry = ConventionRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.register(Stamp));
        assert!(!registry.register(Stamp));
        assert!(!registry.register_boxed(Box::new(Stamp)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_defaults_and_kinds() {
        let registry = ConventionRegistry::with_defaults();
        assert_eq!(
            registry.names(),
            vec!["generate_string_ids", "ignore_if_null", "utc_timestamps"]
        );

        let registry = ConventionRegistry::from_kinds(&[
            ConventionKind::UtcTimestamps,
            ConventionKind::UtcTimestamps,
        ]);
        assert_eq!(registry.names(), vec!["utc_timestamps"]);
    }

    #[test]
    fn test_apply_runs_in_order() {
        let mut registry = ConventionRegistry::with_defaults();
        registry.register(Stamp);

        let mut doc = json!({"_id": null, "note": null, "at": "2024-01-01T01:00:00+01:00"});
        registry.apply(&mut doc);

        assert!(doc["_id"].as_str().is_some_and(|id| !id.is_empty()));
        assert!(doc.get("note").is_none());
        assert_eq!(doc["at"], json!("2024-01-01T00:00:00Z"));
        assert_eq!(doc["stamped"], json!(true));

        let mut scalar = json!(5);
        registry.apply(&mut scalar);
        assert_eq!(scalar, json!(5));
    }

    #[test]
    fn test_kind_serde_names() {
        let kinds: Vec<ConventionKind> =
            serde_json::from_str(r#"["ignore_if_null", "generate_string_ids"]"#).unwrap();
        assert_eq!(
            kinds,
            vec![ConventionKind::IgnoreIfNull, ConventionKind::GenerateStringIds]
        );
    }
}
