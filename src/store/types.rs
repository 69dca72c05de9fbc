//! core type-safe names and keys for the store layer.

use std::fmt;
use std::fmt::Formatter;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A validated collection name.
///
/// Valid names:
/// - 1-64 characters
/// - Alphanumeric, underscores, hyphens only
/// - Must start with a letter or underscore
/// - Cannot be reserved names (`system`, `_meta`, ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CollectionName(String);

impl CollectionName {
    /// reserved collection names that can't be used
    const RESERVED: &'static [&'static str] = &["system", "_meta", "_system", "_sessions"];

    /// create a new CollectionName, validating the input
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidNameError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    fn validate(name: &str) -> Result<(), InvalidNameError> {
        validate_charset(name, 64)?;

        if let Some(first) = name.chars().next() {
            if !first.is_ascii_alphabetic() && first != '_' {
                return Err(InvalidNameError::InvalidStart(first));
            }
        }

        if Self::RESERVED.contains(&name.to_lowercase().as_str()) {
            return Err(InvalidNameError::Reserved(name.to_string()));
        }

        Ok(())
    }

    /// get the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// convert to owned String
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CollectionName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for CollectionName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A validated database name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DatabaseName(String);

impl DatabaseName {
    /// the database used when none is configured
    pub const DEFAULT: &'static str = "main";

    pub fn new(name: impl Into<String>) -> Result<Self, InvalidNameError> {
        let name = name.into();
        validate_charset(&name, 64)?;
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for DatabaseName {
    fn default() -> Self {
        Self(Self::DEFAULT.to_string())
    }
}

impl fmt::Display for DatabaseName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn validate_charset(name: &str, max_len: usize) -> Result<(), InvalidNameError> {
    if name.is_empty() {
        return Err(InvalidNameError::Empty);
    }

    if name.len() > max_len {
        return Err(InvalidNameError::TooLong(name.len()));
    }

    for (i, c) in name.chars().enumerate() {
        if !c.is_ascii_alphanumeric() && c != '_' && c != '-' {
            return Err(InvalidNameError::InvalidCharacter { char: c, position: i });
        }
    }

    Ok(())
}

/// Fully qualified collection address: `{database}.{collection}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Namespace {
    pub database: DatabaseName,
    pub collection: CollectionName,
}

impl Namespace {
    pub fn new(database: DatabaseName, collection: CollectionName) -> Self {
        Self { database, collection }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

/// Identifier of a store session.
///
/// Session ids are lowercase ULIDs, so they sort by creation time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a new ULID-based session id.
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Storage key derived from a document's `_id` value.
///
/// The key is the compact JSON text of the id, so `5` and `"5"` are
/// different documents, exactly as they would be on a real server. Numbers
/// are keyed by their JSON text as well: `1` and `1.0` are distinct ids.
/// Object ids are keyed by their text with members in sorted order, so two
/// equal embedded ids always share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentKey(String);

impl DocumentKey {
    /// Build a key from an `_id` value. Null and arrays are not valid ids.
    pub fn from_id(id: &Value) -> Option<Self> {
        match id {
            Value::Null | Value::Array(_) => None,
            other => Some(Self(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// error type for invalid names (databases, collections)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidNameError {
    Empty,
    TooLong(usize),
    InvalidStart(char),
    InvalidCharacter { char: char, position: usize },
    Reserved(String),
}

impl fmt::Display for InvalidNameError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "name cannot be empty"),
            Self::TooLong(len) => write!(f, "name too long: {} characters", len),
            Self::InvalidStart(c) => write!(f, "name cannot start with '{}'", c),
            Self::InvalidCharacter { char, position } => {
                write!(f, "invalid character '{}' at position {}", char, position)
            }
            Self::Reserved(name) => write!(f, "'{}' is a reserved name", name),
        }
    }
}

impl std::error::Error for InvalidNameError {}
