//! Database configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::conventions::ConventionKind;
use crate::db::api::{DatabaseError, DatabaseResult};
use crate::store::DatabaseName;

/// Database configuration options.
///
/// Every field has a default, so a configuration file only needs the fields
/// it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Name of the logical database collections live in.
    pub database_name: String,
    /// Conventions applied to documents written through repositories, in order.
    pub conventions: Vec<ConventionKind>,
    /// Simulated per-call latency of the in-memory store, in milliseconds.
    pub io_latency_ms: Option<u64>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_name: DatabaseName::DEFAULT.to_string(),
            conventions: ConventionKind::ALL.to_vec(),
            io_latency_ms: None,
        }
    }
}

impl DatabaseConfig {
    /// Create a new configuration for the named database.
    pub fn new(database_name: impl Into<String>) -> Self {
        Self {
            database_name: database_name.into(),
            ..Default::default()
        }
    }

    /// Replace the convention list.
    pub fn conventions(mut self, conventions: Vec<ConventionKind>) -> Self {
        self.conventions = conventions;
        self
    }

    /// Disable all conventions.
    pub fn without_conventions(mut self) -> Self {
        self.conventions.clear();
        self
    }

    pub fn io_latency(mut self, latency: Duration) -> Self {
        self.io_latency_ms = Some(u64::try_from(latency.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn latency(&self) -> Option<Duration> {
        self.io_latency_ms.map(Duration::from_millis)
    }

    pub fn from_json_str(json: &str) -> DatabaseResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> DatabaseResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> DatabaseResult<()> {
        DatabaseName::new(self.database_name.as_str())
            .map_err(|err| DatabaseError::InvalidConfig(format!("database_name: {err}")))?;
        Ok(())
    }
}
