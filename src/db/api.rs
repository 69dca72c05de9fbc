//! Database API - the entry point that wires a client, a database name and
//! conventions into repositories and transaction scopes.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::conventions::ConventionRegistry;
use crate::db::config::DatabaseConfig;
use crate::repository::{Document, Repository};
use crate::store::{Client, CollectionName, DatabaseName, InvalidNameError, MemoryClient};
use crate::transaction::TransactionScope;

/// Result type for database operations.
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Database errors.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid name: {0}")]
    InvalidName(#[from] InvalidNameError),

    #[error("configuration parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// The main database handle.
///
/// Cheap to clone; clones share the client and the convention registry.
pub struct Database<C: Client> {
    client: C,
    name: DatabaseName,
    conventions: Arc<ConventionRegistry>,
}

impl Database<MemoryClient> {
    /// Open an in-memory database.
    pub fn open(config: DatabaseConfig) -> DatabaseResult<Self> {
        let client = match config.latency() {
            Some(latency) => MemoryClient::with_latency(latency),
            None => MemoryClient::new(),
        };
        Self::with_client(client, &config)
    }
}

impl<C: Client> Database<C> {
    /// Wrap an existing client.
    pub fn with_client(client: C, config: &DatabaseConfig) -> DatabaseResult<Self> {
        config.validate()?;
        let name = DatabaseName::new(config.database_name.as_str())?;
        let conventions = ConventionRegistry::from_kinds(&config.conventions);
        debug!(database = %name, conventions = ?conventions, "database opened");

        Ok(Self {
            client,
            name,
            conventions: Arc::new(conventions),
        })
    }

    /// Replace the convention registry, e.g. to add custom conventions.
    pub fn with_conventions(mut self, conventions: ConventionRegistry) -> Self {
        self.conventions = Arc::new(conventions);
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn name(&self) -> &DatabaseName {
        &self.name
    }

    pub fn conventions(&self) -> &ConventionRegistry {
        &self.conventions
    }

    /// Handle to the collection a document type lives in.
    pub fn collection<D: Document>(&self) -> DatabaseResult<C::Collection> {
        self.collection_named(D::COLLECTION)
    }

    pub fn collection_named(&self, name: &str) -> DatabaseResult<C::Collection> {
        let name = CollectionName::new(name)?;
        Ok(self.client.collection(&self.name, &name))
    }

    /// Repository over the collection of `D`, applying this database's conventions.
    pub fn repository<D: Document, Id>(&self) -> DatabaseResult<Repository<D, Id, C>> {
        let collection = self.collection::<D>()?;
        Ok(Repository::new(collection).with_conventions(self.conventions.clone()))
    }

    /// A fresh, inactive scope over this database's client.
    pub fn transaction_scope(&self) -> TransactionScope<C> {
        TransactionScope::new(self.client.clone())
    }
}

impl<C: Client> Clone for Database<C> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            name: self.name.clone(),
            conventions: self.conventions.clone(),
        }
    }
}

impl<C: Client> std::fmt::Debug for Database<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .field("conventions", &self.conventions)
            .finish()
    }
}
