//! In-process document store.
//!
//! `MemoryClient` implements the [`Client`] contract entirely in memory:
//! namespaced collections of JSON documents, sessions with staged
//! transactions, and first-committer-wins conflict detection at commit.
//!
//! # Usage
//!
//! ```ignore
//! use docscope::store::{Client, Collection, Filter, MemoryClient, Session};
//!
//! let client = MemoryClient::new();
//! let users = client.collection(&database, &collection);
//!
//! let mut session = client.start_session().await?;
//! session.start_transaction()?;
//! users.insert_one(json!({"_id": 1, "name": "Alice"}), Some(&session)).await?;
//! session.commit_transaction().await?;
//!
//! let alice = users.find_one(&Filter::id_eq(1), None).await?;
//! ```

mod collection;
mod engine;
mod session;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::store::client::Client;
use crate::store::error::StoreResult;
use crate::store::types::{CollectionName, DatabaseName, Namespace};

pub use collection::MemoryCollection;
pub use engine::SessionInfo;
pub use session::MemorySession;

use engine::Engine;

/// Handle to an in-memory store. Clones share the same data.
#[derive(Clone)]
pub struct MemoryClient {
    engine: Arc<Engine>,
}

impl MemoryClient {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            engine: Arc::new(Engine::new(None)),
        }
    }

    /// Create an empty store where every call suspends for `latency` before
    /// acting, like a network round trip.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            engine: Arc::new(Engine::new(Some(latency))),
        }
    }

    /// Stop serving. Every later call fails with `StoreError::Unavailable`.
    pub fn shutdown(&self) {
        debug!("memory store shut down");
        self.engine.shutdown();
    }

    pub fn is_available(&self) -> bool {
        self.engine.is_available()
    }

    /// Sessions that have been opened and not yet ended.
    pub fn active_sessions(&self) -> Vec<SessionInfo> {
        self.engine.active_sessions()
    }
}

impl Default for MemoryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryClient")
            .field("available", &self.is_available())
            .field("active_sessions", &self.active_sessions().len())
            .finish()
    }
}

#[async_trait]
impl Client for MemoryClient {
    type Session = MemorySession;
    type Collection = MemoryCollection;

    async fn start_session(&self) -> StoreResult<MemorySession> {
        self.engine.io().await?;
        let info = self.engine.register_session();
        debug!(session = %info.id, "session opened");
        Ok(MemorySession::new(info, self.engine.clone()))
    }

    fn collection(&self, database: &DatabaseName, name: &CollectionName) -> MemoryCollection {
        MemoryCollection::new(
            self.engine.clone(),
            Namespace::new(database.clone(), name.clone()),
        )
    }
}
