//! Sessions of the in-memory store.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, MutexGuard};
use tracing::debug;

use crate::store::client::Session;
use crate::store::error::{StoreError, StoreResult};
use crate::store::memory::engine::{Engine, SessionInfo, StagedTransaction};
use crate::store::types::SessionId;

#[derive(Debug, Default)]
pub(crate) struct SessionState {
    pub transaction: Option<StagedTransaction>,
    pub ended: bool,
}

/// A session on a [`MemoryClient`](super::MemoryClient).
///
/// Dropping the session ends it, which discards any open transaction.
pub struct MemorySession {
    info: SessionInfo,
    engine: Arc<Engine>,
    state: Mutex<SessionState>,
}

impl MemorySession {
    pub(crate) fn new(info: SessionInfo, engine: Arc<Engine>) -> Self {
        Self {
            info,
            engine,
            state: Mutex::new(SessionState::default()),
        }
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock()
    }

    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    pub fn has_ended(&self) -> bool {
        self.state.lock().ended
    }

    /// Detach the running transaction. The session is out of the transaction
    /// from here on, whatever happens to the detached writes.
    fn take_transaction(&mut self) -> StoreResult<StagedTransaction> {
        let state = self.state.get_mut();
        if state.ended {
            return Err(StoreError::SessionEnded(self.info.id.to_string()));
        }
        state
            .transaction
            .take()
            .ok_or_else(|| StoreError::NoTransaction(self.info.id.to_string()))
    }
}

#[async_trait]
impl Session for MemorySession {
    fn id(&self) -> &SessionId {
        &self.info.id
    }

    fn start_transaction(&mut self) -> StoreResult<()> {
        let state = self.state.get_mut();
        if state.ended {
            return Err(StoreError::SessionEnded(self.info.id.to_string()));
        }
        if state.transaction.is_some() {
            return Err(StoreError::TransactionInProgress(self.info.id.to_string()));
        }
        state.transaction = Some(StagedTransaction::new());
        debug!(session = %self.info.id, "transaction started");
        Ok(())
    }

    async fn commit_transaction(&mut self) -> StoreResult<()> {
        let tx = self.take_transaction()?;
        self.engine.io().await?;
        self.engine.commit(&self.info.id, tx).map(|_| ())
    }

    async fn abort_transaction(&mut self) -> StoreResult<()> {
        let tx = self.take_transaction()?;
        debug!(
            session = %self.info.id,
            discarded = tx.write_count(),
            "transaction aborted"
        );
        self.engine.io().await
    }

    fn is_in_transaction(&self) -> bool {
        let state = self.state.lock();
        !state.ended && state.transaction.is_some()
    }

    fn end(&mut self) {
        let state = self.state.get_mut();
        if state.ended {
            return;
        }
        if let Some(tx) = state.transaction.take() {
            debug!(
                session = %self.info.id,
                discarded = tx.write_count(),
                "session ended with open transaction"
            );
        }
        state.ended = true;
        self.engine.release_session(&self.info.id);
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.end();
    }
}

impl std::fmt::Debug for MemorySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySession")
            .field("id", &self.info.id)
            .field("in_transaction", &self.is_in_transaction())
            .finish()
    }
}
