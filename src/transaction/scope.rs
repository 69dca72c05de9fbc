//! Transaction scope: the lifecycle of one unit of work.
//!
//! A scope owns at most one store session. `start` opens a session and begins
//! a transaction on it; `commit` and `abort` conclude the transaction and
//! always release the session afterwards, whatever the outcome. Dropping the
//! scope releases a session that is still held, so every exit path of a unit
//! of work (success, error, early return, panic) gives the session back.
//!
//! ```text
//!            start                     commit / abort
//! NoSession ───────► Active ─────────────────────────────► NoSession
//!     ▲                 │ store ends the transaction
//!     │                 ▼
//!     └──── start ─── Ended
//! ```

use std::fmt;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::store::{Client, Session};
use crate::transaction::error::{TransactionError, TransactionResult};

/// Observable state of a [`TransactionScope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeState {
    /// No session is held.
    NoSession,
    /// A session is held and its transaction is in progress.
    Active,
    /// A session is held but its transaction is over. The next `start` or
    /// `dispose` releases it.
    Ended,
}

impl fmt::Display for ScopeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeState::NoSession => write!(f, "no session"),
            ScopeState::Active => write!(f, "active"),
            ScopeState::Ended => write!(f, "ended"),
        }
    }
}

/// One unit of work over a store session.
///
/// Not synchronised: lifecycle calls take `&mut self`, so a scope has exactly
/// one owner driving it sequentially. Repositories observe it through `&self`.
pub struct TransactionScope<C: Client> {
    client: C,
    session: Option<C::Session>,
}

impl<C: Client> TransactionScope<C> {
    /// Create an inactive scope over `client`.
    pub fn new(client: C) -> Self {
        Self {
            client,
            session: None,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn state(&self) -> ScopeState {
        match &self.session {
            None => ScopeState::NoSession,
            Some(session) if session.is_in_transaction() => ScopeState::Active,
            Some(_) => ScopeState::Ended,
        }
    }

    /// True only while a session is held and its transaction is in progress.
    pub fn is_active(&self) -> bool {
        self.state() == ScopeState::Active
    }

    /// The held session.
    pub fn session(&self) -> TransactionResult<&C::Session> {
        self.session.as_ref().ok_or(TransactionError::NotStarted)
    }

    /// Open a session and begin a transaction on it.
    pub async fn start(&mut self, cancel: &CancellationToken) -> TransactionResult<()> {
        if self.is_active() {
            return Err(TransactionError::AlreadyStarted);
        }
        self.release();

        let mut session = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransactionError::Cancelled),
            session = self.client.start_session() => session?,
        };

        if let Err(err) = session.start_transaction() {
            session.end();
            return Err(err.into());
        }

        debug!(session = %session.id(), "transaction scope started");
        self.session = Some(session);
        Ok(())
    }

    /// Commit the running transaction, then release the session.
    ///
    /// The session is released even when the commit fails or is cancelled;
    /// the commit error is returned afterwards.
    pub async fn commit(&mut self, cancel: &CancellationToken) -> TransactionResult<()> {
        let session = self.active_session_mut()?;
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransactionError::Cancelled),
            result = session.commit_transaction() => result.map_err(TransactionError::from),
        };
        debug!(committed = outcome.is_ok(), "transaction scope commit finished");
        self.release();
        outcome
    }

    /// Roll back the running transaction, then release the session.
    ///
    /// The session is released even when the rollback itself fails.
    pub async fn abort(&mut self, cancel: &CancellationToken) -> TransactionResult<()> {
        let session = self.active_session_mut()?;
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransactionError::Cancelled),
            result = session.abort_transaction() => result.map_err(TransactionError::from),
        };
        debug!(aborted = outcome.is_ok(), "transaction scope abort finished");
        self.release();
        outcome
    }

    /// Release the held session, if any. Safe to call any number of times.
    pub fn dispose(&mut self) {
        self.release();
    }

    fn active_session_mut(&mut self) -> TransactionResult<&mut C::Session> {
        match self.session.as_mut() {
            Some(session) if session.is_in_transaction() => Ok(session),
            _ => Err(TransactionError::NotStarted),
        }
    }

    fn release(&mut self) {
        if let Some(mut session) = self.session.take() {
            debug!(session = %session.id(), "transaction scope released session");
            session.end();
        }
    }
}

impl<C: Client> Drop for TransactionScope<C> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<C: Client> fmt::Debug for TransactionScope<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionScope")
            .field("state", &self.state())
            .field("session", &self.session.as_ref().map(|s| s.id().to_string()))
            .finish()
    }
}
