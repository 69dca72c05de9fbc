//! Shared state of the in-memory store.
//!
//! Committed documents live in one map per namespace. A transaction never
//! touches that map until commit: its writes are staged on the session, and
//! reads made through the session see committed data overlaid by the staged
//! writes. Commit validates every staged document against the version it saw
//! when the document was first written (first committer wins) and then applies
//! all of them under the write lock.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use crate::store::client::Session;
use crate::store::error::{StoreError, StoreResult};
use crate::store::memory::session::MemorySession;
use crate::store::types::{DocumentKey, Namespace, SessionId};

pub(crate) type Documents = BTreeMap<DocumentKey, Record>;
type Collections = HashMap<Namespace, Documents>;

/// A committed document.
#[derive(Debug, Clone)]
pub(crate) struct Record {
    /// engine-wide monotonic version, bumped on every committed write
    pub version: u64,
    pub body: Value,
}

/// Writes staged by one transaction, grouped by namespace.
#[derive(Debug)]
pub(crate) struct StagedTransaction {
    pub started_at: DateTime<Utc>,
    pub writes: BTreeMap<Namespace, BTreeMap<DocumentKey, StagedWrite>>,
}

impl StagedTransaction {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            writes: BTreeMap::new(),
        }
    }

    pub fn write_count(&self) -> usize {
        self.writes.values().map(BTreeMap::len).sum()
    }
}

/// One staged document. `body == None` stages a delete.
#[derive(Debug, Clone)]
pub(crate) struct StagedWrite {
    /// committed version when the transaction first wrote this document
    pub base_version: Option<u64>,
    pub body: Option<Value>,
}

/// Metadata of an open session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: SessionId,
    pub opened_at: DateTime<Utc>,
}

pub(crate) struct Engine {
    collections: RwLock<Collections>,
    sessions: RwLock<HashMap<SessionId, SessionInfo>>,
    next_version: AtomicU64,
    available: AtomicBool,
    latency: Option<Duration>,
}

impl Engine {
    pub fn new(latency: Option<Duration>) -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
            next_version: AtomicU64::new(1),
            available: AtomicBool::new(true),
            latency,
        }
    }

    /// Simulated round trip. Every store call awaits this before acting, so a
    /// dropped future never applies anything.
    pub async fn io(&self) -> StoreResult<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.ensure_available()
    }

    pub fn ensure_available(&self) -> StoreResult<()> {
        if self.available.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("store has been shut down".into()))
        }
    }

    pub fn shutdown(&self) {
        self.available.store(false, Ordering::Release);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    fn bump_version(&self) -> u64 {
        self.next_version.fetch_add(1, Ordering::AcqRel)
    }

    // ==================== Sessions ====================

    pub fn register_session(&self) -> SessionInfo {
        let info = SessionInfo {
            id: SessionId::generate(),
            opened_at: Utc::now(),
        };
        self.sessions.write().insert(info.id.clone(), info.clone());
        info
    }

    pub fn release_session(&self, id: &SessionId) {
        self.sessions.write().remove(id);
    }

    pub fn active_sessions(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<_> = self.sessions.read().values().cloned().collect();
        sessions.sort_by(|a, b| a.id.cmp(&b.id));
        sessions
    }

    // ==================== Reads and writes ====================

    /// Run a read against the state visible to `session` (or committed state).
    pub fn read<T>(
        &self,
        session: Option<&MemorySession>,
        f: impl FnOnce(&Reader<'_>) -> T,
    ) -> StoreResult<T> {
        let state = session.map(MemorySession::lock_state);
        if let (Some(session), Some(state)) = (session, state.as_ref()) {
            if state.ended {
                return Err(StoreError::SessionEnded(session.id().to_string()));
            }
        }

        let committed = self.collections.read();
        let reader = Reader {
            committed: &committed,
            staged: state.as_ref().and_then(|s| s.transaction.as_ref()),
        };
        Ok(f(&reader))
    }

    /// Run a write. Inside a transaction the write is staged on the session,
    /// otherwise it is applied to committed state immediately.
    pub fn write<T>(
        &self,
        session: Option<&MemorySession>,
        f: impl FnOnce(&mut Writer<'_>) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut state = session.map(MemorySession::lock_state);
        if let (Some(session), Some(state)) = (session, state.as_ref()) {
            if state.ended {
                return Err(StoreError::SessionEnded(session.id().to_string()));
            }
        }

        match state.as_deref_mut().and_then(|s| s.transaction.as_mut()) {
            Some(tx) => {
                let committed = self.collections.read();
                let mut writer = Writer {
                    engine: self,
                    mode: WriteMode::Staged {
                        committed: &committed,
                        tx,
                    },
                };
                f(&mut writer)
            }
            None => {
                let mut committed = self.collections.write();
                let mut writer = Writer {
                    engine: self,
                    mode: WriteMode::Direct(&mut committed),
                };
                f(&mut writer)
            }
        }
    }

    /// Apply a staged transaction atomically.
    ///
    /// Returns the number of documents written. On conflict nothing is applied.
    pub fn commit(&self, session: &SessionId, tx: StagedTransaction) -> StoreResult<usize> {
        let mut committed = self.collections.write();

        let mut conflicts = Vec::new();
        for (namespace, writes) in &tx.writes {
            let documents = committed.get(namespace);
            for (key, write) in writes {
                let current = documents.and_then(|d| d.get(key)).map(|r| r.version);
                if current != write.base_version {
                    conflicts.push(format!("{namespace}/{key}"));
                }
            }
        }

        if !conflicts.is_empty() {
            debug!(
                session = %session,
                conflicts = conflicts.len(),
                "transaction commit rejected"
            );
            return Err(StoreError::WriteConflict { documents: conflicts });
        }

        let applied = tx.write_count();
        for (namespace, writes) in tx.writes {
            let documents = committed.entry(namespace).or_default();
            for (key, write) in writes {
                match write.body {
                    Some(body) => {
                        documents.insert(
                            key,
                            Record {
                                version: self.bump_version(),
                                body,
                            },
                        );
                    }
                    None => {
                        documents.remove(&key);
                    }
                }
            }
        }

        debug!(
            session = %session,
            applied,
            elapsed_ms = (Utc::now() - tx.started_at).num_milliseconds(),
            "transaction committed"
        );
        Ok(applied)
    }
}

fn visible_get<'a>(
    committed: &'a Collections,
    staged: Option<&'a StagedTransaction>,
    namespace: &Namespace,
    key: &DocumentKey,
) -> Option<&'a Value> {
    if let Some(write) = staged
        .and_then(|tx| tx.writes.get(namespace))
        .and_then(|writes| writes.get(key))
    {
        return write.body.as_ref();
    }
    committed
        .get(namespace)
        .and_then(|documents| documents.get(key))
        .map(|record| &record.body)
}

fn visible_scan<'a>(
    committed: &'a Collections,
    staged: Option<&'a StagedTransaction>,
    namespace: &Namespace,
) -> BTreeMap<&'a DocumentKey, &'a Value> {
    let mut visible: BTreeMap<&DocumentKey, &Value> = committed
        .get(namespace)
        .map(|documents| documents.iter().map(|(k, r)| (k, &r.body)).collect())
        .unwrap_or_default();

    if let Some(writes) = staged.and_then(|tx| tx.writes.get(namespace)) {
        for (key, write) in writes {
            match &write.body {
                Some(body) => {
                    visible.insert(key, body);
                }
                None => {
                    visible.remove(key);
                }
            }
        }
    }
    visible
}

/// Read access to the documents visible to one caller.
pub(crate) struct Reader<'a> {
    committed: &'a Collections,
    staged: Option<&'a StagedTransaction>,
}

impl Reader<'_> {
    pub fn get(&self, namespace: &Namespace, key: &DocumentKey) -> Option<&Value> {
        visible_get(self.committed, self.staged, namespace, key)
    }

    /// Visible documents in key order.
    pub fn scan(&self, namespace: &Namespace) -> Vec<&Value> {
        visible_scan(self.committed, self.staged, namespace)
            .into_values()
            .collect()
    }
}

enum WriteMode<'a> {
    Direct(&'a mut Collections),
    Staged {
        committed: &'a Collections,
        tx: &'a mut StagedTransaction,
    },
}

/// Write access for one store call.
pub(crate) struct Writer<'a> {
    engine: &'a Engine,
    mode: WriteMode<'a>,
}

impl Writer<'_> {
    /// True when writes are staged on a transaction instead of applied.
    pub fn is_transactional(&self) -> bool {
        matches!(self.mode, WriteMode::Staged { .. })
    }

    pub fn get(&self, namespace: &Namespace, key: &DocumentKey) -> Option<&Value> {
        match &self.mode {
            WriteMode::Direct(committed) => visible_get(committed, None, namespace, key),
            WriteMode::Staged { committed, tx } => {
                visible_get(committed, Some(&**tx), namespace, key)
            }
        }
    }

    /// Keys of visible documents in order.
    pub fn keys(&self, namespace: &Namespace) -> Vec<DocumentKey> {
        let visible = match &self.mode {
            WriteMode::Direct(committed) => visible_scan(committed, None, namespace),
            WriteMode::Staged { committed, tx } => visible_scan(committed, Some(&**tx), namespace),
        };
        visible.into_keys().cloned().collect()
    }

    pub fn put(&mut self, namespace: &Namespace, key: DocumentKey, body: Value) {
        match &mut self.mode {
            WriteMode::Direct(committed) => {
                let record = Record {
                    version: self.engine.bump_version(),
                    body,
                };
                committed
                    .entry(namespace.clone())
                    .or_default()
                    .insert(key, record);
            }
            WriteMode::Staged { committed, tx } => {
                stage(committed, tx, namespace, key).body = Some(body);
            }
        }
    }

    /// Remove a visible document. Returns false when there was nothing to remove.
    pub fn remove(&mut self, namespace: &Namespace, key: &DocumentKey) -> bool {
        if self.get(namespace, key).is_none() {
            return false;
        }
        match &mut self.mode {
            WriteMode::Direct(committed) => committed
                .get_mut(namespace)
                .and_then(|documents| documents.remove(key))
                .is_some(),
            WriteMode::Staged { committed, tx } => {
                stage(committed, tx, namespace, key.clone()).body = None;
                true
            }
        }
    }
}

fn stage<'t>(
    committed: &Collections,
    tx: &'t mut StagedTransaction,
    namespace: &Namespace,
    key: DocumentKey,
) -> &'t mut StagedWrite {
    let base_version = committed
        .get(namespace)
        .and_then(|documents| documents.get(&key))
        .map(|record| record.version);
    tx.writes
        .entry(namespace.clone())
        .or_default()
        .entry(key)
        .or_insert(StagedWrite {
            base_version,
            body: None,
        })
}
