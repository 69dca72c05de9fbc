//! Outcomes reported by store write operations.
//!
//! Zero matches are reported as counts, never as errors.

use serde::Serialize;
use serde_json::Value;

/// Result of a single or bulk insert.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InsertManyResult {
    /// `_id` values of the inserted documents, in input order.
    pub inserted_ids: Vec<Value>,
}

/// Result of a single or bulk replace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplaceResult {
    /// Documents matched by the filter(s).
    pub matched_count: u64,
    /// Documents whose content actually changed.
    pub modified_count: u64,
}

impl ReplaceResult {
    /// True when at least one document matched.
    pub fn matched_any(&self) -> bool {
        self.matched_count > 0
    }

    pub(crate) fn record(&mut self, matched: bool, modified: bool) {
        if matched {
            self.matched_count += 1;
        }
        if modified {
            self.modified_count += 1;
        }
    }
}

/// Result of a single or bulk delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeleteResult {
    pub deleted_count: u64,
}

/// Why one entry of a bulk write failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BulkFailureKind {
    DuplicateKey,
    ImmutableId,
    InvalidDocument,
}

/// One failed entry of a bulk write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkWriteFailure {
    /// Position of the entry in the submitted batch.
    pub index: usize,
    pub kind: BulkFailureKind,
    pub message: String,
}
