//! store layer for docscope
//!
//! This module defines the contract the transaction and repository layers
//! consume from a document store, and ships one implementation of it. The
//! upper layers only ever talk to the [`Client`], [`Session`] and
//! [`Collection`] traits.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Client                              │
//! │        (opens sessions, hands out collection handles)       │
//! └─────────────────────────────────────────────────────────────┘
//!                  │                            │
//!                  ▼                            ▼
//!          ┌─────────────┐              ┌─────────────┐
//!          │   Session   │◄─── bound ───│ Collection  │
//!          │(transaction)│   (optional) │(filtered ops)│
//!          └─────────────┘              └─────────────┘
//! ```

mod client;
mod error;
mod filter;
pub mod memory;
mod results;
mod types;

// Re-export public API
pub use client::{Client, Collection, Session};
pub use error::{StoreError, StoreResult};
pub use filter::{Filter, ID_FIELD};
pub use memory::{MemoryClient, MemoryCollection, MemorySession, SessionInfo};
pub use results::{
    BulkFailureKind, BulkWriteFailure, DeleteResult, InsertManyResult, ReplaceResult,
};
pub use types::{
    CollectionName, DatabaseName, DocumentKey, InvalidNameError, Namespace, SessionId,
};
