//! High-level database API.
//!
//! This module provides the user-facing entry point: configuration and a
//! [`Database`] handle that hands out repositories and transaction scopes.

mod api;
mod config;

pub use api::{Database, DatabaseError, DatabaseResult};
pub use config::DatabaseConfig;
