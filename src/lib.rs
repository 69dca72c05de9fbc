//! docscope - transaction-scoped repositories over a document store
//!
//! This crate provides generic, typed repositories over collections of JSON
//! documents, and a transaction scope that lets any number of repository
//! calls commit or roll back as one unit of work. Every repository call
//! decides at call time whether it runs inside the caller's transaction or
//! on its own.
//!
//! # Example
//!
//! ```no_run
//! use docscope::db::{Database, DatabaseConfig};
//! use docscope::repository::Document;
//! use serde::{Deserialize, Serialize};
//! use tokio_util::sync::CancellationToken;
//!
//! #[derive(Serialize, Deserialize)]
//! struct User {
//!     #[serde(rename = "_id")]
//!     id: String,
//!     name: String,
//! }
//!
//! impl Document for User {
//!     const COLLECTION: &'static str = "users";
//! }
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::open(DatabaseConfig::default())?;
//! let users = db.repository::<User, String>()?;
//! let cancel = CancellationToken::new();
//!
//! let mut scope = db.transaction_scope();
//! scope.start(&cancel).await?;
//! let alice = User { id: "u1".into(), name: "Alice".into() };
//! users.add(&alice, Some(&scope), &cancel).await?;
//! scope.commit(&cancel).await?;
//! # Ok(())
//! # }
//! ```

pub mod conventions;
pub mod db;
pub mod logging;
pub mod repository;
pub mod store;
pub mod transaction;
