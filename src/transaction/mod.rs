//! Transaction management for docscope.
//!
//! A [`TransactionScope`] groups repository calls into one atomic unit of
//! work. The scope owns the store session; repositories only look at the
//! scope to decide whether a call runs inside the transaction or on its own.
//!
//! # Usage
//!
//! ```ignore
//! use docscope::transaction::TransactionScope;
//!
//! let mut scope = TransactionScope::new(client.clone());
//! scope.start(&cancel).await?;
//!
//! users.add(alice, Some(&scope), &cancel).await?;
//! users.delete(&bob_id, Some(&scope), &cancel).await?;
//!
//! scope.commit(&cancel).await?;  // or scope.abort(&cancel).await?
//! ```

mod error;
mod scope;

pub use error::{TransactionError, TransactionResult};
pub use scope::{ScopeState, TransactionScope};
