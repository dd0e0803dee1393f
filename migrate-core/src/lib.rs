//! # migrate-core
//!
//! Migration-history reconciliation: the ledger model and the state machine
//! behind `migrate resolve`.
//!
//! When applying a migration fails, the ledger keeps a `Failed` record and
//! further migrations are blocked until an operator decides what happened:
//! either the changes were completed by hand (mark as **applied**) or they
//! were reverted (mark as **rolled back**). This crate validates that
//! decision against the recorded status and commits it to the ledger.
//!
//! ## Quick Start
//!
//! ```ignore
//! use migrate_core::{ResolutionRequest, Resolver};
//!
//! # async fn example(store: impl migrate_core::LedgerStore) -> Result<(), migrate_core::ResolveError> {
//! let resolver = Resolver::new(store);
//! let outcome = resolver
//!     .resolve(ResolutionRequest::rolled_back("20201231000000_example"))
//!     .await?;
//! println!("{outcome}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Storage
//!
//! The resolver works against any [`LedgerStore`]. The `migrate-sqlite`
//! crate provides the SQLite implementation; the `test-utils` feature
//! exposes an in-memory one.

pub mod error;
pub mod ledger;
pub mod migration;
pub mod request;
pub mod resolver;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use error::{LedgerError, ResolveError};
pub use ledger::{check_commit, Ledger, LedgerStore};
pub use migration::{compute_checksum, MigrationRecord, MigrationStatus};
pub use request::{ResolutionRequest, ResolveAction};
pub use resolver::{plan_transition, Outcome, Resolver, Transition};

/// Result type for resolution operations
pub type Result<T> = std::result::Result<T, ResolveError>;
