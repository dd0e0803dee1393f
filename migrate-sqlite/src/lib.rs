//! # migrate-sqlite
//!
//! SQLite implementation of [`migrate_core::LedgerStore`].
//!
//! The migration history is kept in a `_schema_migrations` table inside the
//! target database. Every attempt to apply a migration is one row; the most
//! recent row for a migration id is the one resolution acts on.
//!
//! ```no_run
//! use migrate_core::{ResolutionRequest, Resolver};
//! use migrate_sqlite::SqliteLedgerStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SqliteLedgerStore::open("prisma/dev.db")?;
//! let outcome = Resolver::new(store)
//!     .resolve(ResolutionRequest::applied("20201231000000_example"))
//!     .await?;
//! println!("{outcome}");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
mod store;

#[cfg(test)]
mod test_utils;

pub use config::{ConfigError, LedgerConfig, LedgerConfigBuilder, DEFAULT_BUSY_TIMEOUT};
pub use error::{SqliteLedgerError, DATABASE_MISSING};
pub use store::{SqliteLedgerStore, LEDGER_TABLE};
