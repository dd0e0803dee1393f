//! # migrate-cli
//!
//! The `migrate` command line. Its one subcommand, `resolve`, records the
//! operator's decision about a failed migration in the migration history:
//!
//! ```text
//! migrate resolve --early-access-feature --applied 20201231000000_example
//! migrate resolve --early-access-feature --rolledback 20201231000000_example
//! ```
//!
//! The command finds the schema file, reads its datasource, opens that
//! database's ledger and runs a [`migrate_core::Resolver`] against it.

pub mod connector;
pub mod datasource;
pub mod error;
pub mod gateway;
pub mod reporter;
pub mod schema;

pub use connector::{ConfigError, ConnectorConfig, ConnectorConfigBuilder};
pub use error::CliError;
pub use gateway::{resolve, Context, ResolveArgs};
pub use reporter::{CapturingReporter, ConsoleReporter, Reporter};
