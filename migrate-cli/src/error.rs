//! CLI-specific error types

use migrate_core::ResolveError;
use thiserror::Error;

use crate::connector::ConfigError;

/// Message for an invocation without the early-access flag
pub const EARLY_ACCESS: &str = "This feature is currently in Early Access. There may be bugs and \
     it's not recommended to use it in production environments.\n\
     Please provide the --early-access-feature flag to use this command.";

/// Errors that can occur during a `migrate` invocation
#[derive(Debug, Error)]
pub enum CliError {
    /// The command requires the early-access opt-in flag
    #[error("{}", EARLY_ACCESS)]
    EarlyAccess,

    /// No schema file could be located
    #[error("{0}")]
    ConfigNotFound(String),

    /// The schema file has no usable datasource
    #[error("{0}")]
    Schema(String),

    /// The datasource is reachable but its ledger cannot be opened here
    #[error("Resolving migrations is not supported for the `{0}` provider by this binary.")]
    UnsupportedProvider(String),

    /// Invalid connector configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Resolution failed
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// IO error (filesystem, stdout, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Returns true if the target database could not be reached
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Resolve(err) if err.is_connection())
    }
}
