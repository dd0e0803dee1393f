//! Configuration for opening a SQLite ledger

use std::time::Duration;
use thiserror::Error;

/// Default time SQLite waits on a locked database before giving up
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors that can occur when building a [`LedgerConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A zero busy timeout makes every concurrent commit fail immediately
    #[error("busy timeout must be greater than zero")]
    ZeroBusyTimeout,
}

/// Options for opening a SQLite ledger
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// How long to wait for another writer to release the database
    pub busy_timeout: Duration,

    /// Create the database file if it does not exist.
    /// Resolution never creates databases; runners and tests may.
    pub create_if_missing: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            create_if_missing: false,
        }
    }
}

impl LedgerConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder for constructing configuration
    pub fn builder() -> LedgerConfigBuilder {
        LedgerConfigBuilder::default()
    }
}

/// Builder for [`LedgerConfig`]
#[derive(Debug, Default)]
pub struct LedgerConfigBuilder {
    busy_timeout: Option<Duration>,
    create_if_missing: bool,
}

impl LedgerConfigBuilder {
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = Some(timeout);
        self
    }

    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroBusyTimeout`] for a zero busy timeout.
    pub fn build(self) -> Result<LedgerConfig, ConfigError> {
        let busy_timeout = self.busy_timeout.unwrap_or(DEFAULT_BUSY_TIMEOUT);
        if busy_timeout.is_zero() {
            return Err(ConfigError::ZeroBusyTimeout);
        }

        Ok(LedgerConfig {
            busy_timeout,
            create_if_missing: self.create_if_missing,
        })
    }
}
