//! SQLite-specific error types

use migrate_core::LedgerError;
use std::path::PathBuf;
use thiserror::Error;

/// Message reported when the database file is missing
pub const DATABASE_MISSING: &str = "P1003: SQLite database file doesn't exist";

/// Errors that can occur inside the SQLite ledger store
#[derive(Debug, Error)]
pub enum SqliteLedgerError {
    /// Database file does not exist and creation was not requested
    #[error("P1003: SQLite database file doesn't exist")]
    DatabaseDoesNotExist(PathBuf),

    /// Failed to open the database connection
    #[error("Failed to connect to database '{path}': {message}")]
    ConnectionFailed { path: PathBuf, message: String },

    /// A ledger row could not be decoded
    #[error("Invalid ledger row: {0}")]
    InvalidRow(String),

    /// Ledger-level failure (conflict, missing migration)
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Generic SQLite error wrapper
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SqliteLedgerError> for LedgerError {
    fn from(err: SqliteLedgerError) -> Self {
        match err {
            SqliteLedgerError::Ledger(inner) => inner,
            err @ (SqliteLedgerError::DatabaseDoesNotExist(_)
            | SqliteLedgerError::ConnectionFailed { .. }) => {
                LedgerError::Connection(err.to_string())
            }
            other => LedgerError::Storage(other.to_string()),
        }
    }
}
