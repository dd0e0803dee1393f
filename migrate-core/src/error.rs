//! Error types for migration resolution
//!
//! [`LedgerError`] is what a [`LedgerStore`](crate::LedgerStore) reports;
//! [`ResolveError`] is the user-facing error of a resolution and wraps store
//! failures. Connection failures pass through with their message untouched so
//! the operator sees exactly what the database reported.

use crate::migration::MigrationStatus;
use crate::request::ResolveAction;
use thiserror::Error;

/// Errors reported by ledger storage backends
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The target database is unreachable or does not exist
    #[error("{0}")]
    Connection(String),

    /// No ledger row exists for the migration
    #[error("migration not found in ledger: {0}")]
    NotFound(String),

    /// The row changed between load and commit
    #[error("ledger conflict for '{id}': expected status {expected}, found {actual}")]
    Conflict {
        id: String,
        expected: MigrationStatus,
        actual: MigrationStatus,
    },

    /// Any other storage failure
    #[error("ledger storage error: {0}")]
    Storage(String),
}

/// Errors that terminate a resolution
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Missing or conflicting action flags
    #[error("{0}")]
    Usage(String),

    /// The migration has no record in the ledger
    #[error("Failed to read migration script: migration `{0}` is not recorded in the migration history.")]
    NotFound(String),

    /// Marking as applied a migration that is not in a failed state
    #[error("The migration `{0}` is already recorded as applied in the database.")]
    AlreadyApplied(String),

    /// Rolling back a migration with no application attempt
    #[error("Migration `{0}` cannot be rolled back because it was never applied to the database.")]
    NeverApplied(String),

    /// Resolving a migration that is not in a failed state
    #[error("Migration `{id}` cannot be {} because it is not in a failed state.", not_failed_verb(.action))]
    NotFailed { id: String, action: ResolveAction },

    /// The target database is unreachable or does not exist
    #[error("{0}")]
    Connection(String),

    /// Ledger storage failed after the request was validated
    #[error("{0}")]
    Ledger(LedgerError),
}

fn not_failed_verb(action: &ResolveAction) -> &'static str {
    match action {
        ResolveAction::Applied(_) => "marked as applied",
        ResolveAction::RolledBack(_) => "rolled back",
    }
}

impl ResolveError {
    /// Returns true for errors caused by the requested state transition
    pub fn is_transition(&self) -> bool {
        matches!(
            self,
            Self::AlreadyApplied(_) | Self::NeverApplied(_) | Self::NotFailed { .. }
        )
    }

    /// Returns true if the database could not be reached
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

impl From<LedgerError> for ResolveError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Connection(message) => ResolveError::Connection(message),
            LedgerError::NotFound(id) => ResolveError::NotFound(id),
            other => ResolveError::Ledger(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_applied_display() {
        let err = ResolveError::AlreadyApplied("20201231000000_init".to_string());
        assert_eq!(
            err.to_string(),
            "The migration `20201231000000_init` is already recorded as applied in the database."
        );
        assert!(err.is_transition());
    }

    #[test]
    fn test_never_applied_display() {
        let err = ResolveError::NeverApplied("does_not_exist".to_string());
        assert_eq!(
            err.to_string(),
            "Migration `does_not_exist` cannot be rolled back because it was never applied to the database."
        );
    }

    #[test]
    fn test_not_failed_display() {
        let err = ResolveError::NotFailed {
            id: "20201231000000_init".to_string(),
            action: ResolveAction::RolledBack("20201231000000_init".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Migration `20201231000000_init` cannot be rolled back because it is not in a failed state."
        );

        let err = ResolveError::NotFailed {
            id: "20201231000000_init".to_string(),
            action: ResolveAction::Applied("20201231000000_init".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Migration `20201231000000_init` cannot be marked as applied because it is not in a failed state."
        );
    }

    #[test]
    fn test_not_found_display() {
        let err = ResolveError::NotFound("does_not_exist".to_string());
        assert!(err.to_string().starts_with("Failed to read migration script"));
        assert!(err.to_string().contains("does_not_exist"));
    }

    #[test]
    fn test_connection_error_passes_through_verbatim() {
        let err: ResolveError =
            LedgerError::Connection("P1003: SQLite database file doesn't exist".to_string())
                .into();
        assert!(err.is_connection());
        assert_eq!(err.to_string(), "P1003: SQLite database file doesn't exist");
    }

    #[test]
    fn test_ledger_not_found_maps_to_not_found() {
        let err: ResolveError = LedgerError::NotFound("x".to_string()).into();
        assert!(matches!(err, ResolveError::NotFound(id) if id == "x"));
    }

    #[test]
    fn test_conflict_display() {
        let err = LedgerError::Conflict {
            id: "20201231000000_a".to_string(),
            expected: MigrationStatus::Failed,
            actual: MigrationStatus::Applied,
        };
        assert_eq!(
            err.to_string(),
            "ledger conflict for '20201231000000_a': expected status Failed, found Applied"
        );
        let err: ResolveError = err.into();
        assert!(matches!(err, ResolveError::Ledger(LedgerError::Conflict { .. })));
    }

    #[test]
    fn test_storage_display() {
        let err = LedgerError::Storage("disk I/O error".to_string());
        assert_eq!(err.to_string(), "ledger storage error: disk I/O error");
    }
}
