//! Migration records as they appear in a ledger
//!
//! A record describes one *attempt* to apply a migration against a database.
//! Ledgers are append-only, so a migration that was rolled back and attempted
//! again has several records; the most recent one is authoritative.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Recorded status of a migration attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MigrationStatus {
    /// Attempt recorded but never finished
    Pending,
    /// Applied successfully (or marked as applied)
    Applied,
    /// Marked as rolled back after a failure
    RolledBack,
    /// The attempt errored and needs to be resolved
    Failed,
}

impl MigrationStatus {
    /// Returns the canonical storage name of the status
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Applied => "Applied",
            Self::RolledBack => "RolledBack",
            Self::Failed => "Failed",
        }
    }
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown status name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown migration status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for MigrationStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Applied" => Ok(Self::Applied),
            "RolledBack" => Ok(Self::RolledBack),
            "Failed" => Ok(Self::Failed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// A single attempt of a migration recorded in the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    /// Unique identifier of this ledger row
    pub row_id: String,

    /// Migration identifier, `<timestamp>_<name>`
    pub id: String,

    /// SHA256 checksum of the migration script
    pub checksum: String,

    /// Current status of the attempt
    pub status: MigrationStatus,

    /// When the attempt started
    pub started_at: DateTime<Utc>,

    /// When the migration was applied (or marked as applied)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<DateTime<Utc>>,

    /// When the migration was marked as rolled back
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rolled_back_at: Option<DateTime<Utc>>,

    /// Error output captured from a failed attempt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logs: Option<String>,
}

impl MigrationRecord {
    /// Creates a new pending attempt for `id` with the checksum of `script`
    pub fn pending(id: impl Into<String>, script: &str) -> Self {
        Self {
            row_id: uuid::Uuid::new_v4().to_string(),
            id: id.into(),
            checksum: compute_checksum(script),
            status: MigrationStatus::Pending,
            started_at: Utc::now(),
            applied_at: None,
            rolled_back_at: None,
            logs: None,
        }
    }

    /// Marks the attempt as successfully applied at `at`
    pub fn applied(mut self, at: DateTime<Utc>) -> Self {
        self.status = MigrationStatus::Applied;
        self.applied_at = Some(at);
        self
    }

    /// Marks the attempt as failed with the given error output
    pub fn failed(mut self, logs: impl Into<String>) -> Self {
        self.status = MigrationStatus::Failed;
        self.logs = Some(logs.into());
        self
    }

    /// Moves the attempt to `status` at `at`
    ///
    /// A terminal status sets its own timestamp and clears the other one, so
    /// a failed retry that carried an earlier `applied_at` and is then rolled
    /// back keeps only `rolled_back_at`.
    pub fn transition(&mut self, status: MigrationStatus, at: DateTime<Utc>) {
        self.status = status;
        match status {
            MigrationStatus::Applied => {
                self.applied_at = Some(at);
                self.rolled_back_at = None;
            }
            MigrationStatus::RolledBack => {
                self.applied_at = None;
                self.rolled_back_at = Some(at);
            }
            MigrationStatus::Failed | MigrationStatus::Pending => {}
        }
    }
}

/// Computes the SHA256 checksum of a migration script
pub fn compute_checksum(script: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(script.as_bytes());
    hex::encode(hasher.finalize())
}
