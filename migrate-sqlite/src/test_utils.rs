//! Test helpers for the SQLite ledger
//!
//! Each [`TestLedgerDatabase`] lives in its own temporary directory so tests
//! can run in parallel without sharing a database file.

use chrono::Utc;
use migrate_core::{LedgerStore, MigrationRecord, MigrationStatus};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::store::SqliteLedgerStore;

/// A ledger database that is removed when dropped.
pub struct TestLedgerDatabase {
    #[allow(dead_code)]
    temp_dir: TempDir,
    path: PathBuf,
    store: SqliteLedgerStore,
}

impl TestLedgerDatabase {
    /// Creates an empty ledger database
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("dev.db");
        let store = SqliteLedgerStore::create(&path).expect("Failed to create ledger database");

        Self {
            temp_dir,
            path,
            store,
        }
    }

    /// Appends an attempt of `id` with the given status
    pub async fn with_migration(self, id: &str, status: MigrationStatus) -> Self {
        let mut record = MigrationRecord::pending(id, &format!("-- {id}"));
        match status {
            MigrationStatus::Applied => record = record.applied(Utc::now()),
            MigrationStatus::Failed => record = record.failed("migration failed"),
            MigrationStatus::RolledBack => {
                record.status = status;
                record.rolled_back_at = Some(Utc::now());
            }
            MigrationStatus::Pending => {}
        }

        self.store
            .append(record)
            .await
            .expect("Failed to append ledger record");
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn store(&self) -> &SqliteLedgerStore {
        &self.store
    }
}
