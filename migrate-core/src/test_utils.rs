//! In-memory ledger for tests
//!
//! Enabled with the `test-utils` feature. Mirrors the commit semantics of
//! the SQLite store so resolver tests don't need a database file.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::LedgerError;
use crate::ledger::{check_commit, Ledger, LedgerStore};
use crate::migration::{MigrationRecord, MigrationStatus};

/// A [`LedgerStore`] kept in memory. Clones share the same ledger.
#[derive(Clone, Default)]
pub struct InMemoryLedgerStore {
    name: String,
    records: Arc<Mutex<Vec<MigrationRecord>>>,
    commits: Arc<AtomicUsize>,
    unreachable: Option<String>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self {
            name: "memory".to_string(),
            ..Default::default()
        }
    }

    /// Names the database (part of the resolver's lock key)
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Seeds the ledger with a record
    pub fn with_record(self, record: MigrationRecord) -> Self {
        self.records.lock().push(record);
        self
    }

    /// Seeds a migration whose only attempt has the given status
    pub fn with_migration(self, id: &str, status: MigrationStatus) -> Self {
        let mut record = MigrationRecord::pending(id, &format!("-- {id}"));
        record.status = status;
        match status {
            MigrationStatus::Applied => record.applied_at = Some(record.started_at),
            MigrationStatus::RolledBack => record.rolled_back_at = Some(record.started_at),
            MigrationStatus::Failed => record.logs = Some("migration failed".to_string()),
            MigrationStatus::Pending => {}
        }
        self.with_record(record)
    }

    /// Makes every operation fail with a connection error carrying `message`
    pub fn unreachable(mut self, message: impl Into<String>) -> Self {
        self.unreachable = Some(message.into());
        self
    }

    /// Copy of the current records
    pub fn snapshot(&self) -> Vec<MigrationRecord> {
        self.records.lock().clone()
    }

    /// Latest attempt of `id`
    pub fn latest(&self, id: &str) -> Option<MigrationRecord> {
        self.records.lock().iter().rev().find(|r| r.id == id).cloned()
    }

    /// Number of successful commits
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    fn check_reachable(&self) -> Result<(), LedgerError> {
        match &self.unreachable {
            Some(message) => Err(LedgerError::Connection(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    fn database_ref(&self) -> String {
        self.name.clone()
    }

    async fn load(&self) -> Result<Ledger, LedgerError> {
        self.check_reachable()?;
        // Yield so concurrent resolutions actually contend in tests.
        tokio::task::yield_now().await;
        Ok(Ledger::new(self.snapshot()))
    }

    async fn commit(
        &self,
        migration_id: &str,
        status: MigrationStatus,
        at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        self.check_reachable()?;
        tokio::task::yield_now().await;

        let mut records = self.records.lock();
        let record = records
            .iter_mut()
            .rev()
            .find(|r| r.id == migration_id)
            .ok_or_else(|| LedgerError::NotFound(migration_id.to_string()))?;

        check_commit(record, status)?;
        record.transition(status, at);

        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn append(&self, record: MigrationRecord) -> Result<(), LedgerError> {
        self.check_reachable()?;
        self.records.lock().push(record);
        Ok(())
    }
}
