//! Migration ledger and its storage contract

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::migration::{MigrationRecord, MigrationStatus};

/// The migration history of one database, oldest attempt first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    records: Vec<MigrationRecord>,
}

impl Ledger {
    /// Creates a ledger from records in attempt order
    pub fn new(records: Vec<MigrationRecord>) -> Self {
        Self { records }
    }

    /// The most recent attempt of `id`, which decides its status
    pub fn latest(&self, id: &str) -> Option<&MigrationRecord> {
        self.records.iter().rev().find(|r| r.id == id)
    }

    /// All attempts of `id`, oldest first
    pub fn attempts<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a MigrationRecord> + 'a {
        self.records.iter().filter(move |r| r.id == id)
    }

    /// Returns true if `id` has at least one attempt
    pub fn contains(&self, id: &str) -> bool {
        self.latest(id).is_some()
    }

    /// Migrations whose latest attempt failed and must be resolved
    pub fn failed(&self) -> Vec<&MigrationRecord> {
        self.records
            .iter()
            .filter(|r| r.status == MigrationStatus::Failed)
            .filter(|r| self.latest(&r.id).is_some_and(|l| l.row_id == r.row_id))
            .collect()
    }

    pub fn records(&self) -> &[MigrationRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<MigrationRecord> for Ledger {
    fn from_iter<I: IntoIterator<Item = MigrationRecord>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Storage backend for a database's migration ledger
///
/// Implementations own persistence exclusively. The resolver only ever sees
/// a request-scoped [`Ledger`] snapshot returned by [`load`](Self::load).
///
/// # Example
/// ```ignore
/// use migrate_core::{Ledger, LedgerError, LedgerStore, MigrationRecord, MigrationStatus};
/// use async_trait::async_trait;
/// use chrono::{DateTime, Utc};
///
/// struct MyStore;
///
/// #[async_trait]
/// impl LedgerStore for MyStore {
///     fn database_ref(&self) -> String {
///         "my-db".to_string()
///     }
///
///     async fn load(&self) -> Result<Ledger, LedgerError> {
///         // Implementation
/// #       unimplemented!()
///     }
///
///     async fn commit(
///         &self,
///         migration_id: &str,
///         status: MigrationStatus,
///         at: DateTime<Utc>,
///     ) -> Result<(), LedgerError> {
///         // Implementation
/// #       unimplemented!()
///     }
///
///     async fn append(&self, record: MigrationRecord) -> Result<(), LedgerError> {
///         // Implementation
/// #       unimplemented!()
///     }
/// }
/// ```
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Stable identity of the target database, used to scope locks
    fn database_ref(&self) -> String;

    /// Load every record of the ledger
    async fn load(&self) -> Result<Ledger, LedgerError>;

    /// Persist a status transition of the latest attempt of `migration_id`
    ///
    /// `Applied` sets `applied_at`, `RolledBack` sets `rolled_back_at`.
    /// Illegal transitions (see [`check_commit`]) fail with
    /// [`LedgerError::Conflict`] and leave the ledger untouched.
    async fn commit(
        &self,
        migration_id: &str,
        status: MigrationStatus,
        at: DateTime<Utc>,
    ) -> Result<(), LedgerError>;

    /// Append a new attempt
    async fn append(&self, record: MigrationRecord) -> Result<(), LedgerError>;
}

#[async_trait]
impl<S: LedgerStore + ?Sized> LedgerStore for std::sync::Arc<S> {
    fn database_ref(&self) -> String {
        (**self).database_ref()
    }

    async fn load(&self) -> Result<Ledger, LedgerError> {
        (**self).load().await
    }

    async fn commit(
        &self,
        migration_id: &str,
        status: MigrationStatus,
        at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        (**self).commit(migration_id, status, at).await
    }

    async fn append(&self, record: MigrationRecord) -> Result<(), LedgerError> {
        (**self).append(record).await
    }
}

#[async_trait]
impl<S: LedgerStore + ?Sized> LedgerStore for Box<S> {
    fn database_ref(&self) -> String {
        (**self).database_ref()
    }

    async fn load(&self) -> Result<Ledger, LedgerError> {
        (**self).load().await
    }

    async fn commit(
        &self,
        migration_id: &str,
        status: MigrationStatus,
        at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        (**self).commit(migration_id, status, at).await
    }

    async fn append(&self, record: MigrationRecord) -> Result<(), LedgerError> {
        (**self).append(record).await
    }
}

/// Checks that a commit of `status` is legal for `record`
///
/// Runners finish a `Pending` attempt as `Applied` or `Failed`; resolution
/// moves a `Failed` attempt to `Applied` or `RolledBack`. Terminal attempts
/// never change. Shared by storage backends so their compare-and-set behaves
/// the same.
pub fn check_commit(record: &MigrationRecord, status: MigrationStatus) -> Result<(), LedgerError> {
    let legal = matches!(
        (record.status, status),
        (MigrationStatus::Pending, MigrationStatus::Applied)
            | (MigrationStatus::Pending, MigrationStatus::Failed)
            | (MigrationStatus::Failed, MigrationStatus::Applied)
            | (MigrationStatus::Failed, MigrationStatus::RolledBack)
    );

    if legal {
        Ok(())
    } else {
        Err(LedgerError::Conflict {
            id: record.id.clone(),
            expected: expected_before(status),
            actual: record.status,
        })
    }
}

fn expected_before(status: MigrationStatus) -> MigrationStatus {
    match status {
        MigrationStatus::Failed | MigrationStatus::Pending => MigrationStatus::Pending,
        MigrationStatus::Applied | MigrationStatus::RolledBack => MigrationStatus::Failed,
    }
}
