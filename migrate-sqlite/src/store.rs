use async_trait::async_trait;
use chrono::{DateTime, Utc};
use migrate_core::{
    check_commit, Ledger, LedgerError, LedgerStore, MigrationRecord, MigrationStatus,
};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::LedgerConfig;
use crate::error::SqliteLedgerError;

/// The name of the ledger table
pub const LEDGER_TABLE: &str = "_schema_migrations";

const RECORD_COLUMNS: &str = "row_id, migration_name, checksum, status, started_at, \
                              applied_at, rolled_back_at, logs";

/// SQLite-based migration ledger
///
/// The ledger lives in a `_schema_migrations` table inside the target
/// database itself. Opening an existing database is read-only until a
/// commit or append: a database without the table reads as an empty ledger.
/// The table is created by [`create`](Self::create), [`initialize`](Self::initialize)
/// or the first [`append`](LedgerStore::append).
///
/// # Example
/// ```no_run
/// use migrate_sqlite::SqliteLedgerStore;
///
/// # fn example() -> Result<(), migrate_core::LedgerError> {
/// let store = SqliteLedgerStore::open("prisma/dev.db")?;
/// # Ok(())
/// # }
/// ```
pub struct SqliteLedgerStore {
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLedgerStore {
    /// Open the ledger of an existing database
    ///
    /// Fails with a connection error if the database file doesn't exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        Self::open_with(path, &LedgerConfig::default())
    }

    /// Open the ledger, creating the database file if needed
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let config = LedgerConfig {
            create_if_missing: true,
            ..LedgerConfig::default()
        };
        Self::open_with(path, &config)
    }

    /// Open the ledger with explicit options
    pub fn open_with(path: impl Into<PathBuf>, config: &LedgerConfig) -> Result<Self, LedgerError> {
        let path = path.into();
        let conn = open_connection(&path, config)?;
        log::debug!("opened migration ledger at {}", path.display());

        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Creates the ledger table if it doesn't exist yet
    pub fn initialize(&self) -> Result<(), LedgerError> {
        let conn = self.conn.lock();
        initialize(&conn).map_err(LedgerError::from)
    }

    /// Path of the database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs a closure with the connection on the blocking thread pool
    async fn with_connection<T, F>(&self, f: F) -> Result<T, LedgerError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, SqliteLedgerError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock();
            f(&mut conn)
        })
        .await
        .map_err(|e| LedgerError::Storage(format!("Task join error: {}", e)))?
        .map_err(LedgerError::from)
    }
}

fn open_connection(path: &Path, config: &LedgerConfig) -> Result<Connection, SqliteLedgerError> {
    if !config.create_if_missing && !path.exists() {
        return Err(SqliteLedgerError::DatabaseDoesNotExist(path.to_path_buf()));
    }

    let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    if config.create_if_missing {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        flags |= OpenFlags::SQLITE_OPEN_CREATE;
    }

    let conn = Connection::open_with_flags(path, flags).map_err(|e| {
        SqliteLedgerError::ConnectionFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        }
    })?;

    conn.busy_timeout(config.busy_timeout)?;
    if config.create_if_missing {
        initialize(&conn)?;
    }
    Ok(conn)
}

fn initialize(conn: &Connection) -> Result<(), SqliteLedgerError> {
    conn.execute_batch(include_str!("schema.sql"))?;
    Ok(())
}

fn ledger_table_exists(conn: &Connection) -> Result<bool, SqliteLedgerError> {
    let exists = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![LEDGER_TABLE],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    Ok(exists)
}

fn parse_timestamp(value: Option<String>) -> Result<Option<DateTime<Utc>>, SqliteLedgerError> {
    value
        .map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| SqliteLedgerError::InvalidRow(format!("bad timestamp '{}': {}", s, e)))
        })
        .transpose()
}

type RawRecord = (
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
);

fn read_row(row: &Row<'_>) -> rusqlite::Result<RawRecord> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn decode(raw: RawRecord) -> Result<MigrationRecord, SqliteLedgerError> {
    let (row_id, id, checksum, status, started_at, applied_at, rolled_back_at, logs) = raw;
    let status = status
        .parse::<MigrationStatus>()
        .map_err(|e| SqliteLedgerError::InvalidRow(e.to_string()))?;
    let started_at = parse_timestamp(Some(started_at))?
        .ok_or_else(|| SqliteLedgerError::InvalidRow("missing started_at".to_string()))?;

    Ok(MigrationRecord {
        row_id,
        id,
        checksum,
        status,
        started_at,
        applied_at: parse_timestamp(applied_at)?,
        rolled_back_at: parse_timestamp(rolled_back_at)?,
        logs,
    })
}

#[async_trait]
impl LedgerStore for SqliteLedgerStore {
    fn database_ref(&self) -> String {
        self.path
            .canonicalize()
            .unwrap_or_else(|_| self.path.clone())
            .to_string_lossy()
            .to_string()
    }

    async fn load(&self) -> Result<Ledger, LedgerError> {
        self.with_connection(|conn| {
            if !ledger_table_exists(conn)? {
                log::debug!("no {} table, ledger is empty", LEDGER_TABLE);
                return Ok(Ledger::default());
            }

            let mut stmt = conn.prepare(&format!(
                "SELECT {RECORD_COLUMNS} FROM {LEDGER_TABLE} ORDER BY seq ASC"
            ))?;

            let records = stmt
                .query_map([], read_row)?
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .map(decode)
                .collect::<Result<Vec<_>, _>>()?;

            Ok(Ledger::new(records))
        })
        .await
    }

    async fn commit(
        &self,
        migration_id: &str,
        status: MigrationStatus,
        at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let migration_id = migration_id.to_string();

        self.with_connection(move |conn| {
            if !ledger_table_exists(conn)? {
                return Err(LedgerError::NotFound(migration_id).into());
            }

            // Take the write lock up front so the check and the update see the same row.
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let latest = tx
                .query_row(
                    &format!(
                        "SELECT {RECORD_COLUMNS}, seq FROM {LEDGER_TABLE} \
                         WHERE migration_name = ?1 ORDER BY seq DESC LIMIT 1"
                    ),
                    params![migration_id],
                    |row| Ok((row.get::<_, i64>(8)?, read_row(row)?)),
                )
                .optional()?;

            let Some((seq, raw)) = latest else {
                return Err(LedgerError::NotFound(migration_id).into());
            };
            let mut record = decode(raw)?;
            check_commit(&record, status)?;

            let previous = record.status;
            record.transition(status, at);

            let rows = tx.execute(
                &format!(
                    "UPDATE {LEDGER_TABLE} \
                     SET status = ?1, applied_at = ?2, rolled_back_at = ?3 \
                     WHERE seq = ?4 AND status = ?5"
                ),
                params![
                    record.status.as_str(),
                    record.applied_at.map(|t| t.to_rfc3339()),
                    record.rolled_back_at.map(|t| t.to_rfc3339()),
                    seq,
                    previous.as_str()
                ],
            )?;

            if rows != 1 {
                return Err(SqliteLedgerError::InvalidRow(format!(
                    "ledger row {} of {} changed during commit",
                    seq, migration_id
                )));
            }

            // If commit fails the transaction is rolled back on drop.
            tx.commit()?;
            log::debug!("committed {} as {}", migration_id, status);
            Ok(())
        })
        .await
    }

    async fn append(&self, record: MigrationRecord) -> Result<(), LedgerError> {
        self.with_connection(move |conn| {
            initialize(conn)?;
            conn.execute(
                &format!(
                    "INSERT INTO {LEDGER_TABLE} ({RECORD_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
                ),
                params![
                    record.row_id,
                    record.id,
                    record.checksum,
                    record.status.as_str(),
                    record.started_at.to_rfc3339(),
                    record.applied_at.map(|t| t.to_rfc3339()),
                    record.rolled_back_at.map(|t| t.to_rfc3339()),
                    record.logs,
                ],
            )?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestLedgerDatabase;
    use migrate_core::{ResolutionRequest, ResolveError, Resolver};
    use tempfile::TempDir;

    const FAILED: &str = "20201106130852_failed";
    const INIT: &str = "20201014154943_init";

    #[test]
    fn test_open_missing_database() {
        let temp_dir = TempDir::new().unwrap();
        let result = SqliteLedgerStore::open(temp_dir.path().join("dev.db"));

        match result {
            Err(LedgerError::Connection(message)) => {
                assert_eq!(message, "P1003: SQLite database file doesn't exist")
            }
            Err(other) => panic!("expected connection error, got {other}"),
            Ok(_) => panic!("expected connection error"),
        }
        assert!(!temp_dir.path().join("dev.db").exists());
    }

    #[test]
    fn test_create_makes_parent_directories() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("prisma").join("dev.db");

        let store = SqliteLedgerStore::create(&path).unwrap();
        assert!(path.exists());
        assert_eq!(store.path(), path.as_path());
    }

    #[tokio::test]
    async fn test_empty_ledger() {
        let db = TestLedgerDatabase::new().await;
        let ledger = db.store().load().await.unwrap();
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn test_append_and_load_preserves_order() {
        let db = TestLedgerDatabase::new()
            .await
            .with_migration(INIT, MigrationStatus::Applied)
            .await
            .with_migration(FAILED, MigrationStatus::Failed)
            .await;

        let ledger = db.store().load().await.unwrap();
        let ids: Vec<_> = ledger.records().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec![INIT, FAILED]);

        let init = ledger.latest(INIT).unwrap();
        assert_eq!(init.status, MigrationStatus::Applied);
        assert!(init.applied_at.is_some());

        let failed = ledger.latest(FAILED).unwrap();
        assert_eq!(failed.status, MigrationStatus::Failed);
        assert!(failed.logs.is_some());
    }

    #[tokio::test]
    async fn test_commit_sets_resolution_timestamp() {
        let db = TestLedgerDatabase::new()
            .await
            .with_migration(FAILED, MigrationStatus::Failed)
            .await;
        let at = Utc::now();

        db.store()
            .commit(FAILED, MigrationStatus::RolledBack, at)
            .await
            .unwrap();

        let record = db.store().load().await.unwrap().latest(FAILED).cloned().unwrap();
        assert_eq!(record.status, MigrationStatus::RolledBack);
        assert_eq!(
            record.rolled_back_at.map(|t| t.timestamp_micros()),
            Some(at.timestamp_micros())
        );
        assert!(record.applied_at.is_none());
    }

    #[tokio::test]
    async fn test_rollback_clears_prior_applied_at() {
        let db = TestLedgerDatabase::new().await;
        let mut retry = MigrationRecord::pending(FAILED, "SELECT 1;").failed("syntax error");
        retry.applied_at = Some(retry.started_at);
        db.store().append(retry).await.unwrap();

        db.store()
            .commit(FAILED, MigrationStatus::RolledBack, Utc::now())
            .await
            .unwrap();

        let record = db.store().load().await.unwrap().latest(FAILED).cloned().unwrap();
        assert_eq!(record.status, MigrationStatus::RolledBack);
        assert!(record.applied_at.is_none());
        assert!(record.rolled_back_at.is_some());
    }

    #[tokio::test]
    async fn test_open_existing_database_does_not_create_table() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("app.db");
        Connection::open(&path)
            .unwrap()
            .execute_batch("CREATE TABLE users (id INTEGER PRIMARY KEY);")
            .unwrap();

        let store = SqliteLedgerStore::open(&path).unwrap();
        assert!(store.load().await.unwrap().is_empty());
        let err = store
            .commit(FAILED, MigrationStatus::Applied, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
        assert!(!ledger_table_exists(&store.conn.lock()).unwrap());

        store.initialize().unwrap();
        assert!(ledger_table_exists(&store.conn.lock()).unwrap());
    }

    #[tokio::test]
    async fn test_commit_rejects_terminal_record() {
        let db = TestLedgerDatabase::new()
            .await
            .with_migration(INIT, MigrationStatus::Applied)
            .await;
        let before = db.store().load().await.unwrap();

        let err = db
            .store()
            .commit(INIT, MigrationStatus::RolledBack, Utc::now())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            LedgerError::Conflict {
                actual: MigrationStatus::Applied,
                ..
            }
        ));
        assert_eq!(db.store().load().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_commit_unknown_migration() {
        let db = TestLedgerDatabase::new().await;

        let err = db
            .store()
            .commit("does_not_exist", MigrationStatus::Applied, Utc::now())
            .await
            .unwrap_err();

        assert!(matches!(err, LedgerError::NotFound(ref id) if id == "does_not_exist"));
    }

    #[tokio::test]
    async fn test_commit_targets_latest_attempt() {
        let db = TestLedgerDatabase::new()
            .await
            .with_migration(FAILED, MigrationStatus::RolledBack)
            .await
            .with_migration(FAILED, MigrationStatus::Failed)
            .await;

        db.store()
            .commit(FAILED, MigrationStatus::Applied, Utc::now())
            .await
            .unwrap();

        let ledger = db.store().load().await.unwrap();
        let statuses: Vec<_> = ledger.attempts(FAILED).map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![MigrationStatus::RolledBack, MigrationStatus::Applied]
        );
    }

    #[tokio::test]
    async fn test_ledger_survives_reopen() {
        let db = TestLedgerDatabase::new()
            .await
            .with_migration(FAILED, MigrationStatus::Failed)
            .await;
        db.store()
            .commit(FAILED, MigrationStatus::Applied, Utc::now())
            .await
            .unwrap();

        let reopened = SqliteLedgerStore::open(db.path()).unwrap();
        let ledger = reopened.load().await.unwrap();
        assert_eq!(
            ledger.latest(FAILED).map(|r| r.status),
            Some(MigrationStatus::Applied)
        );
        assert_eq!(reopened.database_ref(), db.store().database_ref());
    }

    #[tokio::test]
    async fn test_resolver_over_sqlite() {
        let db = TestLedgerDatabase::new()
            .await
            .with_migration(INIT, MigrationStatus::Applied)
            .await
            .with_migration(FAILED, MigrationStatus::Failed)
            .await;
        let resolver = Resolver::new(SqliteLedgerStore::open(db.path()).unwrap());

        let err = resolver
            .resolve(ResolutionRequest::applied(INIT))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::AlreadyApplied(_)));

        let first = resolver
            .resolve(ResolutionRequest::rolled_back(FAILED))
            .await
            .unwrap();
        let second = resolver
            .resolve(ResolutionRequest::rolled_back(FAILED))
            .await
            .unwrap();
        assert_eq!(
            first.to_string(),
            "Migration 20201106130852_failed marked as rolled back."
        );
        assert_eq!(first.to_string(), second.to_string());
    }

    #[tokio::test]
    async fn test_separate_connections_commit_once() {
        let db = TestLedgerDatabase::new()
            .await
            .with_migration(FAILED, MigrationStatus::Failed)
            .await;
        let a = Resolver::new(SqliteLedgerStore::open(db.path()).unwrap());
        let b = Resolver::new(SqliteLedgerStore::open(db.path()).unwrap());

        let (first, second) = tokio::join!(
            a.resolve(ResolutionRequest::applied(FAILED)),
            b.resolve(ResolutionRequest::applied(FAILED)),
        );

        // One commits; the other either reloads and sees Applied or lost the race.
        assert_eq!(first.is_ok() as usize + second.is_ok() as usize, 1);
        let ledger = db.store().load().await.unwrap();
        assert_eq!(ledger.attempts(FAILED).count(), 1);
        assert_eq!(
            ledger.latest(FAILED).map(|r| r.status),
            Some(MigrationStatus::Applied)
        );
    }
}
