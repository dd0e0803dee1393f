//! Migration resolver
//!
//! Decides whether a requested resolution is legal for the recorded status of
//! a migration and commits the resulting transition to the ledger.
//!
//! | Recorded status | `--applied`        | `--rolledback`       |
//! |-----------------|--------------------|----------------------|
//! | (none)          | `NotFound`         | `NeverApplied`       |
//! | `Pending`       | `AlreadyApplied`   | `NeverApplied`       |
//! | `Applied`       | `AlreadyApplied`   | `NotFailed`          |
//! | `Failed`        | → `Applied`        | → `RolledBack`       |
//! | `RolledBack`    | `NotFailed`        | no-op success        |

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{LedgerError, ResolveError};
use crate::ledger::LedgerStore;
use crate::migration::{MigrationRecord, MigrationStatus};
use crate::request::{ResolutionRequest, ResolveAction};

/// What a resolution does to the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Commit the latest attempt to the given status
    Commit(MigrationStatus),
    /// The migration already has the requested status
    Unchanged,
}

/// Decides the transition for `action` given the latest attempt of its migration
///
/// Pure: performs no I/O and never mutates anything.
pub fn plan_transition(
    record: Option<&MigrationRecord>,
    action: &ResolveAction,
) -> Result<Transition, ResolveError> {
    let id = action.migration_id();
    let Some(record) = record else {
        return Err(match action {
            ResolveAction::Applied(_) => ResolveError::NotFound(id.to_string()),
            ResolveAction::RolledBack(_) => ResolveError::NeverApplied(id.to_string()),
        });
    };

    match (action, record.status) {
        (ResolveAction::Applied(_), MigrationStatus::Failed) => {
            Ok(Transition::Commit(MigrationStatus::Applied))
        }
        (ResolveAction::Applied(_), MigrationStatus::Applied | MigrationStatus::Pending) => {
            Err(ResolveError::AlreadyApplied(id.to_string()))
        }
        (ResolveAction::Applied(_), MigrationStatus::RolledBack) => Err(ResolveError::NotFailed {
            id: id.to_string(),
            action: action.clone(),
        }),
        (ResolveAction::RolledBack(_), MigrationStatus::Failed) => {
            Ok(Transition::Commit(MigrationStatus::RolledBack))
        }
        (ResolveAction::RolledBack(_), MigrationStatus::RolledBack) => Ok(Transition::Unchanged),
        (ResolveAction::RolledBack(_), MigrationStatus::Pending) => {
            Err(ResolveError::NeverApplied(id.to_string()))
        }
        (ResolveAction::RolledBack(_), MigrationStatus::Applied) => Err(ResolveError::NotFailed {
            id: id.to_string(),
            action: action.clone(),
        }),
    }
}

/// Result of a successful resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    /// The action that was performed
    pub action: ResolveAction,
    /// Status of the migration after the resolution
    pub status: MigrationStatus,
    /// Whether the ledger was written
    pub changed: bool,
    /// When the transition was committed (None for no-op resolutions)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Outcome {
    pub fn migration_id(&self) -> &str {
        self.action.migration_id()
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Migration {} marked as {}.",
            self.migration_id(),
            self.action.verb()
        )
    }
}

/// Applies resolution requests to a ledger
///
/// Resolutions of the same migration on the same database are serialized:
/// load, validation and commit of one request complete before the next one
/// starts, so concurrent callers never interleave partial updates.
///
/// # Example
/// ```ignore
/// use migrate_core::{ResolutionRequest, Resolver};
///
/// let resolver = Resolver::new(store);
/// let outcome = resolver
///     .resolve(ResolutionRequest::applied("20201231000000_example"))
///     .await?;
/// println!("{outcome}"); // Migration 20201231000000_example marked as applied.
/// ```
pub struct Resolver<S> {
    store: S,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<S: LedgerStore> Resolver<S> {
    /// Creates a resolver over an explicit ledger handle
    pub fn new(store: S) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// The underlying ledger store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Validates `request` against the ledger and commits the transition
    ///
    /// Nothing is written unless every validation passes.
    pub async fn resolve(&self, request: ResolutionRequest) -> Result<Outcome, ResolveError> {
        let key = format!(
            "{}::{}",
            self.store.database_ref(),
            request.migration_id()
        );
        let entry = self.lock_for(key);

        let _guard = entry.lock.lock().await;
        self.resolve_locked(request.action).await
    }

    async fn resolve_locked(&self, action: ResolveAction) -> Result<Outcome, ResolveError> {
        let id = action.migration_id().to_string();
        log::debug!("loading ledger of {} to {}", self.store.database_ref(), action);

        let ledger = self.store.load().await?;
        let transition = plan_transition(ledger.latest(&id), &action)?;

        match transition {
            Transition::Unchanged => {
                log::debug!("migration {} is already {}", id, action.target_status());
                Ok(Outcome {
                    status: action.target_status(),
                    action,
                    changed: false,
                    resolved_at: None,
                })
            }
            Transition::Commit(status) => {
                let now = Utc::now();
                match self.store.commit(&id, status, now).await {
                    Ok(()) => {}
                    Err(LedgerError::Conflict { actual, .. }) => {
                        // Another process committed first; report what it left behind.
                        log::warn!("migration {} changed to {} during resolution", id, actual);
                        let ledger = self.store.load().await?;
                        return match plan_transition(ledger.latest(&id), &action)? {
                            Transition::Unchanged => Ok(Outcome {
                                status: action.target_status(),
                                action,
                                changed: false,
                                resolved_at: None,
                            }),
                            Transition::Commit(_) => Err(ResolveError::Ledger(
                                LedgerError::Storage(format!(
                                    "migration {} could not be committed as {}",
                                    id, status
                                )),
                            )),
                        };
                    }
                    Err(e) => return Err(e.into()),
                }

                log::info!("migration {} marked as {}", id, action.verb());
                Ok(Outcome {
                    action,
                    status,
                    changed: true,
                    resolved_at: Some(now),
                })
            }
        }
    }

    fn lock_for(&self, key: String) -> LockEntry<'_> {
        let lock = {
            let mut locks = self.locks.lock();
            Arc::clone(locks.entry(key.clone()).or_default())
        };
        LockEntry {
            locks: &self.locks,
            key,
            lock,
        }
    }
}

/// A checked-out per-key lock; removes its map entry on drop once unused
///
/// Runs even when the `resolve` future is dropped while still waiting.
struct LockEntry<'a> {
    locks: &'a Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    key: String,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for LockEntry<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock();
        // Map entry plus ours: nobody else is waiting.
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.key);
        }
    }
}
