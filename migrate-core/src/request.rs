//! Resolution requests
//!
//! The two mutually exclusive command-line flags are folded into a single
//! tagged [`ResolveAction`], so a request that names both actions (or none)
//! cannot be constructed.

use crate::error::ResolveError;
use crate::migration::MigrationStatus;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Message for a request that names no action
pub const MISSING_ACTION: &str = "--applied or --rolledback must be part of the command like \
     migrate resolve --early-access-feature --applied=\"20201231000000_example\"";

/// Message for a request that names both actions
pub const CONFLICTING_ACTIONS: &str = "Pass either --applied or --rolledback, not both.";

/// How a migration should be resolved
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "action", content = "migration", rename_all = "snake_case")]
pub enum ResolveAction {
    /// Record the migration as applied
    Applied(String),
    /// Record the migration as rolled back
    RolledBack(String),
}

impl ResolveAction {
    /// The migration the action targets
    pub fn migration_id(&self) -> &str {
        match self {
            Self::Applied(id) | Self::RolledBack(id) => id,
        }
    }

    /// The status a successful resolution leaves the migration in
    pub fn target_status(&self) -> MigrationStatus {
        match self {
            Self::Applied(_) => MigrationStatus::Applied,
            Self::RolledBack(_) => MigrationStatus::RolledBack,
        }
    }

    /// Past-tense verb used in user-facing messages
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Applied(_) => "applied",
            Self::RolledBack(_) => "rolled back",
        }
    }
}

impl fmt::Display for ResolveAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mark `{}` as {}", self.migration_id(), self.verb())
    }
}

/// A request to resolve one migration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionRequest {
    /// The action to perform
    pub action: ResolveAction,
}

impl ResolutionRequest {
    /// Request marking `id` as applied
    pub fn applied(id: impl Into<String>) -> Self {
        Self {
            action: ResolveAction::Applied(id.into()),
        }
    }

    /// Request marking `id` as rolled back
    pub fn rolled_back(id: impl Into<String>) -> Self {
        Self {
            action: ResolveAction::RolledBack(id.into()),
        }
    }

    /// Builds a request from the raw `--applied` / `--rolledback` values
    ///
    /// Exactly one of the two must be present.
    pub fn from_flags(
        applied: Option<String>,
        rolledback: Option<String>,
    ) -> Result<Self, ResolveError> {
        match (applied, rolledback) {
            (None, None) => Err(ResolveError::Usage(MISSING_ACTION.to_string())),
            (Some(_), Some(_)) => Err(ResolveError::Usage(CONFLICTING_ACTIONS.to_string())),
            (Some(id), None) => Ok(Self::applied(id)),
            (None, Some(id)) => Ok(Self::rolled_back(id)),
        }
    }

    /// The migration the request targets
    pub fn migration_id(&self) -> &str {
        self.action.migration_id()
    }
}
