//! kumasync apply: one-way reconciliation of notifications and monitors from a primary
//! instance onto a secondary, joined by entity name.

#![forbid(unsafe_code)]

use std::fmt;

use kumasync_core::{ClientError, EntityError, EntityId, EntityKind};
use kumasync_hub::Endpoint;
use serde::{Deserialize, Serialize};

pub mod connect;
pub mod orchestrate;
pub mod project;
pub mod reconcile;
pub mod remap;

pub use connect::{connect_with_retry, RetryPolicy};
pub use orchestrate::run_sync;
pub use project::{MonitorProjector, NotificationProjector, Project, Projection};
pub use reconcile::{reconcile, NameIndex, ReconcileOptions};
pub use remap::ReferenceRemapper;

/// Linear stages of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    ConnectPrimary,
    ConnectSecondary,
    SyncNotifications,
    SyncMonitors,
    DisconnectBoth,
    Done,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::ConnectPrimary => "CONNECT_PRIMARY",
            Phase::ConnectSecondary => "CONNECT_SECONDARY",
            Phase::SyncNotifications => "SYNC_NOTIFICATIONS",
            Phase::SyncMonitors => "SYNC_MONITORS",
            Phase::DisconnectBoth => "DISCONNECT_BOTH",
            Phase::Done => "DONE",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the secondary's existing entities are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Update entities matched by name, create the rest. Secondary ids survive across runs.
    #[default]
    Merge,
    /// Delete every secondary entity of the kind, then create all primary entities.
    /// Secondary ids change on every run.
    Recreate,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Strategy::Merge => "merge",
            Strategy::Recreate => "recreate",
        })
    }
}

/// Run-aborting failures. Everything scoped to one entity is an [`EntityError`] instead.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("{phase}: {endpoint} unreachable after {attempts} attempt(s): {source}")]
    Unreachable {
        phase: Phase,
        endpoint: String,
        attempts: u32,
        #[source]
        source: ClientError,
    },
    #[error("{phase}: listing {kind}s on {endpoint} failed: {source}")]
    Listing {
        phase: Phase,
        endpoint: String,
        kind: EntityKind,
        #[source]
        source: ClientError,
    },
}

impl SyncError {
    pub fn phase(&self) -> Phase {
        match self {
            SyncError::Unreachable { phase, .. } | SyncError::Listing { phase, .. } => *phase,
        }
    }
}

/// Successful decision for one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityOutcome {
    /// Created on the secondary; `None` when the run is a dry run.
    Added { id: Option<EntityId> },
    Updated { id: EntityId },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedEntity {
    pub name: String,
    pub reason: String,
}

/// Per-kind outcome counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KindReport {
    pub added: usize,
    pub updated: usize,
    pub skipped: usize,
    /// Secondary entities removed up front by [`Strategy::Recreate`].
    pub deleted: usize,
    pub failures: Vec<SkippedEntity>,
}

impl KindReport {
    pub fn record(&mut self, name: &str, result: &Result<EntityOutcome, EntityError>) {
        match result {
            Ok(EntityOutcome::Added { .. }) => self.added += 1,
            Ok(EntityOutcome::Updated { .. }) => self.updated += 1,
            Err(e) => {
                self.skipped += 1;
                self.failures.push(SkippedEntity { name: name.to_string(), reason: e.to_string() });
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Correlates the report with the run's log span.
    pub run_id: String,
    /// RFC 3339, UTC.
    pub started_at: String,
    pub strategy: Strategy,
    pub dry_run: bool,
    pub notifications: KindReport,
    pub monitors: KindReport,
}

impl SyncReport {
    /// True when no entity was skipped.
    pub fn is_clean(&self) -> bool {
        self.notifications.skipped == 0 && self.monitors.skipped == 0
    }
}

/// Everything a run needs besides the connector.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub primary: Endpoint,
    pub secondary: Endpoint,
    pub retry: RetryPolicy,
    pub strategy: Strategy,
    pub dry_run: bool,
}

impl SyncConfig {
    pub fn new(primary: Endpoint, secondary: Endpoint) -> Self {
        Self { primary, secondary, retry: RetryPolicy::default(), strategy: Strategy::Merge, dry_run: false }
    }

    fn reconcile_options(&self) -> ReconcileOptions {
        ReconcileOptions { strategy: self.strategy, dry_run: self.dry_run }
    }
}
