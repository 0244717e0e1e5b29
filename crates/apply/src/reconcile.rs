//! Generic name-keyed reconciliation of one entity kind onto the secondary.

use kumasync_core::{ClientError, EntityError, EntityId, EntityKind, Record};
use kumasync_hub::DirectoryClient;
use metrics::counter;
use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

use crate::project::Project;
use crate::{EntityOutcome, KindReport, Strategy};

/// `name → id` index of one instance's entities of a kind. Built fresh per run.
///
/// Records without a name or id are left out. Duplicate names keep the last record listed.
#[derive(Debug, Clone, Default)]
pub struct NameIndex(FxHashMap<String, EntityId>);

impl NameIndex {
    pub fn from_records(records: &[Record]) -> Self {
        let mut map = FxHashMap::default();
        for r in records {
            match (r.name(), r.id()) {
                (Some(name), Some(id)) => {
                    if let Some(prev) = map.insert(name.to_string(), id) {
                        warn!(name = %name, prev, id, "duplicate entity name; last one wins");
                    }
                }
                _ => debug!(record = ?r.id(), "skipping unnamed or unidentified record in index"),
            }
        }
        Self(map)
    }

    pub fn get(&self, name: &str) -> Option<EntityId> {
        self.0.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOptions {
    pub strategy: Strategy,
    /// Decide and count without issuing create/update/delete.
    pub dry_run: bool,
}

fn display_name(raw: &Record) -> String {
    match (raw.name(), raw.id()) {
        (Some(name), _) => name.to_string(),
        (None, Some(id)) => format!("<unnamed #{id}>"),
        (None, None) => "<unnamed>".to_string(),
    }
}

/// Reconcile `source` (primary order) onto `target`.
///
/// The only error returned is a failure to list the target, which is fatal for the run.
/// Every per-entity failure is logged, counted as skipped and the batch continues.
pub async fn reconcile<C, P>(
    target: &mut C,
    source: &[Record],
    projector: &P,
    opts: ReconcileOptions,
) -> Result<KindReport, ClientError>
where
    C: DirectoryClient + ?Sized,
    P: Project + ?Sized,
{
    let kind = projector.kind();
    let existing = target.list(kind).await?;
    let mut report = KindReport::default();

    let index = match opts.strategy {
        Strategy::Merge => NameIndex::from_records(&existing),
        Strategy::Recreate => clear(target, kind, &existing, opts.dry_run, &mut report).await,
    };
    info!(%kind, source = source.len(), target = index.len(), strategy = %opts.strategy, dry_run = opts.dry_run, "reconciling");

    for raw in source {
        let name = display_name(raw);
        let result = apply_one(target, &index, projector, raw, opts.dry_run).await;
        match &result {
            Ok(EntityOutcome::Added { id }) => {
                info!(%kind, name = %name, id = ?id, "added");
                counter!("kumasync_entities_total", 1u64, "kind" => kind.as_str(), "outcome" => "added");
            }
            Ok(EntityOutcome::Updated { id }) => {
                info!(%kind, name = %name, id, "updated");
                counter!("kumasync_entities_total", 1u64, "kind" => kind.as_str(), "outcome" => "updated");
            }
            Err(e) => {
                warn!(%kind, name = %name, error = %e, "skipped");
                counter!("kumasync_entities_total", 1u64, "kind" => kind.as_str(), "outcome" => "skipped");
            }
        }
        report.record(&name, &result);
    }

    info!(%kind, added = report.added, updated = report.updated, skipped = report.skipped, deleted = report.deleted, "reconciled");
    Ok(report)
}

async fn apply_one<C, P>(
    target: &mut C,
    index: &NameIndex,
    projector: &P,
    raw: &Record,
    dry_run: bool,
) -> Result<EntityOutcome, EntityError>
where
    C: DirectoryClient + ?Sized,
    P: Project + ?Sized,
{
    let projection = projector.project(raw)?;
    let kind = projector.kind();
    match index.get(&projection.name) {
        Some(id) => {
            if !dry_run {
                target.update(kind, id, &projection.fields).await?;
            }
            Ok(EntityOutcome::Updated { id })
        }
        None if dry_run => Ok(EntityOutcome::Added { id: None }),
        None => {
            let id = target.create(kind, &projection.fields).await?;
            Ok(EntityOutcome::Added { id: Some(id) })
        }
    }
}

/// Delete every listed target entity. Entities whose delete fails stay in the returned index
/// so the matching source entity overwrites them instead of adding a duplicate.
async fn clear<C>(target: &mut C, kind: EntityKind, existing: &[Record], dry_run: bool, report: &mut KindReport) -> NameIndex
where
    C: DirectoryClient + ?Sized,
{
    let mut survivors = Vec::new();
    for r in existing {
        let Some(id) = r.id() else { continue };
        if dry_run {
            report.deleted += 1;
            continue;
        }
        match target.delete(kind, id).await {
            Ok(()) => {
                debug!(%kind, id, name = ?r.name(), "deleted");
                report.deleted += 1;
            }
            Err(e) => {
                warn!(%kind, id, name = ?r.name(), error = %e, "delete failed; entity will be overwritten instead");
                survivors.push(r.clone());
            }
        }
    }
    NameIndex::from_records(&survivors)
}
