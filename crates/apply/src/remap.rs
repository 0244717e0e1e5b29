//! Notification id translation between the two instances, joined by name.

use kumasync_core::{EntityId, Record};
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::reconcile::NameIndex;

#[derive(Debug, Clone, Default)]
pub struct ReferenceRemapper {
    primary_names: FxHashMap<EntityId, String>,
    secondary: NameIndex,
}

impl ReferenceRemapper {
    /// `primary`: the primary's notifications. `secondary`: the secondary's notifications
    /// as listed after notification sync finished.
    pub fn from_listings(primary: &[Record], secondary: &[Record]) -> Self {
        let primary_names = primary
            .iter()
            .filter_map(|r| Some((r.id()?, r.name()?.to_string())))
            .collect();
        Self { primary_names, secondary: NameIndex::from_records(secondary) }
    }

    /// Translate primary ids in order. Ids without a secondary counterpart are dropped.
    pub fn remap(&self, ids: &[EntityId]) -> Vec<EntityId> {
        ids.iter()
            .filter_map(|id| {
                let mapped = self
                    .primary_names
                    .get(id)
                    .and_then(|name| self.secondary.get(name));
                if mapped.is_none() {
                    debug!(primary_id = id, "dropping notification reference without secondary counterpart");
                }
                mapped
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(id: i64, name: &str) -> Record {
        serde_json::from_value(json!({ "id": id, "name": name })).unwrap()
    }

    #[test]
    fn remaps_by_name_and_keeps_order() {
        let primary = vec![rec(7, "slack-ops"), rec(8, "pager"), rec(9, "email")];
        let secondary = vec![rec(1, "email"), rec(2, "slack-ops"), rec(3, "pager")];
        let r = ReferenceRemapper::from_listings(&primary, &secondary);
        assert_eq!(r.remap(&[8, 7, 9]), vec![3, 2, 1]);
    }

    #[test]
    fn drops_unknown_and_unmatched_ids() {
        let primary = vec![rec(7, "slack-ops"), rec(8, "failed-on-secondary")];
        let secondary = vec![rec(21, "slack-ops")];
        let r = ReferenceRemapper::from_listings(&primary, &secondary);
        assert_eq!(r.remap(&[8, 7, 404]), vec![21]);
        assert!(r.remap(&[]).is_empty());
    }

    #[test]
    fn does_not_deduplicate() {
        let r = ReferenceRemapper::from_listings(&[rec(7, "a")], &[rec(1, "a")]);
        assert_eq!(r.remap(&[7, 7]), vec![1, 1]);
    }
}
