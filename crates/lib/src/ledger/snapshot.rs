//! Read-only ledger views for rendering.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::entity::{DelegationStatus, Entity, EntityId};
use crate::rights::RightsDelta;

/// One entity and its status at the time the snapshot was taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotEntry {
    pub entity: Entity,
    pub status: DelegationStatus,
    /// The rights of a settled entity were edited and await reconciliation.
    #[serde(default)]
    pub pending_edit: bool,
}

/// An owned copy of a ledger's state.
///
/// Later ledger mutations are never visible through a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    entries: Vec<SnapshotEntry>,
}

impl LedgerSnapshot {
    pub(crate) fn new(entries: Vec<SnapshotEntry>) -> Self {
        Self { entries }
    }

    /// All entries, ordered by entity id.
    pub fn entries(&self) -> &[SnapshotEntry] {
        &self.entries
    }

    /// Entities currently in `status`.
    pub fn bucket(&self, status: DelegationStatus) -> Vec<&Entity> {
        self.entries
            .iter()
            .filter(|entry| entry.status == status)
            .map(|entry| &entry.entity)
            .collect()
    }

    pub fn available(&self) -> Vec<&Entity> {
        self.bucket(DelegationStatus::Available)
    }

    pub fn staged_for_add(&self) -> Vec<&Entity> {
        self.bucket(DelegationStatus::StagedForAdd)
    }

    pub fn delegated(&self) -> Vec<&Entity> {
        self.bucket(DelegationStatus::Delegated)
    }

    pub fn staged_for_remove(&self) -> Vec<&Entity> {
        self.bucket(DelegationStatus::StagedForRemove)
    }

    pub fn revoked(&self) -> Vec<&Entity> {
        self.bucket(DelegationStatus::Revoked)
    }

    /// Status of the entity with this id, if it was tracked.
    pub fn status_of(&self, id: &EntityId) -> Option<DelegationStatus> {
        self.entries
            .binary_search_by(|entry| entry.entity.id.cmp(id))
            .ok()
            .map(|idx| self.entries[idx].status)
    }

    /// Settled entities whose rights were edited.
    pub fn pending_edits(&self) -> Vec<&Entity> {
        self.entries
            .iter()
            .filter(|entry| entry.pending_edit)
            .map(|entry| &entry.entity)
            .collect()
    }

    /// True if anything is staged or edited and a submit would have work to do.
    pub fn has_pending_changes(&self) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.status.is_staged() || entry.pending_edit)
    }

    /// Flags settled entries that have a planned change.
    pub(crate) fn mark_pending_edits(&mut self, plan: &BTreeMap<EntityId, RightsDelta>) {
        for entry in &mut self.entries {
            entry.pending_edit = !entry.status.is_staged() && plan.contains_key(&entry.entity.id);
        }
    }

    /// Entries grouped by owner name for overview listings.
    ///
    /// Entities without an owner are grouped under their own display name.
    pub fn by_owner(&self) -> BTreeMap<String, Vec<&SnapshotEntry>> {
        let mut groups: BTreeMap<String, Vec<&SnapshotEntry>> = BTreeMap::new();
        for entry in &self.entries {
            let owner = entry
                .entity
                .owner_name
                .clone()
                .unwrap_or_else(|| entry.entity.display_name.clone());
            groups.entry(owner).or_default().push(entry);
        }
        groups
    }

    /// Case-insensitive match on display name, owner name or id.
    ///
    /// A blank query matches everything.
    pub fn search(&self, query: &str) -> Vec<&SnapshotEntry> {
        let needle = query.trim().to_lowercase();
        self.entries
            .iter()
            .filter(|entry| {
                if needle.is_empty() {
                    return true;
                }
                let entity = &entry.entity;
                entity.display_name.to_lowercase().contains(&needle)
                    || entity.id.as_str().to_lowercase().contains(&needle)
                    || entity
                        .owner_name
                        .as_deref()
                        .is_some_and(|owner| owner.to_lowercase().contains(&needle))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
