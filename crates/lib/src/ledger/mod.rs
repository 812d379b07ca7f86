//! Staging ledger
//!
//! The ledger tracks every delegable entity shown in one delegation flow
//! together with its [`DelegationStatus`]. Entities are indexed by id, so an
//! entity is in exactly one status at any time and staging an entity twice is
//! rejected instead of producing a duplicate.
//!
//! Staging is optimistic and synchronous. Staged entities only move to
//! `Delegated` or `Revoked` when reconciliation confirms the change with the
//! authorization backend.
//!
//! # Examples
//! ```
//! use delegation_ledger::entity::{DelegationStatus, Entity, EntityKind};
//! use delegation_ledger::ledger::StagingLedger;
//!
//! let mut ledger = StagingLedger::new();
//! ledger
//!     .insert(Entity::new("1", "Payroll API", EntityKind::Api), DelegationStatus::Available)
//!     .unwrap();
//!
//! ledger.stage_add(&"1".into()).unwrap();
//! assert_eq!(ledger.status(&"1".into()), Some(DelegationStatus::StagedForAdd));
//!
//! // Staging the same entity again is a precondition failure.
//! assert!(ledger.stage_add(&"1".into()).unwrap_err().is_not_available());
//! ```

pub mod errors;
pub mod snapshot;

use std::collections::BTreeMap;

pub use errors::LedgerError;
pub use snapshot::{LedgerSnapshot, SnapshotEntry};

use crate::entity::{DelegationStatus, Entity, EntityId};

#[derive(Debug, Clone)]
struct Slot {
    entity: Entity,
    status: DelegationStatus,
    /// Status at the start of the session, or after the last confirmed change.
    baseline: DelegationStatus,
}

/// Id-indexed collection of entities and their lifecycle status.
#[derive(Debug, Clone, Default)]
pub struct StagingLedger {
    slots: BTreeMap<EntityId, Slot>,
}

impl StagingLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking an entity in a settled status.
    ///
    /// Staged statuses are rejected because only the ledger itself may stage.
    pub fn insert(&mut self, entity: Entity, status: DelegationStatus) -> Result<(), LedgerError> {
        if status.is_staged() {
            return Err(LedgerError::InvalidBaseline {
                id: entity.id,
                status,
            });
        }
        if self.slots.contains_key(&entity.id) {
            return Err(LedgerError::DuplicateEntity { id: entity.id });
        }
        self.slots.insert(
            entity.id.clone(),
            Slot {
                entity,
                status,
                baseline: status,
            },
        );
        Ok(())
    }

    /// Moves an entity from `Available` to `StagedForAdd`.
    pub fn stage_add(&mut self, id: &EntityId) -> Result<(), LedgerError> {
        self.transition(
            id,
            DelegationStatus::Available,
            DelegationStatus::StagedForAdd,
        )
    }

    /// Moves an entity from `Delegated` to `StagedForRemove`.
    pub fn stage_remove(&mut self, id: &EntityId) -> Result<(), LedgerError> {
        self.transition(
            id,
            DelegationStatus::Delegated,
            DelegationStatus::StagedForRemove,
        )
    }

    /// Reverts a staged entity to the status it was staged from.
    ///
    /// Returns `false` without changing anything if the id is unknown or not
    /// currently staged.
    pub fn undo_stage(&mut self, id: &EntityId) -> bool {
        let Some(slot) = self.slots.get_mut(id) else {
            return false;
        };
        match slot.status.unstaged() {
            Some(previous) => {
                debug_assert!(slot.status.can_transition_to(previous));
                tracing::debug!(entity = %id, from = %slot.status, to = %previous, "undo staging");
                slot.status = previous;
                true
            }
            None => false,
        }
    }

    /// Returns every entity to its baseline status, discarding all staging.
    pub fn reset(&mut self) {
        let mut reverted = 0usize;
        for slot in self.slots.values_mut() {
            if slot.status != slot.baseline {
                slot.status = slot.baseline;
                reverted += 1;
            }
        }
        tracing::debug!(reverted, "ledger reset");
    }

    /// An owned, immutable view of all entities grouped by status.
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot::new(
            self.slots
                .values()
                .map(|slot| SnapshotEntry {
                    entity: slot.entity.clone(),
                    status: slot.status,
                    pending_edit: false,
                })
                .collect(),
        )
    }

    /// Current status of an entity.
    pub fn status(&self, id: &EntityId) -> Option<DelegationStatus> {
        self.slots.get(id).map(|slot| slot.status)
    }

    /// The tracked entity with this id.
    pub fn entity(&self, id: &EntityId) -> Option<&Entity> {
        self.slots.get(id).map(|slot| &slot.entity)
    }

    /// Iterates over all tracked entities and their status, ordered by id.
    pub fn iter(&self) -> impl Iterator<Item = (&Entity, DelegationStatus)> {
        self.slots.values().map(|slot| (&slot.entity, slot.status))
    }

    /// Ids of all entities currently staged for add or remove.
    pub fn staged_ids(&self) -> Vec<EntityId> {
        self.slots
            .iter()
            .filter(|(_, slot)| slot.status.is_staged())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Number of tracked entities.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if no entities are tracked.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Marks a staged entity as confirmed by the backend.
    ///
    /// The resolved status becomes the new baseline, so a later [`reset`](Self::reset)
    /// does not undo confirmed changes. Non-staged entities are left alone.
    pub(crate) fn confirm(&mut self, id: &EntityId) -> Option<DelegationStatus> {
        let slot = self.slots.get_mut(id)?;
        let resolved = slot.status.resolved()?;
        debug_assert!(slot.status.can_transition_to(resolved));
        slot.status = resolved;
        slot.baseline = resolved;
        Some(resolved)
    }

    /// Replaces the settled status of an unstaged entity with backend truth.
    pub(crate) fn rebase(&mut self, id: &EntityId, status: DelegationStatus) {
        if let Some(slot) = self.slots.get_mut(id)
            && !slot.status.is_staged()
            && !status.is_staged()
        {
            slot.status = status;
            slot.baseline = status;
        }
    }

    fn transition(
        &mut self,
        id: &EntityId,
        expected: DelegationStatus,
        next: DelegationStatus,
    ) -> Result<(), LedgerError> {
        let slot = self
            .slots
            .get_mut(id)
            .ok_or_else(|| LedgerError::EntityNotFound { id: id.clone() })?;

        if slot.status != expected {
            return Err(LedgerError::NotAvailable {
                id: id.clone(),
                expected,
                actual: slot.status,
            });
        }

        debug_assert!(expected.can_transition_to(next));
        tracing::debug!(entity = %id, from = %slot.status, to = %next, "staging");
        slot.status = next;
        Ok(())
    }
}
