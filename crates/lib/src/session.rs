//! Delegation sessions
//!
//! A [`DelegationSession`] holds everything one delegation or edit flow needs:
//! the parties involved, a [`StagingLedger`] of the entities on screen, the
//! rights last confirmed by the backend and the rights the user wants.
//!
//! Staging operations on the session keep the desired rights in step with the
//! ledger. Nothing here talks to the backend except [`load_baseline`];
//! mutations only happen through [`reconcile`](crate::reconcile::Reconciler::reconcile).
//!
//! [`load_baseline`]: DelegationSession::load_baseline

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::client::AuthorizationClient;
use crate::entity::{DelegationStatus, Entity, EntityId};
use crate::ledger::{LedgerError, LedgerSnapshot, StagingLedger};
use crate::party::PartyUrn;
use crate::reconcile::ReconcileError;
use crate::rights::{RightsDelta, RightsMap, RightsSet, diff_all};

/// The role a party plays in a delegation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PartyRole {
    /// The user performing the delegation.
    Acting,
    /// The party whose rights are delegated.
    From,
    /// The party receiving the rights.
    To,
}

impl fmt::Display for PartyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PartyRole::Acting => "acting",
            PartyRole::From => "from",
            PartyRole::To => "to",
        };
        f.write_str(name)
    }
}

/// The parties of a session. Any of them may be unknown while the flow loads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parties {
    pub acting: Option<PartyUrn>,
    pub from: Option<PartyUrn>,
    pub to: Option<PartyUrn>,
}

impl Parties {
    /// All three parties known up front.
    pub fn new(acting: PartyUrn, from: PartyUrn, to: PartyUrn) -> Self {
        Self {
            acting: Some(acting),
            from: Some(from),
            to: Some(to),
        }
    }

    /// Returns the parties, or the role of the first one missing.
    pub fn require(&self) -> Result<ResolvedParties, ReconcileError> {
        let missing = |role| ReconcileError::MissingParty { role };
        Ok(ResolvedParties {
            acting: self.acting.clone().ok_or_else(|| missing(PartyRole::Acting))?,
            from: self.from.clone().ok_or_else(|| missing(PartyRole::From))?,
            to: self.to.clone().ok_or_else(|| missing(PartyRole::To))?,
        })
    }
}

/// Parties of a session once all of them are known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedParties {
    pub acting: PartyUrn,
    pub from: PartyUrn,
    pub to: PartyUrn,
}

/// State of one delegation flow for an (acting, from, to) triple.
#[derive(Debug, Clone, Default)]
pub struct DelegationSession {
    parties: Parties,
    ledger: StagingLedger,
    last_known: RightsMap,
    desired: RightsMap,
    /// Set once a full load ran or the host declared all statuses to be truth.
    baseline_known: bool,
    /// Resources whose rights were set individually.
    known_baselines: BTreeSet<EntityId>,
    needs_refresh: bool,
}

impl DelegationSession {
    /// Creates an empty session. The baseline is unknown until loaded or set.
    pub fn new(parties: Parties) -> Self {
        Self {
            parties,
            ..Self::default()
        }
    }

    pub fn parties(&self) -> &Parties {
        &self.parties
    }

    /// Replaces the parties, e.g. once the recipient has been looked up.
    pub fn set_parties(&mut self, parties: Parties) {
        self.parties = parties;
    }

    /// Starts tracking an entity.
    ///
    /// A `Delegated` entity is assumed to hold its full rights until the
    /// baseline is loaded or set explicitly.
    pub fn add_entity(&mut self, entity: Entity, status: DelegationStatus) -> Result<(), LedgerError> {
        let id = entity.id.clone();
        let full = entity.full_rights();
        self.ledger.insert(entity, status)?;
        if status == DelegationStatus::Delegated {
            self.last_known.insert(id.clone(), full.clone());
            self.desired.insert(id, full);
        }
        Ok(())
    }

    /// Builder form of [`add_entity`](Self::add_entity).
    pub fn with_entity(mut self, entity: Entity, status: DelegationStatus) -> Result<Self, LedgerError> {
        self.add_entity(entity, status)?;
        Ok(self)
    }

    /// Records backend truth for one resource without querying.
    ///
    /// Unstaged entities move to `Delegated` or `Available` to match; staged
    /// entities keep their staging and desired rights.
    ///
    /// Only this resource counts as known afterwards. Reconciliation still
    /// queries the backend for every other resource whose baseline is unknown.
    pub fn set_baseline<I, K>(&mut self, resource: &EntityId, keys: I) -> Result<(), LedgerError>
    where
        I: IntoIterator<Item = K>,
        K: Into<crate::entity::ActionKey>,
    {
        let keys: RightsSet = keys.into_iter().map(Into::into).collect();
        self.apply_baseline(resource, keys)?;
        self.known_baselines.insert(resource.clone());
        Ok(())
    }

    /// Declares the statuses given to [`add_entity`](Self::add_entity) to be
    /// backend truth, so reconciliation will not query first.
    pub fn mark_baseline_known(&mut self) {
        self.baseline_known = true;
    }

    /// Whether the last known rights of every tracked resource reflect the
    /// backend, either through a load, [`mark_baseline_known`](Self::mark_baseline_known)
    /// or a [`set_baseline`](Self::set_baseline) per resource.
    pub fn baseline_known(&self) -> bool {
        self.baseline_known
            || self
                .ledger
                .iter()
                .all(|(entity, _)| self.known_baselines.contains(&entity.id))
    }

    /// Queries the backend for the current rights of every tracked entity.
    ///
    /// A `NotFound` answer means nothing is delegated. Any other failure
    /// aborts the load, leaving the session unchanged.
    pub async fn load_baseline(&mut self, client: &dyn AuthorizationClient) -> Result<(), ReconcileError> {
        self.query_baselines(client, false).await
    }

    /// Like [`load_baseline`](Self::load_baseline), but only queries resources
    /// whose rights were never loaded or set. Does nothing once the whole
    /// baseline is known.
    pub async fn load_missing_baseline(
        &mut self,
        client: &dyn AuthorizationClient,
    ) -> Result<(), ReconcileError> {
        if self.baseline_known() {
            return Ok(());
        }
        self.query_baselines(client, true).await
    }

    async fn query_baselines(
        &mut self,
        client: &dyn AuthorizationClient,
        only_missing: bool,
    ) -> Result<(), ReconcileError> {
        let parties = self.parties.require()?;
        let mut fetched: BTreeMap<EntityId, RightsSet> = BTreeMap::new();

        for (entity, _) in self.ledger.iter() {
            let id = &entity.id;
            if only_missing && self.known_baselines.contains(id) {
                continue;
            }
            let rights = if entity.is_package() {
                match client.has_package(&parties.to, id).await {
                    Ok(true) => entity.full_rights(),
                    Ok(false) => RightsSet::new(),
                    Err(e) if e.is_not_found() => RightsSet::new(),
                    Err(source) => {
                        return Err(ReconcileError::BaselineQueryFailed {
                            resource: id.clone(),
                            source,
                        });
                    }
                }
            } else {
                match client.query_rights(&parties.from, &parties.to, id).await {
                    Ok(rights) => rights,
                    Err(e) if e.is_not_found() => RightsSet::new(),
                    Err(source) => {
                        return Err(ReconcileError::BaselineQueryFailed {
                            resource: id.clone(),
                            source,
                        });
                    }
                }
            };
            fetched.insert(id.clone(), rights);
        }

        tracing::debug!(resources = fetched.len(), "baseline loaded");
        for (id, rights) in fetched {
            // Every id came from the ledger, so this cannot miss.
            self.apply_baseline(&id, rights)?;
        }
        self.baseline_known = true;
        if !only_missing {
            self.needs_refresh = false;
        }
        Ok(())
    }

    /// Stages an available entity for delegation with its full rights.
    pub fn stage_add(&mut self, id: &EntityId) -> Result<(), LedgerError> {
        self.ledger.stage_add(id)?;
        if let Some(entity) = self.ledger.entity(id) {
            self.desired.insert(id.clone(), entity.full_rights());
        }
        Ok(())
    }

    /// Stages a delegated entity for revocation.
    pub fn stage_remove(&mut self, id: &EntityId) -> Result<(), LedgerError> {
        self.ledger.stage_remove(id)?;
        self.desired.remove(id);
        Ok(())
    }

    /// Undoes staging of one entity. No-op if it is not staged.
    pub fn undo_stage(&mut self, id: &EntityId) -> bool {
        let undone = self.ledger.undo_stage(id);
        if undone {
            self.restore_desired(id);
        }
        undone
    }

    /// Discards all staging and edits.
    pub fn reset(&mut self) {
        self.ledger.reset();
        self.desired = self.last_known.clone();
    }

    /// Sets the action keys wanted for one entity.
    ///
    /// Editing an available entity stages it for add, and editing a delegated
    /// entity down to nothing stages it for remove.
    pub fn edit_rights<I, K>(&mut self, id: &EntityId, keys: I) -> Result<(), LedgerError>
    where
        I: IntoIterator<Item = K>,
        K: Into<crate::entity::ActionKey>,
    {
        let entity = self
            .ledger
            .entity(id)
            .ok_or_else(|| LedgerError::EntityNotFound { id: id.clone() })?;
        let keys: RightsSet = keys.into_iter().map(Into::into).collect();
        if let Some(key) = keys.iter().find(|key| !entity.permits(key)) {
            return Err(LedgerError::UnknownActionKey {
                id: id.clone(),
                key: key.clone(),
            });
        }

        let status = self.ledger.status(id).unwrap_or(DelegationStatus::Available);
        match (status, keys.is_empty()) {
            (DelegationStatus::Available, true) | (DelegationStatus::StagedForRemove, true) => {}
            (DelegationStatus::Available, false) => {
                self.ledger.stage_add(id)?;
                self.desired.insert(id.clone(), keys);
            }
            (DelegationStatus::StagedForAdd, true) => {
                self.undo_stage(id);
            }
            (DelegationStatus::StagedForAdd, false) | (DelegationStatus::Delegated, false) => {
                self.desired.insert(id.clone(), keys);
            }
            (DelegationStatus::Delegated, true) => {
                self.stage_remove(id)?;
            }
            (DelegationStatus::StagedForRemove, false) => {
                self.ledger.undo_stage(id);
                self.desired.insert(id.clone(), keys);
            }
            (DelegationStatus::Revoked, _) => {
                return Err(LedgerError::NotAvailable {
                    id: id.clone(),
                    expected: DelegationStatus::Delegated,
                    actual: DelegationStatus::Revoked,
                });
            }
        }
        tracing::debug!(entity = %id, "rights edited");
        Ok(())
    }

    /// Per-resource changes a reconciliation would make right now.
    pub fn plan(&self) -> BTreeMap<EntityId, RightsDelta> {
        diff_all(&self.last_known, &self.desired)
    }

    /// True if anything is staged or edited, so reconciliation has work to do.
    ///
    /// Agrees with [`LedgerSnapshot::has_pending_changes`] on [`snapshot`](Self::snapshot).
    pub fn has_pending_changes(&self) -> bool {
        !self.ledger.staged_ids().is_empty() || !self.plan().is_empty()
    }

    /// Rights last confirmed for a resource.
    pub fn last_known_rights(&self, id: &EntityId) -> RightsSet {
        self.last_known.get(id).cloned().unwrap_or_default()
    }

    /// Rights currently wanted for a resource.
    pub fn desired_rights(&self, id: &EntityId) -> RightsSet {
        self.desired.get(id).cloned().unwrap_or_default()
    }

    pub fn ledger(&self) -> &StagingLedger {
        &self.ledger
    }

    /// The ledger snapshot, with edits to settled entities flagged as pending.
    pub fn snapshot(&self) -> LedgerSnapshot {
        let mut snapshot = self.ledger.snapshot();
        snapshot.mark_pending_edits(&self.plan());
        snapshot
    }

    /// Set when a reconciliation failed part-way. The host should reload the
    /// baseline before trusting the session again.
    pub fn needs_refresh(&self) -> bool {
        self.needs_refresh
    }

    /// Records a fully applied change for a resource.
    pub(crate) fn confirm(&mut self, id: &EntityId, rights: RightsSet) -> Option<DelegationStatus> {
        self.set_last_known(id, rights);
        self.ledger.confirm(id);
        self.ledger.status(id)
    }

    /// Records what actually changed on a resource whose change failed.
    pub(crate) fn record_partial(&mut self, id: &EntityId, rights: RightsSet) {
        self.set_last_known(id, rights);
        self.needs_refresh = true;
    }

    fn set_last_known(&mut self, id: &EntityId, rights: RightsSet) {
        if rights.is_empty() {
            self.last_known.remove(id);
        } else {
            self.last_known.insert(id.clone(), rights);
        }
    }

    fn restore_desired(&mut self, id: &EntityId) {
        match self.last_known.get(id) {
            Some(rights) => {
                self.desired.insert(id.clone(), rights.clone());
            }
            None => {
                self.desired.remove(id);
            }
        }
    }

    fn apply_baseline(&mut self, id: &EntityId, rights: RightsSet) -> Result<(), LedgerError> {
        let status = self
            .ledger
            .status(id)
            .ok_or_else(|| LedgerError::EntityNotFound { id: id.clone() })?;

        let settled = if !rights.is_empty() {
            Some(DelegationStatus::Delegated)
        } else if status == DelegationStatus::Delegated {
            Some(DelegationStatus::Available)
        } else {
            None
        };

        self.set_last_known(id, rights);
        if !status.is_staged() {
            if let Some(settled) = settled {
                self.ledger.rebase(id, settled);
            }
            self.restore_desired(id);
        }
        Ok(())
    }
}
