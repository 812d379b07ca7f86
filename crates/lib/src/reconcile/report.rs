//! Reconciliation results.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::classify::{ErrorCode, headline, prioritize};
use crate::entity::{ActionKey, DelegationStatus, EntityId, EntityKind};
use crate::rights::RightsDelta;

/// What a reconciliation did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "kebab-case")]
pub enum ReconciliationResult {
    /// Desired and last known rights already matched. No backend call was made.
    NoChange,
    /// Changes were issued; see the report for per-entity outcomes.
    Applied(ReconciliationReport),
}

impl ReconciliationResult {
    pub fn is_no_change(&self) -> bool {
        matches!(self, ReconciliationResult::NoChange)
    }

    pub fn report(&self) -> Option<&ReconciliationReport> {
        match self {
            ReconciliationResult::NoChange => None,
            ReconciliationResult::Applied(report) => Some(report),
        }
    }
}

/// The kind of change attempted on an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeKind {
    /// A staged-for-add entity was delegated.
    Grant,
    /// A staged-for-remove entity was revoked.
    Revoke,
    /// The action keys of an already delegated entity were changed.
    Edit,
}

impl ChangeKind {
    pub(crate) fn for_status(status: Option<DelegationStatus>) -> Self {
        match status {
            Some(DelegationStatus::StagedForAdd) => ChangeKind::Grant,
            Some(DelegationStatus::StagedForRemove) => ChangeKind::Revoke,
            _ => ChangeKind::Edit,
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChangeKind::Grant => "grant",
            ChangeKind::Revoke => "revoke",
            ChangeKind::Edit => "edit",
        };
        f.write_str(name)
    }
}

/// Whether the change on one entity went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    Succeeded,
    /// Carries the most actionable of the entity's failure codes.
    Failed(ErrorCode),
}

/// One refused key, or a whole-call failure when `key` is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyFailure {
    pub key: Option<ActionKey>,
    pub code: ErrorCode,
    /// The backend's own description.
    pub detail: String,
}

/// Outcome of the change on one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityOutcome {
    pub id: EntityId,
    pub kind: EntityKind,
    pub change: ChangeKind,
    pub delta: RightsDelta,
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<KeyFailure>,
    /// Ledger status after the reconciliation.
    pub status: Option<DelegationStatus>,
}

impl EntityOutcome {
    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Succeeded
    }

    /// The headline error code, if the change failed.
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self.outcome {
            Outcome::Succeeded => None,
            Outcome::Failed(code) => Some(code),
        }
    }
}

/// Per-entity outcomes of one reconciliation, ordered by entity id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    outcomes: Vec<EntityOutcome>,
}

impl ReconciliationReport {
    pub(crate) fn new(outcomes: Vec<EntityOutcome>) -> Self {
        Self { outcomes }
    }

    pub fn outcomes(&self) -> &[EntityOutcome] {
        &self.outcomes
    }

    /// The outcome for one entity.
    pub fn outcome(&self, id: &EntityId) -> Option<&EntityOutcome> {
        self.outcomes.iter().find(|outcome| &outcome.id == id)
    }

    pub fn succeeded(&self) -> Vec<&EntityOutcome> {
        self.outcomes.iter().filter(|o| o.is_success()).collect()
    }

    pub fn failed(&self) -> Vec<&EntityOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success()).collect()
    }

    pub fn is_complete_success(&self) -> bool {
        self.outcomes.iter().all(EntityOutcome::is_success)
    }

    /// Headline codes of all failed entities, most actionable first.
    pub fn error_codes(&self) -> Vec<ErrorCode> {
        let codes: Vec<ErrorCode> = self
            .outcomes
            .iter()
            .filter_map(EntityOutcome::error_code)
            .collect();
        prioritize(&codes)
    }

    /// The one error a host should show for the whole batch.
    pub fn headline_error(&self) -> Option<ErrorCode> {
        let codes: Vec<ErrorCode> = self
            .outcomes
            .iter()
            .filter_map(EntityOutcome::error_code)
            .collect();
        headline(&codes)
    }
}
