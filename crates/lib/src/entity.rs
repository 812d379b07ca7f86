//! Delegable entities and their lifecycle status
//!
//! An [`Entity`] is any unit that can be delegated: a whole organization, an
//! API, an access package, or a single right with a set of permitted actions.
//! Each entity tracked by a ledger carries exactly one [`DelegationStatus`].

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::WILDCARD_ACTION_KEY;

/// Stable identifier of an entity, unique within the ledger that holds it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Creates an id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// One permitted operation within a resource, such as `read`, `write` or `sign`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionKey(String);

impl ActionKey {
    /// Creates an action key from any string-like value.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The key standing for the whole resource.
    pub fn wildcard() -> Self {
        Self(WILDCARD_ACTION_KEY.to_string())
    }

    /// Returns true if this is the whole-resource key.
    pub fn is_wildcard(&self) -> bool {
        self.0 == WILDCARD_ACTION_KEY
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActionKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for ActionKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// The granularity of a delegable entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    Organization,
    Api,
    AccessPackage,
    SingleRight,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Organization => "organization",
            EntityKind::Api => "api",
            EntityKind::AccessPackage => "access-package",
            EntityKind::SingleRight => "single-right",
        };
        f.write_str(name)
    }
}

/// A delegable unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: EntityId,
    pub display_name: String,
    pub kind: EntityKind,
    /// Owning party, e.g. the organization providing an API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_name: Option<String>,
    /// Permitted actions. Empty for kinds delegated as a whole.
    #[serde(default)]
    pub action_keys: BTreeSet<ActionKey>,
}

impl Entity {
    /// Creates an entity without an owner or action keys.
    pub fn new(id: impl Into<EntityId>, display_name: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            kind,
            owner_name: None,
            action_keys: BTreeSet::new(),
        }
    }

    /// Sets the owner name.
    pub fn with_owner(mut self, owner_name: impl Into<String>) -> Self {
        self.owner_name = Some(owner_name.into());
        self
    }

    /// Adds permitted action keys.
    pub fn with_action_keys<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<ActionKey>,
    {
        self.action_keys.extend(keys.into_iter().map(Into::into));
        self
    }

    /// The rights set that delegating this entity in full amounts to.
    ///
    /// Coarse entities map to the single wildcard key so that every kind can be
    /// diffed the same way.
    pub fn full_rights(&self) -> BTreeSet<ActionKey> {
        if self.action_keys.is_empty() {
            BTreeSet::from([ActionKey::wildcard()])
        } else {
            self.action_keys.clone()
        }
    }

    /// Returns true if `key` is an action this entity can be delegated with.
    pub fn permits(&self, key: &ActionKey) -> bool {
        if self.action_keys.is_empty() {
            key.is_wildcard()
        } else {
            self.action_keys.contains(key)
        }
    }

    /// Whether grants go through the access package endpoints.
    pub fn is_package(&self) -> bool {
        self.kind == EntityKind::AccessPackage
    }
}

/// Lifecycle position of an entity within a session.
///
/// The forward progression is
/// `Available -> StagedForAdd -> Delegated -> StagedForRemove -> Revoked`,
/// with the two staged states able to fall back before submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DelegationStatus {
    Available,
    StagedForAdd,
    Delegated,
    StagedForRemove,
    Revoked,
}

impl DelegationStatus {
    /// Returns true for the two pre-submission states.
    pub fn is_staged(self) -> bool {
        matches!(
            self,
            DelegationStatus::StagedForAdd | DelegationStatus::StagedForRemove
        )
    }

    /// Status an entity returns to when its staging is undone.
    pub fn unstaged(self) -> Option<DelegationStatus> {
        match self {
            DelegationStatus::StagedForAdd => Some(DelegationStatus::Available),
            DelegationStatus::StagedForRemove => Some(DelegationStatus::Delegated),
            _ => None,
        }
    }

    /// Status reached once the backend confirms a staged change.
    pub fn resolved(self) -> Option<DelegationStatus> {
        match self {
            DelegationStatus::StagedForAdd => Some(DelegationStatus::Delegated),
            DelegationStatus::StagedForRemove => Some(DelegationStatus::Revoked),
            _ => None,
        }
    }

    /// Whether moving from `self` to `next` is a legal lifecycle step.
    pub fn can_transition_to(self, next: DelegationStatus) -> bool {
        use DelegationStatus::*;
        matches!(
            (self, next),
            (Available, StagedForAdd)
                | (StagedForAdd, Available)
                | (StagedForAdd, Delegated)
                | (Delegated, StagedForRemove)
                | (StagedForRemove, Delegated)
                | (StagedForRemove, Revoked)
        )
    }
}

impl fmt::Display for DelegationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DelegationStatus::Available => "available",
            DelegationStatus::StagedForAdd => "staged-for-add",
            DelegationStatus::Delegated => "delegated",
            DelegationStatus::StagedForRemove => "staged-for-remove",
            DelegationStatus::Revoked => "revoked",
        };
        f.write_str(name)
    }
}
