//! Rights sets and the diff primitive
//!
//! Reconciliation reduces every change, whatever the entity kind, to a pair of
//! set differences over action keys: what must be granted and what must be
//! revoked to turn the last known rights of a resource into the desired ones.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::entity::{ActionKey, EntityId};

/// The action keys held on one resource.
pub type RightsSet = BTreeSet<ActionKey>;

/// Rights per resource. A missing resource holds no rights.
pub type RightsMap = BTreeMap<EntityId, RightsSet>;

/// The change needed to move a resource from one rights set to another.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RightsDelta {
    pub to_grant: RightsSet,
    pub to_revoke: RightsSet,
}

impl RightsDelta {
    /// True when nothing needs to change.
    pub fn is_empty(&self) -> bool {
        self.to_grant.is_empty() && self.to_revoke.is_empty()
    }

    /// Applies the delta to `base`, returning the resulting set.
    pub fn apply(&self, base: &RightsSet) -> RightsSet {
        base.union(&self.to_grant)
            .filter(|key| !self.to_revoke.contains(*key))
            .cloned()
            .collect()
    }
}

/// Computes `desired - last_known` and `last_known - desired`.
///
/// The two sides are disjoint by construction, and applying the result to
/// `last_known` yields exactly `desired`.
///
/// # Examples
/// ```
/// use delegation_ledger::entity::ActionKey;
/// use delegation_ledger::rights::{RightsSet, diff};
///
/// let last = RightsSet::from([ActionKey::from("read"), ActionKey::from("write")]);
/// let desired = RightsSet::from([ActionKey::from("write"), ActionKey::from("sign")]);
///
/// let delta = diff(&last, &desired);
/// assert_eq!(delta.to_grant, RightsSet::from([ActionKey::from("sign")]));
/// assert_eq!(delta.to_revoke, RightsSet::from([ActionKey::from("read")]));
/// ```
pub fn diff(last_known: &RightsSet, desired: &RightsSet) -> RightsDelta {
    RightsDelta {
        to_grant: desired.difference(last_known).cloned().collect(),
        to_revoke: last_known.difference(desired).cloned().collect(),
    }
}

/// Diffs every resource present in either map, keeping only non-empty deltas.
pub fn diff_all(last_known: &RightsMap, desired: &RightsMap) -> BTreeMap<EntityId, RightsDelta> {
    let empty = RightsSet::new();
    let resources: BTreeSet<&EntityId> = last_known.keys().chain(desired.keys()).collect();

    resources
        .into_iter()
        .filter_map(|resource| {
            let last = last_known.get(resource).unwrap_or(&empty);
            let want = desired.get(resource).unwrap_or(&empty);
            let delta = diff(last, want);
            (!delta.is_empty()).then(|| (resource.clone(), delta))
        })
        .collect()
}
