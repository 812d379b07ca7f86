//! In-memory authorization backend
//!
//! Holds delegated rights and access packages in memory and implements
//! [`AuthorizationClient`] against them. Failures can be scripted per resource
//! or per action key, and every call is recorded, which makes the client
//! suitable for exercising reconciliation end to end.
//!
//! State can be saved to and loaded from a JSON file (see
//! [`save_to_file`](InMemoryClient::save_to_file)).

mod persistence;

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::{AuthorizationClient, ClientError, ClientResult, FailedRight};
use crate::entity::{ActionKey, EntityId};
use crate::party::PartyUrn;
use crate::rights::RightsSet;

/// Key of a rights record: (from, to, resource).
pub(crate) type RightsKey = (PartyUrn, PartyUrn, EntityId);

/// Backend operations, as recorded in the call log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    QueryRights,
    GrantRights,
    RevokeRights,
    QueryPackage,
    GrantPackage,
    RevokePackage,
}

impl Operation {
    fn is_mutation(self) -> bool {
        matches!(
            self,
            Operation::GrantRights
                | Operation::RevokeRights
                | Operation::GrantPackage
                | Operation::RevokePackage
        )
    }
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientCall {
    pub operation: Operation,
    pub resource: EntityId,
    pub keys: RightsSet,
}

#[derive(Debug, Clone)]
enum FailureKind {
    Rejected(String),
    Network,
}

#[derive(Debug, Clone)]
struct FailureRule {
    resource: EntityId,
    key: Option<ActionKey>,
    operations: Option<BTreeSet<Operation>>,
    kind: FailureKind,
}

impl FailureRule {
    fn applies(&self, operation: Operation, resource: &EntityId) -> bool {
        self.resource == *resource
            && self
                .operations
                .as_ref()
                .is_none_or(|ops| ops.contains(&operation))
    }
}

/// An [`AuthorizationClient`] backed by in-process maps.
#[derive(Debug, Default)]
pub struct InMemoryClient {
    pub(crate) rights: RwLock<BTreeMap<RightsKey, RightsSet>>,
    pub(crate) packages: RwLock<BTreeSet<(PartyUrn, EntityId)>>,
    failures: RwLock<Vec<FailureRule>>,
    calls: RwLock<Vec<ClientCall>>,
}

impl InMemoryClient {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds delegated rights without recording a call.
    pub async fn seed_rights<I, K>(&self, from: &PartyUrn, to: &PartyUrn, resource: &EntityId, keys: I)
    where
        I: IntoIterator<Item = K>,
        K: Into<ActionKey>,
    {
        let keys: RightsSet = keys.into_iter().map(Into::into).collect();
        if keys.is_empty() {
            return;
        }
        self.rights
            .write()
            .await
            .entry((from.clone(), to.clone(), resource.clone()))
            .or_default()
            .extend(keys);
    }

    /// Seeds a held access package without recording a call.
    pub async fn seed_package(&self, to: &PartyUrn, package: &EntityId) {
        self.packages
            .write()
            .await
            .insert((to.clone(), package.clone()));
    }

    /// Rights currently stored for a resource, without recording a call.
    pub async fn stored_rights(&self, from: &PartyUrn, to: &PartyUrn, resource: &EntityId) -> RightsSet {
        self.rights
            .read()
            .await
            .get(&(from.clone(), to.clone(), resource.clone()))
            .cloned()
            .unwrap_or_default()
    }

    /// Whether a package is stored, without recording a call.
    pub async fn stored_package(&self, to: &PartyUrn, package: &EntityId) -> bool {
        self.packages
            .read()
            .await
            .contains(&(to.clone(), package.clone()))
    }

    /// Every grant, revoke or package call on `resource` is refused with `code`.
    pub async fn fail_resource(&self, resource: impl Into<EntityId>, code: impl Into<String>) {
        self.add_rule(resource.into(), None, None, FailureKind::Rejected(code.into()))
            .await;
    }

    /// Only grants on `resource` are refused with `code`.
    pub async fn fail_grants(&self, resource: impl Into<EntityId>, code: impl Into<String>) {
        let ops = BTreeSet::from([Operation::GrantRights, Operation::GrantPackage]);
        self.add_rule(
            resource.into(),
            None,
            Some(ops),
            FailureKind::Rejected(code.into()),
        )
        .await;
    }

    /// Grants and revokes of `key` on `resource` are refused with `code`.
    pub async fn fail_key(
        &self,
        resource: impl Into<EntityId>,
        key: impl Into<ActionKey>,
        code: impl Into<String>,
    ) {
        self.add_rule(
            resource.into(),
            Some(key.into()),
            None,
            FailureKind::Rejected(code.into()),
        )
        .await;
    }

    /// Every call touching `resource`, queries included, fails at the transport level.
    pub async fn fail_network(&self, resource: impl Into<EntityId>) {
        self.add_rule(resource.into(), None, None, FailureKind::Network)
            .await;
    }

    /// Removes all scripted failures.
    pub async fn clear_failures(&self) {
        self.failures.write().await.clear();
    }

    /// Recorded calls, in arrival order.
    pub async fn calls(&self) -> Vec<ClientCall> {
        self.calls.read().await.clone()
    }

    /// Number of recorded calls of any kind.
    pub async fn call_count(&self) -> usize {
        self.calls.read().await.len()
    }

    /// Number of recorded grant and revoke calls.
    pub async fn mutation_count(&self) -> usize {
        self.calls
            .read()
            .await
            .iter()
            .filter(|call| call.operation.is_mutation())
            .count()
    }

    /// Clears the call log.
    pub async fn clear_calls(&self) {
        self.calls.write().await.clear();
    }

    /// Saves delegated rights and packages to a JSON file.
    ///
    /// Scripted failures and the call log are not persisted.
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> ClientResult<()> {
        persistence::save_to_file(self, path).await
    }

    /// Loads state from a JSON file, or returns an empty backend if the file
    /// does not exist.
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> ClientResult<Self> {
        persistence::load_from_file(path).await
    }

    async fn add_rule(
        &self,
        resource: EntityId,
        key: Option<ActionKey>,
        operations: Option<BTreeSet<Operation>>,
        kind: FailureKind,
    ) {
        self.failures.write().await.push(FailureRule {
            resource,
            key,
            operations,
            kind,
        });
    }

    async fn record(&self, operation: Operation, resource: &EntityId, keys: &RightsSet) {
        tracing::trace!(?operation, %resource, "in-memory backend call");
        self.calls.write().await.push(ClientCall {
            operation,
            resource: resource.clone(),
            keys: keys.clone(),
        });
    }

    /// Applies scripted failures: whole-call errors first, then per-key refusals.
    async fn check(
        &self,
        operation: Operation,
        resource: &EntityId,
        keys: &RightsSet,
    ) -> ClientResult<Vec<FailedRight>> {
        let rules = self.failures.read().await;
        let mut failed = Vec::new();
        for rule in rules.iter().filter(|rule| rule.applies(operation, resource)) {
            match (&rule.kind, &rule.key) {
                (FailureKind::Network, _) => {
                    return Err(ClientError::Network {
                        reason: format!("connection to backend failed for {resource}"),
                    });
                }
                (FailureKind::Rejected(code), None) => {
                    failed.extend(keys.iter().map(|key| FailedRight::new(key.clone(), code.clone())));
                }
                (FailureKind::Rejected(code), Some(key)) if keys.contains(key) => {
                    failed.push(FailedRight::new(key.clone(), code.clone()));
                }
                _ => {}
            }
        }
        failed.sort_by(|a, b| a.key.cmp(&b.key));
        failed.dedup_by(|a, b| a.key == b.key);
        Ok(failed)
    }

    async fn check_package(&self, operation: Operation, package: &EntityId) -> ClientResult<()> {
        let whole = RightsSet::from([ActionKey::wildcard()]);
        let failed = self.check(operation, package, &whole).await?;
        match failed.into_iter().next() {
            Some(refused) => Err(ClientError::Rejected {
                resource: package.clone(),
                code: refused.code,
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl AuthorizationClient for InMemoryClient {
    async fn query_rights(
        &self,
        from: &PartyUrn,
        to: &PartyUrn,
        resource: &EntityId,
    ) -> ClientResult<RightsSet> {
        self.record(Operation::QueryRights, resource, &RightsSet::new())
            .await;
        self.check(Operation::QueryRights, resource, &RightsSet::new())
            .await?;

        self.rights
            .read()
            .await
            .get(&(from.clone(), to.clone(), resource.clone()))
            .cloned()
            .ok_or_else(|| ClientError::NotFound {
                resource: resource.clone(),
            })
    }

    async fn grant_rights(
        &self,
        from: &PartyUrn,
        to: &PartyUrn,
        resource: &EntityId,
        keys: &RightsSet,
    ) -> ClientResult<Vec<FailedRight>> {
        self.record(Operation::GrantRights, resource, keys).await;
        let failed = self.check(Operation::GrantRights, resource, keys).await?;

        let granted: RightsSet = keys
            .iter()
            .filter(|key| !failed.iter().any(|f| &f.key == *key))
            .cloned()
            .collect();
        if !granted.is_empty() {
            self.rights
                .write()
                .await
                .entry((from.clone(), to.clone(), resource.clone()))
                .or_default()
                .extend(granted);
        }
        Ok(failed)
    }

    async fn revoke_rights(
        &self,
        from: &PartyUrn,
        to: &PartyUrn,
        resource: &EntityId,
        keys: &RightsSet,
    ) -> ClientResult<Vec<FailedRight>> {
        self.record(Operation::RevokeRights, resource, keys).await;
        let failed = self.check(Operation::RevokeRights, resource, keys).await?;

        let record_key = (from.clone(), to.clone(), resource.clone());
        let mut rights = self.rights.write().await;
        if let Some(held) = rights.get_mut(&record_key) {
            held.retain(|key| !keys.contains(key) || failed.iter().any(|f| &f.key == key));
            if held.is_empty() {
                rights.remove(&record_key);
            }
        }
        Ok(failed)
    }

    async fn has_package(&self, to: &PartyUrn, package: &EntityId) -> ClientResult<bool> {
        self.record(Operation::QueryPackage, package, &RightsSet::new())
            .await;
        self.check(Operation::QueryPackage, package, &RightsSet::new())
            .await?;
        Ok(self.stored_package(to, package).await)
    }

    async fn grant_package(&self, to: &PartyUrn, package: &EntityId) -> ClientResult<()> {
        self.record(Operation::GrantPackage, package, &RightsSet::new())
            .await;
        self.check_package(Operation::GrantPackage, package).await?;
        self.packages
            .write()
            .await
            .insert((to.clone(), package.clone()));
        Ok(())
    }

    async fn revoke_package(&self, to: &PartyUrn, package: &EntityId) -> ClientResult<()> {
        self.record(Operation::RevokePackage, package, &RightsSet::new())
            .await;
        self.check_package(Operation::RevokePackage, package).await?;
        self.packages
            .write()
            .await
            .remove(&(to.clone(), package.clone()));
        Ok(())
    }
}
