//! Authorization backend client abstraction
//!
//! The engine never talks HTTP itself. Hosts supply an implementation of
//! [`AuthorizationClient`] that performs grants, revokes and queries against
//! the real authorization API; [`InMemoryClient`] is a complete implementation
//! for tests, demos and local tooling.

pub mod errors;
pub mod in_memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use errors::ClientError;
pub use in_memory::InMemoryClient;

use crate::entity::{ActionKey, EntityId};
use crate::party::PartyUrn;
use crate::rights::RightsSet;

/// Result type for client calls.
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// A single action key the backend refused, with its raw error code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedRight {
    pub key: ActionKey,
    pub code: String,
}

impl FailedRight {
    pub fn new(key: impl Into<ActionKey>, code: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            code: code.into(),
        }
    }
}

/// Operations the reconciliation engine needs from the authorization backend.
///
/// Implementations must be `Send + Sync`; the engine issues calls for
/// independent resources concurrently from spawned tasks.
#[async_trait]
pub trait AuthorizationClient: Send + Sync {
    /// Current action keys delegated from `from` to `to` on `resource`.
    ///
    /// Returns [`ClientError::NotFound`] if nothing has ever been delegated.
    async fn query_rights(
        &self,
        from: &PartyUrn,
        to: &PartyUrn,
        resource: &EntityId,
    ) -> ClientResult<RightsSet>;

    /// Grants `keys` on `resource`.
    ///
    /// Partial failure is returned as data: the returned list names every key
    /// that was not granted. `Err` is reserved for failures of the whole call.
    async fn grant_rights(
        &self,
        from: &PartyUrn,
        to: &PartyUrn,
        resource: &EntityId,
        keys: &RightsSet,
    ) -> ClientResult<Vec<FailedRight>>;

    /// Revokes `keys` on `resource`. Same failure shape as [`grant_rights`](Self::grant_rights).
    async fn revoke_rights(
        &self,
        from: &PartyUrn,
        to: &PartyUrn,
        resource: &EntityId,
        keys: &RightsSet,
    ) -> ClientResult<Vec<FailedRight>>;

    /// Whether `to` currently holds the access package.
    async fn has_package(&self, to: &PartyUrn, package: &EntityId) -> ClientResult<bool>;

    /// Assigns an access package to `to`.
    async fn grant_package(&self, to: &PartyUrn, package: &EntityId) -> ClientResult<()>;

    /// Removes an access package from `to`.
    async fn revoke_package(&self, to: &PartyUrn, package: &EntityId) -> ClientResult<()>;
}
