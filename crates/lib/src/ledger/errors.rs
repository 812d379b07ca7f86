//! Staging ledger error types.
//!
//! Every variant is a local precondition failure. They point at a host whose
//! view of the ledger has drifted and should never be swallowed.

use thiserror::Error;

use crate::entity::{ActionKey, DelegationStatus, EntityId};

/// Errors that can occur while mutating a [`StagingLedger`](super::StagingLedger).
///
/// # Stability
///
/// - New variants may be added in minor versions (enum is `#[non_exhaustive]`)
/// - Helper methods like `is_*()` provide stable APIs
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// No entity with this id is tracked.
    #[error("Entity not found: {id}")]
    EntityNotFound {
        /// The id that was looked up
        id: EntityId,
    },

    /// The entity is not in the status the operation starts from.
    #[error("Entity {id} is {actual}, expected {expected}")]
    NotAvailable {
        /// The entity that was targeted
        id: EntityId,
        /// Status the operation requires
        expected: DelegationStatus,
        /// Status the entity is actually in
        actual: DelegationStatus,
    },

    /// An entity with this id is already tracked.
    #[error("Entity already tracked: {id}")]
    DuplicateEntity {
        /// The duplicated id
        id: EntityId,
    },

    /// Entities can only enter the ledger in a settled status.
    #[error("Entity {id} cannot be tracked as {status}")]
    InvalidBaseline {
        /// The entity being inserted
        id: EntityId,
        /// The staged status it was offered in
        status: DelegationStatus,
    },

    /// A requested action key is not permitted for the entity.
    #[error("Action {key} is not permitted on {id}")]
    UnknownActionKey {
        /// The entity being edited
        id: EntityId,
        /// The offending key
        key: ActionKey,
    },
}

impl LedgerError {
    /// Check if this error indicates the entity is unknown.
    pub fn is_not_found(&self) -> bool {
        matches!(self, LedgerError::EntityNotFound { .. })
    }

    /// Check if this error indicates the entity was in the wrong status.
    pub fn is_not_available(&self) -> bool {
        matches!(self, LedgerError::NotAvailable { .. })
    }

    /// Check if this error indicates an id collision.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, LedgerError::DuplicateEntity { .. })
    }

    /// The entity id the error is about.
    pub fn entity_id(&self) -> &EntityId {
        match self {
            LedgerError::EntityNotFound { id }
            | LedgerError::NotAvailable { id, .. }
            | LedgerError::DuplicateEntity { id }
            | LedgerError::InvalidBaseline { id, .. }
            | LedgerError::UnknownActionKey { id, .. } => id,
        }
    }
}

impl From<LedgerError> for crate::Error {
    fn from(err: LedgerError) -> Self {
        crate::Error::Ledger(err)
    }
}
