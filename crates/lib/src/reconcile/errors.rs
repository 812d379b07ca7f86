//! Reconciliation error types.
//!
//! These abort a whole [`reconcile`](super::Reconciler::reconcile) call.
//! Per-entity backend failures are reported as data in the
//! [`ReconciliationReport`](super::ReconciliationReport) instead.

use thiserror::Error;

use crate::client::ClientError;
use crate::entity::EntityId;
use crate::ledger::LedgerError;
use crate::session::PartyRole;

/// Errors that abort a reconciliation before any entity outcome is recorded.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A party required for backend calls is not known.
    #[error("Missing {role} party")]
    MissingParty {
        /// Which party is missing
        role: PartyRole,
    },

    /// The baseline query failed, so no diff can be computed.
    #[error("Failed to query current rights for {resource}")]
    BaselineQueryFailed {
        /// The resource whose query failed
        resource: EntityId,
        /// The underlying client error
        source: ClientError,
    },

    /// The cancellation token fired. The session was left untouched.
    #[error("Reconciliation cancelled")]
    Cancelled,

    /// The session's ledger rejected an update.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl ReconcileError {
    /// Check if this error indicates a missing party.
    pub fn is_missing_party(&self) -> bool {
        matches!(self, ReconcileError::MissingParty { .. })
    }

    /// Check if this error came from cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ReconcileError::Cancelled)
    }

    /// Check if retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ReconcileError::BaselineQueryFailed { source, .. } if source.is_network()
        )
    }
}

impl From<ReconcileError> for crate::Error {
    fn from(err: ReconcileError) -> Self {
        crate::Error::Reconcile(err)
    }
}
