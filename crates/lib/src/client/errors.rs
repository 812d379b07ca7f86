//! Authorization client error types.

use thiserror::Error;

use crate::entity::EntityId;

/// Errors an [`AuthorizationClient`](super::AuthorizationClient) can return for a whole call.
///
/// Per-key refusals from `grant_rights`/`revoke_rights` are not errors; they
/// are returned as [`FailedRight`](super::FailedRight) data.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ClientError {
    /// The backend has no delegation record for the resource.
    #[error("No delegation found for resource {resource}")]
    NotFound {
        /// The resource that was queried
        resource: EntityId,
    },

    /// Transport-level failure talking to the backend.
    #[error("Network error: {reason}")]
    Network {
        /// Description of the failure
        reason: String,
    },

    /// The backend refused a whole-entity operation with a semantic code.
    #[error("Backend rejected operation on {resource}: {code}")]
    Rejected {
        /// The resource the operation targeted
        resource: EntityId,
        /// The raw backend error code
        code: String,
    },

    /// Reading or writing persisted backend state failed.
    #[error("File I/O error")]
    FileIo {
        #[source]
        source: std::io::Error,
    },

    /// Persisted backend state could not be encoded or decoded.
    #[error("Serialization failed")]
    Serialization {
        #[source]
        source: serde_json::Error,
    },
}

impl ClientError {
    /// Check if this error indicates a missing record.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound { .. })
    }

    /// Check if this error is a transient transport failure.
    pub fn is_network(&self) -> bool {
        matches!(self, ClientError::Network { .. })
    }

    /// The raw backend code carried by a rejection.
    pub fn rejection_code(&self) -> Option<&str> {
        match self {
            ClientError::Rejected { code, .. } => Some(code),
            _ => None,
        }
    }
}

impl From<ClientError> for crate::Error {
    fn from(err: ClientError) -> Self {
        crate::Error::Client(err)
    }
}
