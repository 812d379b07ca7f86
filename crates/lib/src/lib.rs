//! Delegation ledger: staging and reconciliation of access delegations.
//!
//! A host application (typically an administration UI) tracks which
//! organizations, APIs, access packages and single rights a user is about to
//! delegate or revoke, then submits those changes to an authorization backend.
//! This crate holds that state and performs the submission.
//!
//! ## Core Concepts
//!
//! * **Parties (`party::PartyUrn`)**: The acting user, the party rights are delegated from and the recipient, addressed by backend URNs.
//! * **Entities (`entity::Entity`)**: The delegable units, each with a lifecycle `entity::DelegationStatus`.
//! * **Staging Ledger (`ledger::StagingLedger`)**: Id-indexed, synchronous soft-add/soft-remove state for one flow.
//! * **Sessions (`session::DelegationSession`)**: One flow's ledger plus the last known and desired rights per resource.
//! * **Reconciliation (`reconcile::Reconciler`)**: Diffs desired against last known rights and drives grant/revoke calls through an `client::AuthorizationClient`.
//! * **Error Classification (`classify`)**: Maps backend error codes to a prioritized enum so a failed batch has one headline error.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use delegation_ledger::client::InMemoryClient;
//! use delegation_ledger::entity::{DelegationStatus, Entity, EntityKind};
//! use delegation_ledger::party::{PartyType, resolve_urn};
//! use delegation_ledger::reconcile::reconcile;
//! use delegation_ledger::session::{DelegationSession, Parties};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> delegation_ledger::Result<()> {
//! let parties = Parties::new(
//!     resolve_urn("1", PartyType::Person)?,
//!     resolve_urn("2", PartyType::Organization)?,
//!     resolve_urn("3", PartyType::Person)?,
//! );
//! let mut session = DelegationSession::new(parties)
//!     .with_entity(Entity::new("api-1", "Payroll API", EntityKind::Api), DelegationStatus::Available)?;
//! session.stage_add(&"api-1".into())?;
//!
//! let client = Arc::new(InMemoryClient::new());
//! let result = reconcile(&mut session, client, None).await?;
//! assert!(result.report().unwrap().is_complete_success());
//! assert_eq!(session.ledger().status(&"api-1".into()), Some(DelegationStatus::Delegated));
//! # Ok(())
//! # }
//! ```

pub mod classify;
pub mod client;
pub mod constants;
pub mod entity;
pub mod ledger;
pub mod party;
pub mod reconcile;
pub mod rights;
pub mod session;

pub use classify::{ErrorCode, classify, prioritize};
pub use client::{AuthorizationClient, InMemoryClient};
pub use ledger::StagingLedger;
pub use party::resolve_urn;
pub use reconcile::{ReconciliationResult, Reconciler, reconcile};
pub use session::DelegationSession;

/// Result type used throughout the delegation ledger.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the delegation ledger.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Structured party identity errors from the party module
    #[error(transparent)]
    Party(party::PartyError),

    /// Structured staging errors from the ledger module
    #[error(transparent)]
    Ledger(ledger::LedgerError),

    /// Structured backend client errors from the client module
    #[error(transparent)]
    Client(client::ClientError),

    /// Structured reconciliation errors from the reconcile module
    #[error(transparent)]
    Reconcile(reconcile::ReconcileError),
}

impl Error {
    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Party(_) => "party",
            Error::Ledger(_) => "ledger",
            Error::Client(_) => "client",
            Error::Reconcile(_) => "reconcile",
        }
    }

    /// Check if this error indicates a resource or entity was not found.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Ledger(ledger_err) => ledger_err.is_not_found(),
            Error::Client(client_err) => client_err.is_not_found(),
            _ => false,
        }
    }

    /// Check if this error is a local precondition failure in the host's state
    /// handling rather than a backend problem.
    pub fn is_precondition_failure(&self) -> bool {
        match self {
            Error::Party(_) | Error::Ledger(_) => true,
            Error::Reconcile(reconcile_err) => reconcile_err.is_missing_party(),
            Error::Client(_) => false,
        }
    }

    /// Check if retrying the failed operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Client(client_err) => client_err.is_network(),
            Error::Reconcile(reconcile_err) => reconcile_err.is_retryable(),
            _ => false,
        }
    }

    /// Check if this error came from cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Reconcile(reconcile_err) if reconcile_err.is_cancelled())
    }
}
