//! Party identity error types.

use thiserror::Error;

/// Errors raised while resolving or parsing party identities.
///
/// These are local validation failures and never reach the network.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PartyError {
    /// The party id or party type is not usable for building a URN.
    #[error("Invalid party: {reason}")]
    InvalidParty {
        /// Description of why the party is invalid
        reason: String,
    },

    /// A URN string does not match any recognized party scheme.
    #[error("Malformed party URN: {urn}")]
    MalformedUrn {
        /// The URN that could not be parsed
        urn: String,
    },
}

impl PartyError {
    /// Check if this error indicates an invalid party id or type.
    pub fn is_invalid_party(&self) -> bool {
        matches!(self, PartyError::InvalidParty { .. })
    }

    /// Check if this error indicates an unparseable URN.
    pub fn is_malformed_urn(&self) -> bool {
        matches!(self, PartyError::MalformedUrn { .. })
    }
}

impl From<PartyError> for crate::Error {
    fn from(err: PartyError) -> Self {
        crate::Error::Party(err)
    }
}
