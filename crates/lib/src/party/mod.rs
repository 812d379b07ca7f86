//! Party identities and URN resolution
//!
//! The authorization backend addresses every party (the acting user, the party
//! rights are delegated from and the party they are delegated to) by a URN of
//! the form `urn:altinn:<scheme>:uuid:<id>`. This module maps a party id and
//! its [`PartyType`] to that canonical string and back.
//!
//! Resolution is pure and performs no I/O.
//!
//! # Examples
//! ```
//! use delegation_ledger::party::{PartyType, resolve_urn};
//!
//! let urn = resolve_urn("123", PartyType::Organization).unwrap();
//! assert_eq!(urn.as_str(), "urn:altinn:organization:uuid:123");
//!
//! assert!(resolve_urn("", PartyType::Organization).is_err());
//! ```

pub mod errors;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use errors::PartyError;

use crate::constants::{ENTERPRISE_USER_URN_PREFIX, ORGANIZATION_URN_PREFIX, PERSON_URN_PREFIX};

/// The kind of party a delegation is made from or to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PartyType {
    /// A natural person.
    Person,
    /// An organization.
    Organization,
    /// A self-identified user acting for an enterprise.
    #[serde(alias = "self-identified")]
    EnterpriseUser,
}

impl PartyType {
    /// URN prefix used by the authorization backend for this party type.
    pub fn urn_prefix(self) -> &'static str {
        match self {
            PartyType::Person => PERSON_URN_PREFIX,
            PartyType::Organization => ORGANIZATION_URN_PREFIX,
            PartyType::EnterpriseUser => ENTERPRISE_USER_URN_PREFIX,
        }
    }

    fn all() -> [PartyType; 3] {
        [
            PartyType::Person,
            PartyType::Organization,
            PartyType::EnterpriseUser,
        ]
    }
}

impl fmt::Display for PartyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PartyType::Person => "person",
            PartyType::Organization => "organization",
            PartyType::EnterpriseUser => "enterprise-user",
        };
        f.write_str(name)
    }
}

impl FromStr for PartyType {
    type Err = PartyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "person" => Ok(PartyType::Person),
            "organization" | "organisation" => Ok(PartyType::Organization),
            "enterprise-user" | "enterpriseuser" | "self-identified" | "selfidentified" => {
                Ok(PartyType::EnterpriseUser)
            }
            other => Err(PartyError::InvalidParty {
                reason: format!("unrecognized party type '{other}'"),
            }),
        }
    }
}

/// A validated party URN.
///
/// Only constructed through [`resolve_urn`] or [`parse_urn`], so holding a
/// `PartyUrn` means the string is well formed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PartyUrn {
    urn: String,
    party_type: PartyType,
}

impl PartyUrn {
    /// The URN string as sent to the backend.
    pub fn as_str(&self) -> &str {
        &self.urn
    }

    /// The party type encoded in the URN.
    pub fn party_type(&self) -> PartyType {
        self.party_type
    }

    /// The party id part of the URN.
    pub fn party_id(&self) -> &str {
        &self.urn[self.party_type.urn_prefix().len()..]
    }
}

impl fmt::Display for PartyUrn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.urn)
    }
}

impl TryFrom<String> for PartyUrn {
    type Error = PartyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        parse_urn(&value)
    }
}

impl From<PartyUrn> for String {
    fn from(urn: PartyUrn) -> Self {
        urn.urn
    }
}

impl FromStr for PartyUrn {
    type Err = PartyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_urn(s)
    }
}

/// Resolve a party id and type to the canonical backend URN.
///
/// Fails with [`PartyError::InvalidParty`] if the id is empty, blank, or
/// contains characters that would make the URN ambiguous (whitespace or `:`).
pub fn resolve_urn(party_id: &str, party_type: PartyType) -> Result<PartyUrn, PartyError> {
    validate_party_id(party_id)?;
    Ok(PartyUrn {
        urn: format!("{}{party_id}", party_type.urn_prefix()),
        party_type,
    })
}

/// Parse a URN produced by [`resolve_urn`] back into a [`PartyUrn`].
pub fn parse_urn(urn: &str) -> Result<PartyUrn, PartyError> {
    let malformed = || PartyError::MalformedUrn {
        urn: urn.to_string(),
    };

    let party_type = PartyType::all()
        .into_iter()
        .find(|t| urn.starts_with(t.urn_prefix()))
        .ok_or_else(malformed)?;

    let id = &urn[party_type.urn_prefix().len()..];
    validate_party_id(id).map_err(|_| malformed())?;

    Ok(PartyUrn {
        urn: urn.to_string(),
        party_type,
    })
}

fn validate_party_id(party_id: &str) -> Result<(), PartyError> {
    if party_id.trim().is_empty() {
        return Err(PartyError::InvalidParty {
            reason: "party id is empty".to_string(),
        });
    }
    if party_id.chars().any(|c| c.is_whitespace() || c == ':') {
        return Err(PartyError::InvalidParty {
            reason: format!("party id '{party_id}' contains whitespace or ':'"),
        });
    }
    Ok(())
}
