//! Authorization error classification
//!
//! The backend reports semantic failures as free-form code strings. This
//! module maps them onto a closed [`ErrorCode`] enum and orders them by how
//! actionable they are, so a host showing a single message for a failed batch
//! shows the most useful one.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Backend-reported reasons a grant or revoke was refused.
///
/// Variants are declared in priority order: earlier variants are more
/// actionable and are surfaced first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// The recipient lacks a role required for the right.
    MissingRoleAccess,
    /// The acting party is not allowed to delegate the right.
    MissingDelegationAccess,
    /// The right is not registered for delegation by the service owner.
    MissingSrrRightAccess,
    /// Anything not recognized, including transport failures.
    Unknown,
}

impl ErrorCode {
    /// Lower values are more actionable.
    pub fn priority(self) -> u8 {
        match self {
            ErrorCode::MissingRoleAccess => 0,
            ErrorCode::MissingDelegationAccess => 1,
            ErrorCode::MissingSrrRightAccess => 2,
            ErrorCode::Unknown => 3,
        }
    }

    /// The canonical backend spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::MissingRoleAccess => "MissingRoleAccess",
            ErrorCode::MissingDelegationAccess => "MissingDelegationAccess",
            ErrorCode::MissingSrrRightAccess => "MissingSrrRightAccess",
            ErrorCode::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps a raw backend code to an [`ErrorCode`].
///
/// Matching ignores ASCII case and surrounding whitespace. Unrecognized codes
/// become [`ErrorCode::Unknown`]; this never fails.
pub fn classify(code: &str) -> ErrorCode {
    let code = code.trim();
    [
        ErrorCode::MissingRoleAccess,
        ErrorCode::MissingDelegationAccess,
        ErrorCode::MissingSrrRightAccess,
    ]
    .into_iter()
    .find(|known| known.as_str().eq_ignore_ascii_case(code))
    .unwrap_or(ErrorCode::Unknown)
}

/// Sorts codes from most to least actionable.
///
/// The sort is stable: codes of equal priority keep their input order.
///
/// # Examples
/// ```
/// use delegation_ledger::classify::{ErrorCode, prioritize};
///
/// let sorted = prioritize(&[ErrorCode::Unknown, ErrorCode::MissingRoleAccess, ErrorCode::Unknown]);
/// assert_eq!(
///     sorted,
///     vec![ErrorCode::MissingRoleAccess, ErrorCode::Unknown, ErrorCode::Unknown]
/// );
/// ```
pub fn prioritize(codes: &[ErrorCode]) -> Vec<ErrorCode> {
    let mut sorted = codes.to_vec();
    sorted.sort_by_key(|code| code.priority());
    sorted
}

/// The single most actionable code, if any.
pub fn headline(codes: &[ErrorCode]) -> Option<ErrorCode> {
    codes.iter().copied().min_by_key(|code| code.priority())
}
