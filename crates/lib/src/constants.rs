//! Constants used throughout the delegation ledger.
//!
//! Central definitions for URN prefixes understood by the authorization
//! backend and other reserved values.

/// URN prefix for natural persons.
pub const PERSON_URN_PREFIX: &str = "urn:altinn:person:uuid:";

/// URN prefix for organizations.
pub const ORGANIZATION_URN_PREFIX: &str = "urn:altinn:organization:uuid:";

/// URN prefix for self-identified (enterprise) users.
pub const ENTERPRISE_USER_URN_PREFIX: &str = "urn:altinn:enterpriseuser:uuid:";

/// Action key standing for the whole resource.
///
/// Entities without fine-grained actions (organizations, APIs, access packages)
/// are delegated as a unit and carry this single key in rights sets.
pub const WILDCARD_ACTION_KEY: &str = "*";

/// Upper bound on resources reconciled concurrently unless configured otherwise.
pub const DEFAULT_MAX_CONCURRENT_RESOURCES: usize = 8;
