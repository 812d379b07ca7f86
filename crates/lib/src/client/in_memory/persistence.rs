//! Persistence operations for the in-memory backend
//!
//! Serializes delegated rights and packages to a versioned JSON file.

use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use tokio::sync::RwLock;

use super::InMemoryClient;
use crate::client::{ClientError, ClientResult};
use crate::entity::EntityId;
use crate::party::PartyUrn;
use crate::rights::RightsSet;

/// The current persistence file format version.
/// v0 indicates this is an unstable format subject to breaking changes.
const PERSISTENCE_VERSION: u8 = 0;

fn is_v0(v: &u8) -> bool {
    *v == 0
}

fn validate_persistence_version<'de, D>(deserializer: D) -> std::result::Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let version = u8::deserialize(deserializer)?;
    if version != PERSISTENCE_VERSION {
        return Err(serde::de::Error::custom(format!(
            "unsupported persistence version {version}; only version {PERSISTENCE_VERSION} is supported"
        )));
    }
    Ok(version)
}

#[derive(Serialize, Deserialize)]
struct RightsRecord {
    from: PartyUrn,
    to: PartyUrn,
    resource: EntityId,
    keys: RightsSet,
}

#[derive(Serialize, Deserialize)]
struct PackageRecord {
    to: PartyUrn,
    package: EntityId,
}

/// Serializable form of the backend state
#[derive(Serialize, Deserialize)]
struct SerializableBackend {
    #[serde(
        rename = "_v",
        default,
        skip_serializing_if = "is_v0",
        deserialize_with = "validate_persistence_version"
    )]
    version: u8,
    #[serde(default)]
    rights: Vec<RightsRecord>,
    #[serde(default)]
    packages: Vec<PackageRecord>,
}

pub(super) async fn save_to_file<P: AsRef<Path>>(
    backend: &InMemoryClient,
    path: P,
) -> ClientResult<()> {
    let rights = backend
        .rights
        .read()
        .await
        .iter()
        .map(|((from, to, resource), keys)| RightsRecord {
            from: from.clone(),
            to: to.clone(),
            resource: resource.clone(),
            keys: keys.clone(),
        })
        .collect();
    let packages = backend
        .packages
        .read()
        .await
        .iter()
        .map(|(to, package)| PackageRecord {
            to: to.clone(),
            package: package.clone(),
        })
        .collect();

    let serializable = SerializableBackend {
        version: PERSISTENCE_VERSION,
        rights,
        packages,
    };

    let json = serde_json::to_string_pretty(&serializable)
        .map_err(|source| ClientError::Serialization { source })?;
    tokio::fs::write(path, json)
        .await
        .map_err(|source| ClientError::FileIo { source })
}

pub(super) async fn load_from_file<P: AsRef<Path>>(path: P) -> ClientResult<InMemoryClient> {
    match tokio::fs::read_to_string(path).await {
        Ok(json) => {
            let serializable: SerializableBackend = serde_json::from_str(&json)
                .map_err(|source| ClientError::Serialization { source })?;

            let rights = serializable
                .rights
                .into_iter()
                .filter(|record| !record.keys.is_empty())
                .map(|record| ((record.from, record.to, record.resource), record.keys))
                .collect();
            let packages = serializable
                .packages
                .into_iter()
                .map(|record| (record.to, record.package))
                .collect();

            Ok(InMemoryClient {
                rights: RwLock::new(rights),
                packages: RwLock::new(packages),
                ..InMemoryClient::default()
            })
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(InMemoryClient::new()),
        Err(source) => Err(ClientError::FileIo { source }),
    }
}
