//! Scenario files: a delegation flow described as JSON.
//!
//! A scenario names the parties, the entities on screen with their current
//! status, and the staging operations the user performed:
//!
//! ```json
//! {
//!   "parties": {
//!     "acting": { "id": "u-1", "type": "person" },
//!     "from": { "id": "org-310", "type": "organization" },
//!     "to": { "id": "p-42", "type": "person" }
//!   },
//!   "entities": [
//!     { "id": "api-1", "displayName": "Tax API", "kind": "api", "status": "available" },
//!     { "id": "r-1", "displayName": "Sign", "kind": "single-right",
//!       "actionKeys": ["read", "sign"], "status": "delegated", "baseline": ["read"] }
//!   ],
//!   "operations": [
//!     { "op": "stage-add", "id": "api-1" },
//!     { "op": "edit", "id": "r-1", "keys": ["read", "sign"] }
//!   ]
//! }
//! ```

use std::path::Path;

use delegation_ledger::{
    AuthorizationClient, DelegationSession,
    entity::{ActionKey, DelegationStatus, Entity, EntityId},
    party::{PartyError, PartyType, PartyUrn, resolve_urn},
    session::Parties,
};
use serde::Deserialize;

/// One party, by id and type.
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioParty {
    pub id: String,
    #[serde(rename = "type")]
    pub party_type: PartyType,
}

impl ScenarioParty {
    fn resolve(&self) -> Result<PartyUrn, PartyError> {
        resolve_urn(&self.id, self.party_type)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScenarioParties {
    pub acting: Option<ScenarioParty>,
    pub from: Option<ScenarioParty>,
    pub to: Option<ScenarioParty>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioEntity {
    #[serde(flatten)]
    pub entity: Entity,
    #[serde(default = "default_status")]
    pub status: DelegationStatus,
    /// Action keys the backend currently holds, when known more precisely
    /// than `status` says.
    #[serde(default)]
    pub baseline: Option<Vec<ActionKey>>,
}

fn default_status() -> DelegationStatus {
    DelegationStatus::Available
}

/// A staging operation, replayed in order.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum StagingOp {
    StageAdd { id: EntityId },
    StageRemove { id: EntityId },
    Undo { id: EntityId },
    Edit { id: EntityId, keys: Vec<ActionKey> },
    Reset,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    #[serde(default)]
    pub parties: ScenarioParties,
    #[serde(default)]
    pub entities: Vec<ScenarioEntity>,
    #[serde(default)]
    pub operations: Vec<StagingOp>,
    /// Query the backend for the current rights of entities without a
    /// `baseline`, instead of trusting their `status`.
    #[serde(default)]
    pub load_baseline: bool,
}

impl Scenario {
    /// Reads a scenario from a JSON file.
    pub async fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read scenario {}: {e}", path.display()))?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Builds the session with parties and entities, before any staging.
    pub fn build_session(&self) -> Result<DelegationSession, Box<dyn std::error::Error>> {
        let resolve = |party: &Option<ScenarioParty>| party.as_ref().map(ScenarioParty::resolve).transpose();
        let parties = Parties {
            acting: resolve(&self.parties.acting)?,
            from: resolve(&self.parties.from)?,
            to: resolve(&self.parties.to)?,
        };

        let mut session = DelegationSession::new(parties);
        for item in &self.entities {
            session.add_entity(item.entity.clone(), item.status)?;
            if let Some(baseline) = &item.baseline {
                session.set_baseline(&item.entity.id, baseline.iter().cloned())?;
            }
        }
        if !self.load_baseline {
            session.mark_baseline_known();
        }
        Ok(session)
    }

    /// Builds the session, loads its baseline if asked to, and replays the
    /// staging operations.
    pub async fn prepare(
        &self,
        client: Option<&dyn AuthorizationClient>,
    ) -> Result<DelegationSession, Box<dyn std::error::Error>> {
        let mut session = self.build_session()?;
        if self.load_baseline {
            let client = client.ok_or("Scenario requests a baseline load but no backend is available")?;
            session.load_missing_baseline(client).await?;
        }
        self.replay(&mut session)?;
        Ok(session)
    }

    fn replay(&self, session: &mut DelegationSession) -> Result<(), Box<dyn std::error::Error>> {
        for op in &self.operations {
            tracing::debug!(?op, "replaying staging operation");
            match op {
                StagingOp::StageAdd { id } => session.stage_add(id)?,
                StagingOp::StageRemove { id } => session.stage_remove(id)?,
                StagingOp::Undo { id } => {
                    if !session.undo_stage(id) {
                        tracing::warn!(%id, "undo had nothing to revert");
                    }
                }
                StagingOp::Edit { id, keys } => session.edit_rights(id, keys.iter().cloned())?,
                StagingOp::Reset => session.reset(),
            }
        }
        Ok(())
    }
}
