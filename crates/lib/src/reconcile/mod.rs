//! Reconciliation engine
//!
//! Reconciliation turns the staged state of a [`DelegationSession`] into
//! backend calls. For every resource whose desired rights differ from the last
//! known ones it computes the minimal [`RightsDelta`] and applies it through an
//! [`AuthorizationClient`]:
//!
//! - Resources are independent and are processed concurrently, bounded by
//!   [`ReconcileConfig::max_concurrent_resources`].
//! - Within one resource the revoke is always issued and awaited before the
//!   grant. If the revoke fails the grant is skipped. If the grant fails after
//!   a successful revoke, the revoke stands and the session is flagged with
//!   [`needs_refresh`](DelegationSession::needs_refresh).
//! - Every entity gets its own outcome. A failure on one entity never stops
//!   the others.
//! - All calls are joined before the result is returned.
//!
//! Successful entities move from `StagedForAdd` to `Delegated` or from
//! `StagedForRemove` to `Revoked`. Failed entities stay staged. A staged
//! entity whose desired rights the backend already holds is settled the same
//! way without any call, and is reported as succeeded with an empty delta.

pub mod errors;
pub mod report;

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

pub use errors::ReconcileError;
pub use report::{
    ChangeKind, EntityOutcome, KeyFailure, Outcome, ReconciliationReport, ReconciliationResult,
};

use crate::classify::{ErrorCode, classify, headline};
use crate::client::{AuthorizationClient, ClientError, FailedRight};
use crate::constants::DEFAULT_MAX_CONCURRENT_RESOURCES;
use crate::entity::{EntityId, EntityKind};
use crate::rights::{RightsDelta, RightsSet};
use crate::session::{DelegationSession, ResolvedParties};

/// Tuning for the reconciliation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileConfig {
    /// Maximum number of resources with backend calls in flight at once.
    pub max_concurrent_resources: usize,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            max_concurrent_resources: DEFAULT_MAX_CONCURRENT_RESOURCES,
        }
    }
}

impl ReconcileConfig {
    pub fn with_max_concurrent_resources(mut self, max: usize) -> Self {
        self.max_concurrent_resources = max;
        self
    }
}

/// Applies staged session state to the authorization backend.
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    config: ReconcileConfig,
}

/// The work for one resource, detached from the session so it can be spawned.
#[derive(Debug, Clone)]
struct ResourceTask {
    id: EntityId,
    kind: EntityKind,
    change: ChangeKind,
    delta: RightsDelta,
}

/// What the backend actually did for one resource.
#[derive(Debug, Default)]
struct Execution {
    revoked: RightsSet,
    granted: RightsSet,
    failures: Vec<KeyFailure>,
}

impl Reconciler {
    pub fn new(config: ReconcileConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// Reconciles `session` against the backend behind `client`.
    ///
    /// Fails without touching the backend if a party is missing or `cancel`
    /// has already fired. Resources whose baseline was never loaded or set are
    /// queried first, and a failing query aborts the call.
    ///
    /// If `cancel` fires while calls are in flight, they are allowed to finish
    /// but their results are discarded: the session is not updated and
    /// [`ReconcileError::Cancelled`] is returned.
    pub async fn reconcile(
        &self,
        session: &mut DelegationSession,
        client: Arc<dyn AuthorizationClient>,
        cancel: Option<&CancellationToken>,
    ) -> Result<ReconciliationResult, ReconcileError> {
        let parties = session.parties().require()?;
        let span = tracing::info_span!(
            "reconcile",
            acting = %parties.acting,
            from = %parties.from,
            to = %parties.to,
        );
        self.reconcile_inner(session, client, parties, cancel)
            .instrument(span)
            .await
    }

    async fn reconcile_inner(
        &self,
        session: &mut DelegationSession,
        client: Arc<dyn AuthorizationClient>,
        parties: ResolvedParties,
        cancel: Option<&CancellationToken>,
    ) -> Result<ReconciliationResult, ReconcileError> {
        if is_cancelled(cancel) {
            return Err(ReconcileError::Cancelled);
        }

        session.load_missing_baseline(client.as_ref()).await?;

        let tasks = plan_tasks(session);
        let unchanged: Vec<EntityId> = session
            .ledger()
            .staged_ids()
            .into_iter()
            .filter(|id| !tasks.iter().any(|task| &task.id == id))
            .collect();
        if tasks.is_empty() && unchanged.is_empty() {
            tracing::info!("no changes to reconcile");
            return Ok(ReconciliationResult::NoChange);
        }
        tracing::debug!(
            resources = tasks.len(),
            unchanged = unchanged.len(),
            "reconciliation planned"
        );

        let executions = self
            .execute(&tasks, client, Arc::new(parties), cancel)
            .await;

        if is_cancelled(cancel) {
            tracing::info!("reconciliation cancelled, discarding results");
            return Err(ReconcileError::Cancelled);
        }

        let mut outcomes = tasks
            .into_iter()
            .zip(executions)
            .map(|(task, execution)| apply_execution(session, task, execution))
            .collect::<Vec<_>>();
        outcomes.extend(unchanged.into_iter().map(|id| settle_unchanged(session, id)));
        outcomes.sort_by(|a, b| a.id.cmp(&b.id));
        let report = ReconciliationReport::new(outcomes);

        tracing::info!(
            succeeded = report.succeeded().len(),
            failed = report.failed().len(),
            "reconciliation finished"
        );
        Ok(ReconciliationResult::Applied(report))
    }

    /// Runs all resource tasks and returns their executions in task order.
    async fn execute(
        &self,
        tasks: &[ResourceTask],
        client: Arc<dyn AuthorizationClient>,
        parties: Arc<ResolvedParties>,
        cancel: Option<&CancellationToken>,
    ) -> Vec<Execution> {
        let permits = Arc::new(Semaphore::new(self.config.max_concurrent_resources.max(1)));
        let mut set = JoinSet::new();

        for (index, task) in tasks.iter().enumerate() {
            let task = task.clone();
            let client = Arc::clone(&client);
            let parties = Arc::clone(&parties);
            let permits = Arc::clone(&permits);
            let cancel = cancel.cloned();
            set.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                if is_cancelled(cancel.as_ref()) {
                    return (index, None);
                }
                let execution = execute_resource(client.as_ref(), &parties, &task).await;
                (index, Some(execution))
            });
        }

        let mut executions: Vec<Option<Execution>> = tasks.iter().map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, execution)) => executions[index] = execution,
                Err(e) => tracing::error!("reconciliation task failed: {e}"),
            }
        }

        executions
            .into_iter()
            .map(|execution| {
                execution.unwrap_or_else(|| Execution {
                    failures: vec![KeyFailure {
                        key: None,
                        code: ErrorCode::Unknown,
                        detail: "backend calls were not completed".to_string(),
                    }],
                    ..Execution::default()
                })
            })
            .collect()
    }
}

/// Reconciles with the default configuration.
///
/// See [`Reconciler::reconcile`].
pub async fn reconcile(
    session: &mut DelegationSession,
    client: Arc<dyn AuthorizationClient>,
    cancel: Option<&CancellationToken>,
) -> Result<ReconciliationResult, ReconcileError> {
    Reconciler::default().reconcile(session, client, cancel).await
}

fn is_cancelled(cancel: Option<&CancellationToken>) -> bool {
    cancel.is_some_and(CancellationToken::is_cancelled)
}

fn plan_tasks(session: &DelegationSession) -> Vec<ResourceTask> {
    session
        .plan()
        .into_iter()
        .map(|(id, delta)| {
            let ledger = session.ledger();
            let kind = ledger
                .entity(&id)
                .map_or(EntityKind::SingleRight, |entity| entity.kind);
            let change = ChangeKind::for_status(ledger.status(&id));
            ResourceTask {
                id,
                kind,
                change,
                delta,
            }
        })
        .collect()
}

/// Issues the revoke and then the grant for one resource.
async fn execute_resource(
    client: &dyn AuthorizationClient,
    parties: &ResolvedParties,
    task: &ResourceTask,
) -> Execution {
    let mut execution = Execution::default();
    let id = &task.id;

    if !task.delta.to_revoke.is_empty() {
        tracing::trace!(resource = %id, keys = ?task.delta.to_revoke, "revoking");
        let result = if task.kind == EntityKind::AccessPackage {
            client
                .revoke_package(&parties.to, id)
                .await
                .map(|()| Vec::new())
        } else {
            client
                .revoke_rights(&parties.from, &parties.to, id, &task.delta.to_revoke)
                .await
        };
        execution.revoked = record_result(&mut execution.failures, &task.delta.to_revoke, result);

        if !execution.failures.is_empty() {
            tracing::warn!(resource = %id, "revoke failed, skipping grant");
            return execution;
        }
    }

    if !task.delta.to_grant.is_empty() {
        tracing::trace!(resource = %id, keys = ?task.delta.to_grant, "granting");
        let result = if task.kind == EntityKind::AccessPackage {
            client
                .grant_package(&parties.to, id)
                .await
                .map(|()| Vec::new())
        } else {
            client
                .grant_rights(&parties.from, &parties.to, id, &task.delta.to_grant)
                .await
        };
        execution.granted = record_result(&mut execution.failures, &task.delta.to_grant, result);
    }

    execution
}

/// Records failures of one call and returns the keys that went through.
fn record_result(
    failures: &mut Vec<KeyFailure>,
    keys: &RightsSet,
    result: Result<Vec<FailedRight>, ClientError>,
) -> RightsSet {
    match result {
        Ok(failed) => {
            let applied: RightsSet = keys
                .iter()
                .filter(|key| !failed.iter().any(|f| &f.key == *key))
                .cloned()
                .collect();
            failures.extend(failed.into_iter().map(|f| KeyFailure {
                code: classify(&f.code),
                detail: f.code,
                key: Some(f.key),
            }));
            applied
        }
        Err(e) => {
            let code = e.rejection_code().map_or(ErrorCode::Unknown, classify);
            failures.push(KeyFailure {
                key: None,
                code,
                detail: e.to_string(),
            });
            RightsSet::new()
        }
    }
}

/// Settles a staged entity whose desired rights are already held.
fn settle_unchanged(session: &mut DelegationSession, id: EntityId) -> EntityOutcome {
    let ledger = session.ledger();
    let kind = ledger
        .entity(&id)
        .map_or(EntityKind::SingleRight, |entity| entity.kind);
    let change = ChangeKind::for_status(ledger.status(&id));
    let desired = session.desired_rights(&id);

    tracing::debug!(resource = %id, "already in desired state, settling without calls");
    let status = session.confirm(&id, desired);

    EntityOutcome {
        id,
        kind,
        change,
        delta: RightsDelta::default(),
        outcome: Outcome::Succeeded,
        failures: Vec::new(),
        status,
    }
}

/// Folds one resource's execution back into the session.
fn apply_execution(
    session: &mut DelegationSession,
    task: ResourceTask,
    execution: Execution,
) -> EntityOutcome {
    let reached: RightsSet = session
        .last_known_rights(&task.id)
        .into_iter()
        .filter(|key| !execution.revoked.contains(key))
        .chain(execution.granted.iter().cloned())
        .collect();

    let codes: Vec<ErrorCode> = execution.failures.iter().map(|f| f.code).collect();
    let (outcome, status) = match headline(&codes) {
        None => {
            let status = session.confirm(&task.id, reached);
            (Outcome::Succeeded, status)
        }
        Some(code) => {
            tracing::warn!(resource = %task.id, %code, "delegation change failed");
            session.record_partial(&task.id, reached);
            (Outcome::Failed(code), session.ledger().status(&task.id))
        }
    };

    EntityOutcome {
        id: task.id,
        kind: task.kind,
        change: task.change,
        delta: task.delta,
        outcome,
        failures: execution.failures,
        status,
    }
}
