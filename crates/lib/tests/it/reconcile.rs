//! Reconciliation engine tests against the in-memory backend

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use std::time::Duration;

use async_trait::async_trait;
use delegation_ledger::{
    Error,
    classify::ErrorCode,
    client::{
        AuthorizationClient, ClientResult, FailedRight, InMemoryClient, in_memory::Operation,
    },
    entity::{ActionKey, DelegationStatus, EntityId},
    party::PartyUrn,
    reconcile::{ChangeKind, Outcome, ReconcileConfig, ReconcileError, Reconciler, reconcile},
    rights::RightsSet,
    session::{DelegationSession, Parties},
};
use tokio_util::sync::CancellationToken;

use crate::helpers::*;

fn keys(keys: &[&str]) -> RightsSet {
    keys.iter().map(|k| ActionKey::from(*k)).collect()
}

#[tokio::test]
async fn test_second_reconcile_is_no_change_without_calls() {
    let client = test_client();
    let mut session = known_session(vec![
        (api("a1"), DelegationStatus::Available),
        (single_right("r1"), DelegationStatus::Delegated),
    ]);
    session.stage_add(&"a1".into()).unwrap();
    session.edit_rights(&"r1".into(), ["read"]).unwrap();

    let first = reconcile(&mut session, client.clone(), None).await.unwrap();
    assert!(first.report().unwrap().is_complete_success());
    let calls_after_first = client.call_count().await;
    assert!(calls_after_first > 0);

    let second = reconcile(&mut session, client.clone(), None).await.unwrap();
    assert!(second.is_no_change());
    assert_eq!(client.call_count().await, calls_after_first);
}

#[tokio::test]
async fn test_partial_failure_isolated_to_one_entity() {
    let client = test_client();
    let mut session = known_session(vec![
        (api("1"), DelegationStatus::Available),
        (api("2"), DelegationStatus::Available),
        (api("3"), DelegationStatus::Available),
    ]);
    for id in ["1", "2", "3"] {
        session.stage_add(&id.into()).unwrap();
    }
    client.fail_resource("2", "MissingRoleAccess").await;

    let result = reconcile(&mut session, client.clone(), None).await.unwrap();
    let report = result.report().unwrap();

    assert_eq!(
        report.outcome(&"1".into()).unwrap().outcome,
        Outcome::Succeeded
    );
    assert_eq!(
        report.outcome(&"2".into()).unwrap().outcome,
        Outcome::Failed(ErrorCode::MissingRoleAccess)
    );
    assert_eq!(
        report.outcome(&"3".into()).unwrap().outcome,
        Outcome::Succeeded
    );
    assert_eq!(report.succeeded().len(), 2);
    assert_eq!(report.failed().len(), 1);

    let snapshot = session.snapshot();
    assert_eq!(
        snapshot
            .staged_for_add()
            .iter()
            .map(|e| e.id.clone())
            .collect::<Vec<_>>(),
        vec![EntityId::from("2")]
    );
    assert_eq!(snapshot.delegated().len(), 2);
    assert!(snapshot.staged_for_remove().is_empty());
}

#[tokio::test]
async fn test_retry_after_failure_only_touches_failed_entity() {
    let client = test_client();
    let mut session = known_session(vec![
        (api("1"), DelegationStatus::Available),
        (api("2"), DelegationStatus::Available),
    ]);
    session.stage_add(&"1".into()).unwrap();
    session.stage_add(&"2".into()).unwrap();
    client.fail_resource("2", "MissingDelegationAccess").await;

    reconcile(&mut session, client.clone(), None).await.unwrap();
    client.clear_failures().await;
    client.clear_calls().await;

    let retry = reconcile(&mut session, client.clone(), None).await.unwrap();
    let report = retry.report().unwrap();
    assert_eq!(report.outcomes().len(), 1);
    assert_eq!(report.outcomes()[0].id, EntityId::from("2"));
    assert!(report.is_complete_success());
    assert_eq!(client.mutation_count().await, 1);
}

#[tokio::test]
async fn test_edit_revokes_before_grant_on_same_resource() {
    let client = test_client();
    client
        .seed_rights(&from(), &to(), &EntityId::from("r"), ["read", "write"])
        .await;

    let mut session = DelegationSession::new(test_parties())
        .with_entity(single_right("r"), DelegationStatus::Delegated)
        .unwrap();
    session.load_baseline(&*client).await.unwrap();
    session.edit_rights(&"r".into(), ["write", "sign"]).unwrap();
    client.clear_calls().await;

    let result = reconcile(&mut session, client.clone(), None).await.unwrap();
    let outcome = &result.report().unwrap().outcomes()[0];
    assert_eq!(outcome.change, ChangeKind::Edit);
    assert_eq!(outcome.delta.to_grant, keys(&["sign"]));
    assert_eq!(outcome.delta.to_revoke, keys(&["read"]));

    let calls = client.calls().await;
    let operations: Vec<Operation> = calls.iter().map(|c| c.operation).collect();
    assert_eq!(
        operations,
        vec![Operation::RevokeRights, Operation::GrantRights]
    );
    assert_eq!(calls[0].keys, keys(&["read"]));
    assert_eq!(calls[1].keys, keys(&["sign"]));
    assert_eq!(
        client
            .stored_rights(&from(), &to(), &EntityId::from("r"))
            .await,
        keys(&["write", "sign"])
    );
}

#[tokio::test]
async fn test_grant_failure_after_revoke_is_not_rolled_back() {
    let client = test_client();
    client
        .seed_rights(&from(), &to(), &EntityId::from("r"), ["read"])
        .await;
    client.fail_grants("r", "MissingSrrRightAccess").await;

    let mut session = known_session(vec![(single_right("r"), DelegationStatus::Delegated)]);
    session.set_baseline(&"r".into(), ["read"]).unwrap();
    session.edit_rights(&"r".into(), ["sign"]).unwrap();

    let result = reconcile(&mut session, client.clone(), None).await.unwrap();
    let report = result.report().unwrap();
    assert_eq!(
        report.headline_error(),
        Some(ErrorCode::MissingSrrRightAccess)
    );

    // The revoke went through and stays; the session records what happened.
    assert!(
        client
            .stored_rights(&from(), &to(), &EntityId::from("r"))
            .await
            .is_empty()
    );
    assert!(session.last_known_rights(&"r".into()).is_empty());
    assert!(session.needs_refresh());

    // The remaining delta is only the failed grant.
    let plan = session.plan();
    assert_eq!(plan[&EntityId::from("r")].to_grant, keys(&["sign"]));
    assert!(plan[&EntityId::from("r")].to_revoke.is_empty());
}

#[tokio::test]
async fn test_revoke_moves_entity_to_revoked() {
    let client = test_client();
    client.seed_package(&to(), &EntityId::from("p1")).await;
    client
        .seed_rights(&from(), &to(), &EntityId::from("o1"), ["*"])
        .await;

    let mut session = known_session(vec![
        (package("p1"), DelegationStatus::Delegated),
        (org("o1"), DelegationStatus::Delegated),
    ]);
    session.stage_remove(&"p1".into()).unwrap();
    session.stage_remove(&"o1".into()).unwrap();

    let result = reconcile(&mut session, client.clone(), None).await.unwrap();
    let report = result.report().unwrap();
    assert!(report.is_complete_success());
    for outcome in report.outcomes() {
        assert_eq!(outcome.change, ChangeKind::Revoke);
        assert_eq!(outcome.status, Some(DelegationStatus::Revoked));
    }

    assert!(!client.stored_package(&to(), &EntityId::from("p1")).await);
    assert!(
        client
            .stored_rights(&from(), &to(), &EntityId::from("o1"))
            .await
            .is_empty()
    );
    assert_eq!(session.snapshot().revoked().len(), 2);
}

#[tokio::test]
async fn test_package_rejection_is_classified() {
    let client = test_client();
    client.fail_resource("p2", "MissingRoleAccess").await;

    let mut session = known_session(vec![
        (package("p1"), DelegationStatus::Available),
        (package("p2"), DelegationStatus::Available),
    ]);
    session.stage_add(&"p1".into()).unwrap();
    session.stage_add(&"p2".into()).unwrap();

    let result = reconcile(&mut session, client.clone(), None).await.unwrap();
    let report = result.report().unwrap();
    let failed = report.outcome(&"p2".into()).unwrap();
    assert_eq!(failed.error_code(), Some(ErrorCode::MissingRoleAccess));
    assert_eq!(failed.failures[0].key, None);
    assert!(client.stored_package(&to(), &EntityId::from("p1")).await);
}

#[tokio::test]
async fn test_headline_error_prefers_most_actionable() {
    let client = test_client();
    client.fail_network("a").await;
    client.fail_resource("b", "MissingSrrRightAccess").await;
    client.fail_resource("c", "MissingDelegationAccess").await;

    let mut session = known_session(vec![
        (api("a"), DelegationStatus::Available),
        (api("b"), DelegationStatus::Available),
        (api("c"), DelegationStatus::Available),
    ]);
    for id in ["a", "b", "c"] {
        session.stage_add(&id.into()).unwrap();
    }

    let result = reconcile(&mut session, client.clone(), None).await.unwrap();
    let report = result.report().unwrap();
    assert_eq!(
        report.error_codes(),
        vec![
            ErrorCode::MissingDelegationAccess,
            ErrorCode::MissingSrrRightAccess,
            ErrorCode::Unknown,
        ]
    );
    assert_eq!(
        report.headline_error(),
        Some(ErrorCode::MissingDelegationAccess)
    );
    assert_eq!(session.snapshot().staged_for_add().len(), 3);
}

#[tokio::test]
async fn test_missing_party_fails_before_any_call() {
    let client = test_client();
    let mut parties = test_parties();
    parties.from = None;

    let mut session = DelegationSession::new(parties)
        .with_entity(api("a1"), DelegationStatus::Available)
        .unwrap();
    session.stage_add(&"a1".into()).unwrap();

    let err = reconcile(&mut session, client.clone(), None)
        .await
        .unwrap_err();
    assert!(err.is_missing_party());
    assert_eq!(client.call_count().await, 0);

    let err: Error = err.into();
    assert!(err.is_precondition_failure());
}

#[tokio::test]
async fn test_unloaded_baseline_is_queried_first() {
    let client = test_client();
    client
        .seed_rights(&from(), &to(), &EntityId::from("a1"), ["*"])
        .await;

    let mut session = DelegationSession::new(test_parties())
        .with_entity(api("a1"), DelegationStatus::Available)
        .unwrap()
        .with_entity(api("a2"), DelegationStatus::Available)
        .unwrap();
    session.stage_add(&"a2".into()).unwrap();

    let result = reconcile(&mut session, client.clone(), None).await.unwrap();
    assert_eq!(result.report().unwrap().outcomes().len(), 1);
    assert_eq!(
        session.ledger().status(&"a1".into()),
        Some(DelegationStatus::Delegated)
    );

    let queries = client
        .calls()
        .await
        .iter()
        .filter(|c| c.operation == Operation::QueryRights)
        .count();
    assert_eq!(queries, 2);
}

#[tokio::test]
async fn test_baseline_network_failure_aborts_batch() {
    let client = test_client();
    client.fail_network("a1").await;

    let mut session = DelegationSession::new(test_parties())
        .with_entity(api("a1"), DelegationStatus::Available)
        .unwrap()
        .with_entity(api("a2"), DelegationStatus::Available)
        .unwrap();
    session.stage_add(&"a2".into()).unwrap();

    let err = reconcile(&mut session, client.clone(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::BaselineQueryFailed { .. }));
    assert!(err.is_retryable());
    assert_eq!(client.mutation_count().await, 0);
    assert_eq!(
        session.ledger().status(&"a2".into()),
        Some(DelegationStatus::StagedForAdd)
    );
}

#[tokio::test]
async fn test_cancelled_before_dispatch_makes_no_calls() {
    let client = test_client();
    let mut session = known_session(vec![(api("a1"), DelegationStatus::Available)]);
    session.stage_add(&"a1".into()).unwrap();

    let token = CancellationToken::new();
    token.cancel();

    let err = reconcile(&mut session, client.clone(), Some(&token))
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(client.call_count().await, 0);
    assert_eq!(
        session.ledger().status(&"a1".into()),
        Some(DelegationStatus::StagedForAdd)
    );
}

/// Cancels a token from inside the first grant, like a host tearing down mid-flight.
struct TeardownClient {
    inner: InMemoryClient,
    token: CancellationToken,
}

#[async_trait]
impl AuthorizationClient for TeardownClient {
    async fn query_rights(
        &self,
        from: &PartyUrn,
        to: &PartyUrn,
        resource: &EntityId,
    ) -> ClientResult<RightsSet> {
        self.inner.query_rights(from, to, resource).await
    }

    async fn grant_rights(
        &self,
        from: &PartyUrn,
        to: &PartyUrn,
        resource: &EntityId,
        keys: &RightsSet,
    ) -> ClientResult<Vec<FailedRight>> {
        self.token.cancel();
        self.inner.grant_rights(from, to, resource, keys).await
    }

    async fn revoke_rights(
        &self,
        from: &PartyUrn,
        to: &PartyUrn,
        resource: &EntityId,
        keys: &RightsSet,
    ) -> ClientResult<Vec<FailedRight>> {
        self.inner.revoke_rights(from, to, resource, keys).await
    }

    async fn has_package(&self, to: &PartyUrn, package: &EntityId) -> ClientResult<bool> {
        self.inner.has_package(to, package).await
    }

    async fn grant_package(&self, to: &PartyUrn, package: &EntityId) -> ClientResult<()> {
        self.inner.grant_package(to, package).await
    }

    async fn revoke_package(&self, to: &PartyUrn, package: &EntityId) -> ClientResult<()> {
        self.inner.revoke_package(to, package).await
    }
}

#[tokio::test]
async fn test_cancelled_in_flight_completes_calls_but_leaves_session() {
    let token = CancellationToken::new();
    let client = Arc::new(TeardownClient {
        inner: InMemoryClient::new(),
        token: token.clone(),
    });
    let mut session = known_session(vec![(api("a1"), DelegationStatus::Available)]);
    session.stage_add(&"a1".into()).unwrap();

    let err = Reconciler::default()
        .reconcile(&mut session, client.clone(), Some(&token))
        .await
        .unwrap_err();
    assert!(err.is_cancelled());

    // The in-flight grant finished on the backend...
    assert_eq!(
        client
            .inner
            .stored_rights(&from(), &to(), &EntityId::from("a1"))
            .await,
        keys(&["*"])
    );
    // ...but the session was not updated.
    assert_eq!(
        session.ledger().status(&"a1".into()),
        Some(DelegationStatus::StagedForAdd)
    );
    assert!(session.last_known_rights(&"a1".into()).is_empty());
}

/// Records how many grants are running at once.
#[derive(Default)]
struct SlowClient {
    inner: InMemoryClient,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

#[async_trait]
impl AuthorizationClient for SlowClient {
    async fn query_rights(
        &self,
        from: &PartyUrn,
        to: &PartyUrn,
        resource: &EntityId,
    ) -> ClientResult<RightsSet> {
        self.inner.query_rights(from, to, resource).await
    }

    async fn grant_rights(
        &self,
        from: &PartyUrn,
        to: &PartyUrn,
        resource: &EntityId,
        keys: &RightsSet,
    ) -> ClientResult<Vec<FailedRight>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.inner.grant_rights(from, to, resource, keys).await
    }

    async fn revoke_rights(
        &self,
        from: &PartyUrn,
        to: &PartyUrn,
        resource: &EntityId,
        keys: &RightsSet,
    ) -> ClientResult<Vec<FailedRight>> {
        self.inner.revoke_rights(from, to, resource, keys).await
    }

    async fn has_package(&self, to: &PartyUrn, package: &EntityId) -> ClientResult<bool> {
        self.inner.has_package(to, package).await
    }

    async fn grant_package(&self, to: &PartyUrn, package: &EntityId) -> ClientResult<()> {
        self.inner.grant_package(to, package).await
    }

    async fn revoke_package(&self, to: &PartyUrn, package: &EntityId) -> ClientResult<()> {
        self.inner.revoke_package(to, package).await
    }
}

#[tokio::test]
async fn test_concurrency_is_bounded_by_config() {
    let client = Arc::new(SlowClient::default());
    let ids: Vec<String> = (0..6).map(|i| format!("api-{i}")).collect();
    let mut session = known_session(
        ids.iter()
            .map(|id| (api(id), DelegationStatus::Available))
            .collect(),
    );
    for id in &ids {
        session.stage_add(&id.as_str().into()).unwrap();
    }

    let reconciler = Reconciler::new(ReconcileConfig::default().with_max_concurrent_resources(2));
    let result = reconciler
        .reconcile(&mut session, client.clone(), None)
        .await
        .unwrap();

    assert!(result.report().unwrap().is_complete_success());
    assert_eq!(client.max_in_flight.load(Ordering::SeqCst), 2);
    assert_eq!(session.snapshot().delegated().len(), 6);
}

#[tokio::test]
async fn test_undo_before_submit_issues_no_calls() {
    let client = test_client();
    let mut session = known_session(vec![
        (api("a1"), DelegationStatus::Available),
        (api("a2"), DelegationStatus::Delegated),
    ]);
    session.stage_add(&"a1".into()).unwrap();
    session.stage_remove(&"a2".into()).unwrap();
    session.undo_stage(&"a1".into());
    session.undo_stage(&"a2".into());

    let result = reconcile(&mut session, client.clone(), None).await.unwrap();
    assert!(result.is_no_change());
    assert_eq!(client.call_count().await, 0);
}

#[tokio::test]
async fn test_abandoned_flow_reset_issues_no_calls() {
    let client = test_client();
    let mut session = DelegationSession::new(Parties::default())
        .with_entity(api("a1"), DelegationStatus::Available)
        .unwrap();
    session.stage_add(&"a1".into()).unwrap();
    session.reset();
    session.set_parties(test_parties());
    session.mark_baseline_known();

    let result = reconcile(&mut session, client.clone(), None).await.unwrap();
    assert!(result.is_no_change());
    assert_eq!(client.call_count().await, 0);
}

#[tokio::test]
async fn test_staged_add_already_held_settles_without_calls() {
    let client = test_client();
    client
        .seed_rights(&from(), &to(), &EntityId::from("api-1"), ["*"])
        .await;

    let mut session = DelegationSession::new(test_parties())
        .with_entity(api("api-1"), DelegationStatus::Available)
        .unwrap();
    session.stage_add(&"api-1".into()).unwrap();

    let result = reconcile(&mut session, client.clone(), None).await.unwrap();
    let report = result.report().unwrap();
    let outcome = report.outcome(&"api-1".into()).unwrap();
    assert_eq!(outcome.outcome, Outcome::Succeeded);
    assert_eq!(outcome.change, ChangeKind::Grant);
    assert!(outcome.delta.is_empty());
    assert_eq!(outcome.status, Some(DelegationStatus::Delegated));
    assert_eq!(client.mutation_count().await, 0);

    let again = reconcile(&mut session, client.clone(), None).await.unwrap();
    assert!(again.is_no_change());

    session.stage_remove(&"api-1".into()).unwrap();
    assert!(session.has_pending_changes());
}

#[tokio::test]
async fn test_edit_down_to_granted_keys_after_partial_failure() {
    let client = test_client();
    client.fail_key("r", "sign", "MissingSrrRightAccess").await;

    let mut session = known_session(vec![(single_right("r"), DelegationStatus::Available)]);
    session.edit_rights(&"r".into(), ["read", "sign"]).unwrap();

    let first = reconcile(&mut session, client.clone(), None).await.unwrap();
    assert_eq!(
        first.report().unwrap().headline_error(),
        Some(ErrorCode::MissingSrrRightAccess)
    );
    assert_eq!(session.last_known_rights(&"r".into()), keys(&["read"]));
    assert_eq!(
        session.ledger().status(&"r".into()),
        Some(DelegationStatus::StagedForAdd)
    );

    session.edit_rights(&"r".into(), ["read"]).unwrap();
    client.clear_calls().await;

    let retry = reconcile(&mut session, client.clone(), None).await.unwrap();
    assert!(retry.report().unwrap().is_complete_success());
    assert_eq!(client.call_count().await, 0);
    assert_eq!(
        session.ledger().status(&"r".into()),
        Some(DelegationStatus::Delegated)
    );
    assert_eq!(
        client
            .stored_rights(&from(), &to(), &EntityId::from("r"))
            .await,
        keys(&["read"])
    );
    assert!(!session.snapshot().has_pending_changes());
}

#[tokio::test]
async fn test_only_resources_without_baseline_are_queried() {
    let client = test_client();
    let mut session = DelegationSession::new(test_parties())
        .with_entity(api("a1"), DelegationStatus::Available)
        .unwrap()
        .with_entity(api("a2"), DelegationStatus::Available)
        .unwrap();
    session.set_baseline(&"a1".into(), ["*"]).unwrap();
    session.stage_add(&"a2".into()).unwrap();
    assert!(!session.baseline_known());

    reconcile(&mut session, client.clone(), None).await.unwrap();

    let queried: Vec<EntityId> = client
        .calls()
        .await
        .into_iter()
        .filter(|c| c.operation == Operation::QueryRights)
        .map(|c| c.resource)
        .collect();
    assert_eq!(queried, vec![EntityId::from("a2")]);
    assert_eq!(
        session.ledger().status(&"a1".into()),
        Some(DelegationStatus::Delegated)
    );
}
