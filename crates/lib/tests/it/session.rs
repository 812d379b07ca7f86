//! Session population and editing tests

use delegation_ledger::{
    entity::{ActionKey, DelegationStatus, EntityId},
    reconcile::ReconcileError,
    rights::RightsSet,
    session::{DelegationSession, Parties},
};

use crate::helpers::*;

fn keys(keys: &[&str]) -> RightsSet {
    keys.iter().map(|k| ActionKey::from(*k)).collect()
}

#[tokio::test]
async fn test_load_baseline_reflects_backend() {
    let client = test_client();
    client
        .seed_rights(&from(), &to(), &EntityId::from("r1"), ["read"])
        .await;
    client.seed_package(&to(), &EntityId::from("p1")).await;

    let mut session = DelegationSession::new(test_parties())
        .with_entity(single_right("r1"), DelegationStatus::Available)
        .unwrap()
        .with_entity(single_right("r2"), DelegationStatus::Delegated)
        .unwrap()
        .with_entity(package("p1"), DelegationStatus::Available)
        .unwrap();
    assert!(!session.baseline_known());

    session.load_baseline(&*client).await.unwrap();

    assert!(session.baseline_known());
    let snapshot = session.snapshot();
    assert_eq!(
        snapshot.status_of(&"r1".into()),
        Some(DelegationStatus::Delegated)
    );
    assert_eq!(
        snapshot.status_of(&"r2".into()),
        Some(DelegationStatus::Available)
    );
    assert_eq!(
        snapshot.status_of(&"p1".into()),
        Some(DelegationStatus::Delegated)
    );
    assert_eq!(session.last_known_rights(&"r1".into()), keys(&["read"]));
    assert!(!session.has_pending_changes());
}

#[tokio::test]
async fn test_load_baseline_network_failure_leaves_session_unchanged() {
    let client = test_client();
    client.fail_network("r2").await;

    let mut session = DelegationSession::new(test_parties())
        .with_entity(single_right("r1"), DelegationStatus::Delegated)
        .unwrap()
        .with_entity(single_right("r2"), DelegationStatus::Available)
        .unwrap();

    let err = session.load_baseline(&*client).await.unwrap_err();
    match &err {
        ReconcileError::BaselineQueryFailed { resource, source } => {
            assert_eq!(resource, &EntityId::from("r2"));
            assert!(source.is_network());
        }
        other => panic!("Unexpected error: {other:?}"),
    }
    assert!(err.is_retryable());
    assert!(!session.baseline_known());
    assert_eq!(
        session.ledger().status(&"r1".into()),
        Some(DelegationStatus::Delegated)
    );
}

#[tokio::test]
async fn test_load_baseline_requires_parties() {
    let client = test_client();
    let mut session = DelegationSession::new(Parties::default())
        .with_entity(api("a1"), DelegationStatus::Available)
        .unwrap();

    let err = session.load_baseline(&*client).await.unwrap_err();
    assert!(err.is_missing_party());
    assert_eq!(client.call_count().await, 0);
}

#[tokio::test]
async fn test_staged_entities_keep_staging_across_load() {
    let client = test_client();
    let mut session = DelegationSession::new(test_parties())
        .with_entity(api("a1"), DelegationStatus::Available)
        .unwrap();
    session.stage_add(&"a1".into()).unwrap();

    session.load_baseline(&*client).await.unwrap();

    assert_eq!(
        session.ledger().status(&"a1".into()),
        Some(DelegationStatus::StagedForAdd)
    );
    let plan = session.plan();
    assert_eq!(plan[&EntityId::from("a1")].to_grant, keys(&["*"]));
}

#[test]
fn test_scenario_read_write_to_write_sign() {
    let mut session = known_session(vec![(single_right("r"), DelegationStatus::Delegated)]);
    session.set_baseline(&"r".into(), ["read", "write"]).unwrap();
    session.edit_rights(&"r".into(), ["write", "sign"]).unwrap();

    let plan = session.plan();
    assert_eq!(plan.len(), 1);
    let delta = &plan[&EntityId::from("r")];
    assert_eq!(delta.to_grant, keys(&["sign"]));
    assert_eq!(delta.to_revoke, keys(&["read"]));
}

#[test]
fn test_coarse_entities_diff_through_wildcard() {
    let mut session = known_session(vec![
        (org("o1"), DelegationStatus::Available),
        (api("a1"), DelegationStatus::Delegated),
    ]);
    session.stage_add(&"o1".into()).unwrap();
    session.stage_remove(&"a1".into()).unwrap();

    let plan = session.plan();
    assert_eq!(plan[&EntityId::from("o1")].to_grant, keys(&["*"]));
    assert_eq!(plan[&EntityId::from("a1")].to_revoke, keys(&["*"]));
}
