//! Staging ledger tests

use std::collections::HashSet;

use delegation_ledger::{
    entity::{DelegationStatus, Entity, EntityId, EntityKind},
    ledger::{LedgerError, StagingLedger},
};
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::helpers::*;

#[test]
fn test_stage_add_then_again_fails_with_not_available() {
    let mut ledger = StagingLedger::new();
    ledger
        .insert(
            Entity::new("1", "API", EntityKind::Api),
            DelegationStatus::Available,
        )
        .unwrap();

    ledger.stage_add(&"1".into()).unwrap();
    assert_eq!(
        ledger.status(&"1".into()),
        Some(DelegationStatus::StagedForAdd)
    );

    let err = ledger.stage_add(&"1".into()).unwrap_err();
    assert!(err.is_not_available());
    assert_eq!(err.entity_id(), &EntityId::from("1"));
}

#[test]
fn test_unknown_ids_are_not_found() {
    let mut ledger = StagingLedger::new();
    assert!(matches!(
        ledger.stage_add(&"ghost".into()),
        Err(LedgerError::EntityNotFound { .. })
    ));
    assert!(matches!(
        ledger.stage_remove(&"ghost".into()),
        Err(LedgerError::EntityNotFound { .. })
    ));
    assert!(!ledger.undo_stage(&"ghost".into()));
}

/// Random staging sequences never place an id in two buckets or lose one.
#[test]
fn test_random_staging_sequences_keep_one_bucket_per_id() {
    let mut rng = StdRng::seed_from_u64(0x5eed);

    for _round in 0..50 {
        let mut ledger = StagingLedger::new();
        let ids: Vec<String> = (0..6).map(|i| format!("e{i}")).collect();
        for (i, id) in ids.iter().enumerate() {
            let status = if i % 2 == 0 {
                DelegationStatus::Available
            } else {
                DelegationStatus::Delegated
            };
            ledger.insert(api(id), status).unwrap();
        }

        for _step in 0..40 {
            let id = EntityId::from(ids[rng.gen_range(0..ids.len())].as_str());
            match rng.gen_range(0..4) {
                0 => {
                    let _ = ledger.stage_add(&id);
                }
                1 => {
                    let _ = ledger.stage_remove(&id);
                }
                2 => {
                    ledger.undo_stage(&id);
                }
                _ => {
                    if rng.gen_bool(0.1) {
                        ledger.reset();
                    }
                }
            }

            let snapshot = ledger.snapshot();
            let mut seen = HashSet::new();
            for status in [
                DelegationStatus::Available,
                DelegationStatus::StagedForAdd,
                DelegationStatus::Delegated,
                DelegationStatus::StagedForRemove,
                DelegationStatus::Revoked,
            ] {
                for entity in snapshot.bucket(status) {
                    assert!(
                        seen.insert(entity.id.clone()),
                        "{} appears in more than one bucket",
                        entity.id
                    );
                }
            }
            assert_eq!(seen.len(), ids.len());
        }
    }
}

#[test]
fn test_failed_stage_leaves_status_untouched() {
    let mut ledger = StagingLedger::new();
    ledger
        .insert(org("o1"), DelegationStatus::Delegated)
        .unwrap();

    assert!(ledger.stage_add(&"o1".into()).is_err());
    assert_eq!(ledger.status(&"o1".into()), Some(DelegationStatus::Delegated));
}

#[test]
fn test_snapshot_serializes_for_rendering() {
    let mut ledger = StagingLedger::new();
    ledger
        .insert(package("p1"), DelegationStatus::Available)
        .unwrap();
    ledger.stage_add(&"p1".into()).unwrap();

    let json = serde_json::to_value(ledger.snapshot()).unwrap();
    assert_eq!(json["entries"][0]["status"], "staged-for-add");
    assert_eq!(json["entries"][0]["entity"]["kind"], "access-package");
}
