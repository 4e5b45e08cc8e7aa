//! Optimistic concurrency under real contention.
//!
//! Writers share one SQLite file. Separate `AssessmentStore` instances use
//! separate pools, standing in for separate processes.

mod common;

use std::collections::HashSet;

use serde_json::json;

use assessor_core::{AssessmentError, AssessmentState, AuditAction, ErrorKind, StateUpdate};
use assessor_infra::{AssessmentStore, CancelOutcome};

use common::{open_store, processing, request};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_updates_at_same_version_have_one_winner() -> anyhow::Result<()> {
    let store = open_store().await?;
    let id = store.create_assessment(request("iso27001")).await?;

    let a = store.store.clone();
    let b = store.store.clone();
    let (first, second) = tokio::join!(
        a.update_state(id, StateUpdate::processing().expecting(1).by("worker-a")),
        b.update_state(id, StateUpdate::processing().expecting(1).by("worker-b")),
    );

    let outcomes = [first, second];
    let winners = outcomes.iter().filter(|r| r.is_ok()).count();
    let conflicts = outcomes
        .iter()
        .filter(|r| matches!(r, Err(AssessmentError::VersionConflict { expected: 1, actual: 2, .. })))
        .count();
    assert_eq!((winners, conflicts), (1, 1), "{outcomes:?}");

    let record = store.get_assessment(id).await?;
    assert_eq!(record.state, AssessmentState::Processing);
    assert_eq!(record.version, 2);

    let trail = store.get_assessment_audit_trail(id).await?;
    assert_eq!(trail.len(), 2);
    assert_eq!(trail[1].action, AuditAction::Start);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_writers_produce_exactly_one_transition() -> anyhow::Result<()> {
    let store = open_store().await?;
    let record = processing(&store, request("iso27001")).await?;

    let mut handles = Vec::new();
    for n in 0..8 {
        let writer = store.store.clone();
        let update = StateUpdate::completed(json!({ "writer": n })).expecting(record.version);
        handles.push(tokio::spawn(async move { writer.update_state(record.id, update).await }));
    }

    let mut winners = 0;
    for handle in handles {
        match handle.await? {
            Ok(_) => winners += 1,
            Err(err) => assert_eq!(err.kind(), ErrorKind::VersionConflict, "{err}"),
        }
    }
    assert_eq!(winners, 1);

    let trail = store.get_assessment_audit_trail(record.id).await?;
    let completions = trail
        .iter()
        .filter(|e| e.action == AuditAction::Complete)
        .count();
    assert_eq!(completions, 1);
    assert_eq!(store.get_assessment(record.id).await?.version, record.version + 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn separate_pools_see_each_others_writes() -> anyhow::Result<()> {
    let store = open_store().await?;
    let other = AssessmentStore::connect(store.config().clone()).await?;

    let id = store.create_assessment(request("iso27001")).await?;
    let seen = other.get_assessment(id).await?;
    assert_eq!(seen.version, 1);

    other.update_state(id, StateUpdate::processing()).await?;

    // The first pool still holds version 1.
    let err = store
        .update_state(id, StateUpdate::to(AssessmentState::Cancelled).expecting(seen.version))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::VersionConflict);
    assert_eq!(store.get_state(id).await?.state, AssessmentState::Processing);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_claims_never_double_assign() -> anyhow::Result<()> {
    let store = open_store().await?;
    let mut created = HashSet::new();
    for _ in 0..12 {
        created.insert(store.create_assessment(request("iso27001")).await?);
    }

    let mut handles = Vec::new();
    for worker in 0..4 {
        let claimer = store.store.clone();
        handles.push(tokio::spawn(async move {
            let name = format!("worker-{worker}");
            let mut mine = Vec::new();
            loop {
                match claimer.claim_next(&name).await {
                    Ok(Some(record)) => mine.push(record.id),
                    Ok(None) => break,
                    // Lost a race for the same row; try the next one.
                    Err(AssessmentError::VersionConflict { .. }) => continue,
                    Err(err) => return Err(err),
                }
            }
            Ok(mine)
        }));
    }

    let mut claimed = Vec::new();
    for handle in handles {
        claimed.extend(handle.await??);
    }
    let unique: HashSet<_> = claimed.iter().copied().collect();
    assert_eq!(claimed.len(), unique.len(), "a record was claimed twice");
    assert_eq!(unique, created);

    for id in created {
        let trail = store.get_assessment_audit_trail(id).await?;
        assert_eq!(trail.iter().filter(|e| e.action == AuditAction::Start).count(), 1);
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancel_racing_completion_is_benign() -> anyhow::Result<()> {
    let store = open_store().await?;
    let record = processing(&store, request("iso27001")).await?;

    let canceller = store.store.clone();
    let processor = store.store.clone();
    let (cancelled, completed) = tokio::join!(
        canceller.cancel_assessment(record.id, Some("operator abort")),
        processor.update_state(
            record.id,
            StateUpdate::completed(json!({ "ok": true })).expecting(record.version)
        ),
    );

    let final_state = store.get_state(record.id).await?.state;
    match (cancelled?, completed) {
        (CancelOutcome::Cancelled, Err(err)) => {
            assert_eq!(err.kind(), ErrorKind::VersionConflict);
            assert_eq!(final_state, AssessmentState::Cancelled);
        }
        (CancelOutcome::AlreadyTerminal(state), Ok(_)) => {
            assert_eq!(state, AssessmentState::Completed);
            assert_eq!(final_state, AssessmentState::Completed);
        }
        other => panic!("unexpected race outcome: {other:?}"),
    }
    assert_eq!(store.get_assessment(record.id).await?.version, record.version + 1);
    Ok(())
}
