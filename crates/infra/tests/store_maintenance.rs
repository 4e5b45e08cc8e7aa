//! Retention purge, retry polling and statistics.

mod common;

use std::time::Duration;

use chrono::Utc;
use serde_json::json;

use assessor_core::{AssessmentState, ErrorKind, RetryPolicy, StateUpdate};
use assessor_infra::AssessmentStore;

use common::{backdate, completed, open_store, open_store_with, processing, request};

#[tokio::test]
async fn cleanup_removes_only_old_terminal_records() -> anyhow::Result<()> {
    let store = open_store().await?;
    let long_ago = Utc::now() - chrono::Duration::days(40);
    let last_week = Utc::now() - chrono::Duration::days(5);

    let old_done = completed(&store, request("iso27001"), json!({})).await?.id;
    backdate(&store, old_done, long_ago, Some(long_ago)).await?;

    let old_failed = processing(&store, request("iso27001").with_max_retries(0)).await?.id;
    store
        .update_state(old_failed, StateUpdate::failed("fatal"))
        .await?;
    backdate(&store, old_failed, long_ago, Some(long_ago)).await?;

    let old_cancelled = store.create_assessment(request("iso27001")).await?;
    store.cancel_assessment(old_cancelled, None).await?;
    backdate(&store, old_cancelled, long_ago, Some(long_ago)).await?;

    let recent_done = completed(&store, request("iso27001"), json!({})).await?.id;
    backdate(&store, recent_done, last_week, Some(last_week)).await?;

    let ancient = Utc::now() - chrono::Duration::days(365);
    let old_pending = store.create_assessment(request("iso27001")).await?;
    backdate(&store, old_pending, ancient, None).await?;
    let old_processing = processing(&store, request("iso27001")).await?.id;
    backdate(&store, old_processing, ancient, None).await?;

    let removed = store.cleanup_old_assessments(30).await?;
    assert_eq!(removed, 3);

    for id in [old_done, old_failed, old_cancelled] {
        assert_eq!(
            store.get_assessment(id).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert!(store.get_assessment_audit_trail(id).await?.is_empty());
    }
    for id in [recent_done, old_pending, old_processing] {
        store.get_assessment(id).await?;
        assert!(!store.get_assessment_audit_trail(id).await?.is_empty());
    }

    assert_eq!(store.cleanup_old_assessments(30).await?, 0);
    Ok(())
}

#[tokio::test]
async fn retry_candidates_are_requeued_records_past_backoff() -> anyhow::Result<()> {
    let store = open_store_with(|c| c.with_retry_policy(RetryPolicy::fixed(Duration::ZERO))).await?;

    let due = processing(&store, request("iso27001").with_max_retries(3)).await?;
    store
        .update_state(due.id, StateUpdate::failed("dns timeout"))
        .await?;

    // Never failed: not a retry candidate even though it is pending.
    store.create_assessment(request("iso27001")).await?;

    // Same database, long backoff: requeued but not yet due.
    let patient = AssessmentStore::connect(
        store
            .config()
            .clone()
            .with_retry_policy(RetryPolicy::fixed(Duration::from_secs(3600))),
    )
    .await?;
    let waiting = processing(&patient, request("iso27001").with_max_retries(3)).await?;
    patient
        .update_state(waiting.id, StateUpdate::failed("rate limited"))
        .await?;

    let candidates = store.get_assessments_for_retry().await?;
    assert_eq!(candidates.len(), 1);
    let candidate = &candidates[0];
    assert_eq!(candidate.id, due.id);
    assert_eq!(candidate.retry_count, 1);
    assert_eq!(candidate.error_message.as_deref(), Some("dns timeout"));
    assert!(candidate.next_retry_at <= Utc::now());
    Ok(())
}

#[tokio::test]
async fn statistics_cover_counts_timing_and_recency() -> anyhow::Result<()> {
    let store = open_store().await?;

    let empty = store.get_statistics().await?;
    assert_eq!(empty.total_count, 0);
    assert_eq!(empty.average_processing_secs, None);
    assert!(AssessmentState::ALL.iter().all(|s| empty.count(*s) == 0));

    store.create_assessment(request("iso27001")).await?;
    let stale = store.create_assessment(request("iso27001")).await?;
    backdate(&store, stale, Utc::now() - chrono::Duration::days(3), None).await?;

    let done = completed(&store, request("iso27001"), json!({})).await?;
    let finished = done.completed_at.unwrap_or(done.updated_at);
    backdate(&store, done.id, finished - chrono::Duration::seconds(10), Some(finished)).await?;

    let failed = processing(&store, request("iso27001").with_max_retries(0)).await?;
    store
        .update_state(failed.id, StateUpdate::failed("fatal"))
        .await?;

    let cancelled = store.create_assessment(request("iso27001")).await?;
    store.cancel_assessment(cancelled, None).await?;

    let stats = store.get_statistics().await?;
    assert_eq!(stats.total_count, 5);
    assert_eq!(stats.count(AssessmentState::Pending), 2);
    assert_eq!(stats.count(AssessmentState::Processing), 0);
    assert_eq!(stats.count(AssessmentState::Completed), 1);
    assert_eq!(stats.count(AssessmentState::Failed), 1);
    assert_eq!(stats.count(AssessmentState::Cancelled), 1);
    assert_eq!(stats.in_flight(), 2);
    assert_eq!(stats.recent_count, 4);

    // Mean of ~10s (completed) and ~0s (failed); cancelled work is excluded.
    let avg = stats.average_processing_secs.unwrap_or_default();
    assert!((4.0..6.5).contains(&avg), "average {avg}");
    Ok(())
}

#[tokio::test]
async fn cleanup_with_unrepresentable_window_purges_nothing() -> anyhow::Result<()> {
    let store = open_store().await?;
    let done = completed(&store, request("iso27001"), json!({})).await?.id;
    let long_ago = Utc::now() - chrono::Duration::days(400);
    backdate(&store, done, long_ago, Some(long_ago)).await?;

    assert_eq!(store.cleanup_old_assessments(u32::MAX).await?, 0);
    store.get_assessment(done).await?;
    Ok(())
}

#[tokio::test]
async fn audit_history_is_removed_only_with_its_record() -> anyhow::Result<()> {
    let store = open_store().await?;
    let done = completed(&store, request("iso27001"), json!({})).await?.id;

    let direct = sqlx::query("DELETE FROM assessment_audit WHERE assessment_id = ?1")
        .bind(done.to_string())
        .execute(store.pool())
        .await;
    assert!(direct.is_err());
    assert_eq!(store.get_assessment_audit_trail(done).await?.len(), 3);

    let long_ago = Utc::now() - chrono::Duration::days(60);
    backdate(&store, done, long_ago, Some(long_ago)).await?;
    assert_eq!(store.cleanup_old_assessments(30).await?, 1);
    assert!(store.get_assessment_audit_trail(done).await?.is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn statistics_stay_consistent_under_concurrent_writes() -> anyhow::Result<()> {
    let store = open_store().await?;

    let writer = store.store.clone();
    let inserts = tokio::spawn(async move {
        for _ in 0..60 {
            writer.create_assessment(request("iso27001")).await?;
        }
        Ok::<_, assessor_core::AssessmentError>(())
    });

    // Every record is recent, so one snapshot must give equal totals.
    for _ in 0..30 {
        let stats = store.get_statistics().await?;
        let summed: u64 = stats.count_by_state.values().sum();
        assert_eq!(summed, stats.total_count);
        assert_eq!(stats.recent_count, stats.total_count);
    }

    inserts.await??;
    assert_eq!(store.get_statistics().await?.total_count, 60);
    Ok(())
}
