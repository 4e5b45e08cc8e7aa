//! Shared setup for store integration tests.
//!
//! Every test gets its own SQLite file inside a `TempDir`; the directory must
//! outlive the store, so both are returned together.

#![allow(dead_code)]

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;
use tempfile::TempDir;

use assessor_core::{AssessmentId, AssessmentRecord, NewAssessment, StateUpdate};
use assessor_infra::{AssessmentStore, StoreConfig};

pub struct TestStore {
    pub store: AssessmentStore,
    _dir: TempDir,
}

impl std::ops::Deref for TestStore {
    type Target = AssessmentStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

pub async fn open_store() -> anyhow::Result<TestStore> {
    open_store_with(|config| config).await
}

pub async fn open_store_with(
    configure: impl FnOnce(StoreConfig) -> StoreConfig,
) -> anyhow::Result<TestStore> {
    assessor_observability::init_for_tests();

    let dir = tempfile::tempdir()?;
    let url = format!("sqlite://{}", dir.path().join("assessments.db").display());
    let config = configure(
        StoreConfig::new(url)
            .with_max_connections(4)
            .with_poll_interval(Duration::from_millis(20)),
    );
    let store = AssessmentStore::connect(config).await?;
    Ok(TestStore { store, _dir: dir })
}

pub fn request(assessment_type: &str) -> NewAssessment {
    NewAssessment::new(assessment_type, json!({ "target": "acme-corp" }))
        .with_source("integration-test")
}

/// Create a record and drive it to PROCESSING.
pub async fn processing(store: &AssessmentStore, request: NewAssessment) -> anyhow::Result<AssessmentRecord> {
    let id = store.create_assessment(request).await?;
    Ok(store.update_state(id, StateUpdate::processing()).await?)
}

/// Create a record and drive it to COMPLETED with `result`.
pub async fn completed(
    store: &AssessmentStore,
    request: NewAssessment,
    result: serde_json::Value,
) -> anyhow::Result<AssessmentRecord> {
    let started = processing(store, request).await?;
    Ok(store
        .update_state(started.id, StateUpdate::completed(result))
        .await?)
}

/// Rewrite timestamps directly, bypassing the store, to simulate old records.
pub async fn backdate(
    store: &AssessmentStore,
    id: AssessmentId,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
) -> anyhow::Result<()> {
    sqlx::query("UPDATE assessments SET created_at = ?1, completed_at = ?2 WHERE id = ?3")
        .bind(created_at.timestamp_millis())
        .bind(completed_at.map(|at| at.timestamp_millis()))
        .bind(id.to_string())
        .execute(store.pool())
        .await?;
    Ok(())
}
