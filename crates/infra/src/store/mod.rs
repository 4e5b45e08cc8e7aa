//! Assessment store.
//!
//! Orchestrates record creation, validated state transitions under optimistic
//! concurrency, queries, cancellation, retention, and the blocking wait protocol.
//!
//! ## Write protocol
//!
//! Every mutation is one SQLite transaction whose first statement is a
//! compare-and-set:
//!
//! ```sql
//! UPDATE assessments SET ..., version = version + 1 WHERE id = ? AND version = ?
//! ```
//!
//! The writer read the record (and validated the transition against it) at the
//! version it guards on, so a matched row means nothing moved in between. Zero
//! rows means another writer got there first (`VersionConflict`) or the record
//! is gone (`NotFound`). The audit row is inserted before commit, so the record
//! and its history land together or not at all. Conflicts are never retried
//! here; the caller re-reads and decides.

mod retention;
mod transition;
mod wait;

pub use transition::CancelOutcome;

use chrono::Utc;
use serde_json::json;
use sqlx::SqlitePool;
use tracing::{info, instrument};

use assessor_core::{
    AssessmentError, AssessmentId, AssessmentRecord, AssessmentResult, AssessmentState,
    AssessmentStatistics, AssessmentStatus, AuditEntry, NewAssessment, NewAuditEntry,
};

use crate::audit::AuditLog;
use crate::config::StoreConfig;
use crate::db::rows::{assessment_from_row, ASSESSMENT_COLUMNS};
use crate::db::{self, map_sqlx_error, to_millis};
use crate::stats::StatisticsView;

/// Actor recorded on the creation audit entry when the request names no source.
const DEFAULT_CREATOR: &str = "intake";

/// Durable assessment state store.
///
/// Cheap to clone; clones share the connection pool. Holds no in-memory state
/// that other processes would need to see.
#[derive(Debug, Clone)]
pub struct AssessmentStore {
    pool: SqlitePool,
    audit: AuditLog,
    stats: StatisticsView,
    config: StoreConfig,
}

impl AssessmentStore {
    /// Open the configured database (bootstrapping the schema) and build a store.
    pub async fn connect(config: StoreConfig) -> AssessmentResult<Self> {
        let pool = db::connect(&config).await?;
        Ok(Self::new(pool, config))
    }

    pub fn new(pool: SqlitePool, config: StoreConfig) -> Self {
        let audit = AuditLog::new(pool.clone());
        Self::from_parts(pool, audit, config)
    }

    /// Build a store around an existing audit log sharing the same pool.
    pub fn from_parts(pool: SqlitePool, audit: AuditLog, config: StoreConfig) -> Self {
        let stats = StatisticsView::new(pool.clone());
        Self {
            pool,
            audit,
            stats,
            config,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Persist a new PENDING record (version 1) and its creation audit entry.
    #[instrument(
        skip(self, request),
        fields(assessment_type = %request.assessment_type, priority = request.priority),
        err
    )]
    pub async fn create_assessment(&self, request: NewAssessment) -> AssessmentResult<AssessmentId> {
        request.validate()?;

        let id = AssessmentId::new();
        let now = Utc::now();
        let max_retries = request.max_retries.unwrap_or(self.config.default_max_retries);
        let timeout_seconds = request
            .timeout_seconds
            .unwrap_or(self.config.default_timeout_seconds);

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query(
            r#"
            INSERT INTO assessments (
                id,
                assessment_type,
                options,
                state,
                version,
                progress,
                message,
                request_payload,
                retry_count,
                max_retries,
                priority,
                timeout_seconds,
                source,
                created_at,
                updated_at
            )
            VALUES (?1, ?2, ?3, ?4, 1, 0, 'queued', ?5, 0, ?6, ?7, ?8, ?9, ?10, ?10)
            "#,
        )
        .bind(id.to_string())
        .bind(&request.assessment_type)
        .bind(request.options.to_string())
        .bind(AssessmentState::Pending.as_str())
        .bind(request.request_payload.to_string())
        .bind(max_retries as i64)
        .bind(request.priority as i64)
        .bind(timeout_seconds as i64)
        .bind(request.source.as_deref())
        .bind(to_millis(now))
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_assessment", e))?;

        let entry = NewAuditEntry::creation(
            id,
            request.source.as_deref().unwrap_or(DEFAULT_CREATOR),
            json!({
                "assessment_type": &request.assessment_type,
                "priority": request.priority,
                "max_retries": max_retries,
                "timeout_seconds": timeout_seconds,
            }),
        );
        self.audit.append(&mut *tx, &entry, now).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        info!(assessment_id = %id, "assessment created");
        Ok(id)
    }

    /// Full record, read from the database.
    #[instrument(skip(self), fields(assessment_id = %id), err)]
    pub async fn get_assessment(&self, id: AssessmentId) -> AssessmentResult<AssessmentRecord> {
        self.fetch(id).await?.ok_or_else(|| AssessmentError::not_found(id))
    }

    #[instrument(skip(self), fields(assessment_id = %id), err)]
    pub async fn get_state(&self, id: AssessmentId) -> AssessmentResult<AssessmentStatus> {
        Ok(self.get_assessment(id).await?.status())
    }

    /// Page through records ordered by creation time (oldest first).
    #[instrument(skip(self), err)]
    pub async fn list_assessments(
        &self,
        state: Option<AssessmentState>,
        limit: u32,
        offset: u32,
    ) -> AssessmentResult<Vec<AssessmentRecord>> {
        let sql = format!(
            "SELECT {ASSESSMENT_COLUMNS} FROM assessments \
             WHERE (?1 IS NULL OR state = ?1) \
             ORDER BY created_at ASC, id ASC \
             LIMIT ?2 OFFSET ?3"
        );
        let rows = sqlx::query(&sql)
            .bind(state.map(|s| s.as_str()))
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_assessments", e))?;

        rows.iter().map(assessment_from_row).collect()
    }

    pub async fn get_statistics(&self) -> AssessmentResult<AssessmentStatistics> {
        self.stats.compute(self.config.recent_window).await
    }

    pub async fn get_assessment_audit_trail(
        &self,
        id: AssessmentId,
    ) -> AssessmentResult<Vec<AuditEntry>> {
        self.audit.read_trail(id).await
    }

    async fn fetch(&self, id: AssessmentId) -> AssessmentResult<Option<AssessmentRecord>> {
        let sql = format!("SELECT {ASSESSMENT_COLUMNS} FROM assessments WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_assessment", e))?;

        row.as_ref().map(assessment_from_row).transpose()
    }
}
