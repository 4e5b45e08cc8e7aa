//! Statistics view: aggregate counts and timing derived from persisted records.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::instrument;

use assessor_core::{AssessmentResult, AssessmentState, AssessmentStatistics};

use crate::db::rows::parse_state;
use crate::db::{map_sqlx_error, to_millis};

#[derive(Debug, Clone)]
pub struct StatisticsView {
    pool: SqlitePool,
}

impl StatisticsView {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Counts per state, mean processing time, and records created within `recent_window`.
    ///
    /// Processing time covers COMPLETED and FAILED records that have a
    /// completion timestamp; cancelled work is excluded. All three queries read
    /// one snapshot, so the figures agree with each other under concurrent writes.
    #[instrument(skip(self), err)]
    pub async fn compute(&self, recent_window: Duration) -> AssessmentResult<AssessmentStatistics> {
        let mut stats = AssessmentStatistics::default();
        for state in AssessmentState::ALL {
            stats.count_by_state.insert(state, 0);
        }

        let recent_since = chrono::Duration::from_std(recent_window)
            .ok()
            .and_then(|window| Utc::now().checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let rows = sqlx::query("SELECT state, COUNT(*) AS n FROM assessments GROUP BY state")
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("count_by_state", e))?;
        for row in rows {
            let state: String = row
                .try_get("state")
                .map_err(|e| map_sqlx_error("count_by_state", e))?;
            let n: i64 = row
                .try_get("n")
                .map_err(|e| map_sqlx_error("count_by_state", e))?;
            stats.count_by_state.insert(parse_state(&state)?, n as u64);
            stats.total_count += n as u64;
        }

        let avg_ms: Option<f64> = sqlx::query(
            r#"
            SELECT AVG(completed_at - created_at) AS avg_ms
            FROM assessments
            WHERE state IN (?1, ?2) AND completed_at IS NOT NULL
            "#,
        )
        .bind(AssessmentState::Completed.as_str())
        .bind(AssessmentState::Failed.as_str())
        .fetch_one(&mut *tx)
        .await
        .and_then(|row| row.try_get("avg_ms"))
        .map_err(|e| map_sqlx_error("average_processing_time", e))?;
        stats.average_processing_secs = avg_ms.map(|ms| ms / 1000.0);

        let recent: i64 = sqlx::query("SELECT COUNT(*) AS n FROM assessments WHERE created_at >= ?1")
            .bind(to_millis(recent_since))
            .fetch_one(&mut *tx)
            .await
            .and_then(|row| row.try_get("n"))
            .map_err(|e| map_sqlx_error("recent_count", e))?;
        stats.recent_count = recent as u64;

        // Read-only; nothing to keep.
        tx.rollback()
            .await
            .map_err(|e| map_sqlx_error("end_transaction", e))?;

        Ok(stats)
    }
}
