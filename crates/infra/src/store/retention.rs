//! Retry polling and the retention purge.

use chrono::Utc;
use sqlx::Row;
use tracing::{info, instrument};

use assessor_core::{AssessmentError, AssessmentResult, AssessmentState, RetryCandidate};

use super::AssessmentStore;
use crate::db::rows::parse_id;
use crate::db::{from_millis, map_sqlx_error, to_millis};

/// States the retention purge may remove.
const TERMINAL_STATES: &str = "('completed', 'failed', 'cancelled')";

impl AssessmentStore {
    /// Requeued records whose backoff has elapsed, earliest first.
    ///
    /// Meant for an external scheduler to poll; it does not claim anything.
    #[instrument(skip(self), err)]
    pub async fn get_assessments_for_retry(&self) -> AssessmentResult<Vec<RetryCandidate>> {
        let rows = sqlx::query(
            r#"
            SELECT id, retry_count, next_retry_at, error_message
            FROM assessments
            WHERE state = ?1
              AND retry_count > 0
              AND next_retry_at IS NOT NULL
              AND next_retry_at <= ?2
            ORDER BY next_retry_at ASC, id ASC
            "#,
        )
        .bind(AssessmentState::Pending.as_str())
        .bind(to_millis(Utc::now()))
        .fetch_all(self.pool())
        .await
        .map_err(|e| map_sqlx_error("get_assessments_for_retry", e))?;

        rows.iter()
            .map(|row| -> AssessmentResult<RetryCandidate> {
                let id: String = row.try_get("id").map_err(decode_error)?;
                let retry_count: i64 = row.try_get("retry_count").map_err(decode_error)?;
                let next_retry_at: i64 = row.try_get("next_retry_at").map_err(decode_error)?;
                Ok(RetryCandidate {
                    id: parse_id(&id)?,
                    retry_count: retry_count as u32,
                    next_retry_at: from_millis("next_retry_at", next_retry_at)?,
                    error_message: row.try_get("error_message").map_err(decode_error)?,
                })
            })
            .collect()
    }

    /// Delete terminal records (and their audit trails) that finished more than
    /// `retention_days` ago. Non-terminal records are never touched, however old.
    #[instrument(skip(self), err)]
    pub async fn cleanup_old_assessments(&self, retention_days: u32) -> AssessmentResult<u64> {
        let Some(cutoff) = chrono::Duration::try_days(i64::from(retention_days))
            .and_then(|window| Utc::now().checked_sub_signed(window))
        else {
            // Earlier than any representable timestamp: nothing can be that old.
            info!(retention_days, "retention window exceeds timestamp range; nothing to purge");
            return Ok(0);
        };

        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let removed = sqlx::query(&format!(
            "DELETE FROM assessments \
             WHERE state IN {TERMINAL_STATES} AND completed_at IS NOT NULL AND completed_at < ?1"
        ))
        .bind(to_millis(cutoff))
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("purge_assessments", e))?
        .rows_affected();

        // Records are only ever deleted here, so orphaned history is exactly
        // the history of what was just purged. The audit delete trigger
        // refuses rows whose record still exists.
        let purged_audit = sqlx::query(
            "DELETE FROM assessment_audit \
             WHERE assessment_id NOT IN (SELECT id FROM assessments)",
        )
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("purge_audit", e))?
        .rows_affected();

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        info!(
            retention_days,
            removed,
            purged_audit,
            cutoff = %cutoff,
            "retention purge finished"
        );
        Ok(removed)
    }
}

fn decode_error(err: sqlx::Error) -> AssessmentError {
    AssessmentError::storage(format!("failed to deserialize retry candidate: {err}"))
}
