//! State transitions: the compare-and-set write path.

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{info, instrument, warn};

use assessor_core::{
    AssessmentError, AssessmentId, AssessmentRecord, AssessmentResult, AssessmentState,
    AuditAction, ExpectedVersion, NewAuditEntry, RetryDecision, StateUpdate,
};

use super::AssessmentStore;
use crate::db::rows::{assessment_from_row, ASSESSMENT_COLUMNS};
use crate::db::{map_sqlx_error, to_millis};

/// Actor recorded when a caller cancels without naming itself.
const DEFAULT_CANCELLER: &str = "caller";

/// What `cancel_assessment` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    /// The record had already reached a terminal state; nothing changed
    AlreadyTerminal(AssessmentState),
}

impl AssessmentStore {
    /// Move a record along one edge of the transition graph.
    ///
    /// - COMPLETED requires a result payload; sets `completed_at` and progress 100.
    /// - FAILED requires a reason. With retry budget left the record is requeued
    ///   to PENDING instead (`retry_count + 1`, `next_retry_at` from the retry
    ///   policy, progress reset to 0) as one audited mutation tagged `retry`.
    ///
    /// Returns the record as written.
    #[instrument(
        skip(self, update),
        fields(
            assessment_id = %id,
            to_state = %update.new_state,
            expected_version = ?update.expected_version
        ),
        err
    )]
    pub async fn update_state(
        &self,
        id: AssessmentId,
        update: StateUpdate,
    ) -> AssessmentResult<AssessmentRecord> {
        update.validate(id)?;

        let current = self.get_assessment(id).await?;
        update.expected_version.check(id, current.version)?;
        ensure_transition(&current, update.new_state)?;

        let now = Utc::now();
        let (next, entry) = self.plan(&current, &update, now)?;
        self.commit(&current, &next, Some(&entry), now).await?;

        if entry.action == AuditAction::Retry {
            warn!(
                assessment_id = %id,
                retry_count = next.retry_count,
                max_retries = next.max_retries,
                next_retry_at = ?next.next_retry_at,
                "assessment failed; retry scheduled"
            );
        } else {
            info!(
                assessment_id = %id,
                from_state = %current.state,
                to_state = %next.state,
                version = next.version,
                "assessment transitioned"
            );
        }
        Ok(next)
    }

    /// Cancel a PENDING or PROCESSING record.
    ///
    /// Cancelling a record that is already terminal is a no-op, not an error:
    /// cancellation races with completion and losing that race is benign.
    #[instrument(skip(self, reason), fields(assessment_id = %id), err)]
    pub async fn cancel_assessment(
        &self,
        id: AssessmentId,
        reason: Option<&str>,
    ) -> AssessmentResult<CancelOutcome> {
        let current = self.get_assessment(id).await?;
        if !current.state.is_cancellable() {
            warn!(assessment_id = %id, state = %current.state, "cancel ignored; assessment already terminal");
            return Ok(CancelOutcome::AlreadyTerminal(current.state));
        }

        let mut update = StateUpdate::to(AssessmentState::Cancelled)
            .expecting(current.version)
            .by(DEFAULT_CANCELLER);
        if let Some(reason) = reason {
            update = update.with_reason(reason);
        }

        let now = Utc::now();
        let (next, entry) = self.plan(&current, &update, now)?;
        match self.commit(&current, &next, Some(&entry), now).await {
            Ok(()) => {
                info!(assessment_id = %id, from_state = %current.state, "assessment cancelled");
                Ok(CancelOutcome::Cancelled)
            }
            Err(AssessmentError::VersionConflict { .. }) => {
                // Lost the race; only benign if the winner finished the job.
                let latest = self.get_assessment(id).await?;
                if latest.state.is_cancellable() {
                    return Err(AssessmentError::version_conflict(
                        id,
                        current.version,
                        latest.version,
                    ));
                }
                warn!(assessment_id = %id, state = %latest.state, "cancel lost race with a terminal transition");
                Ok(CancelOutcome::AlreadyTerminal(latest.state))
            }
            Err(err) => Err(err),
        }
    }

    /// Advisory progress report from the processor holding a PROCESSING record.
    ///
    /// Bumps `version` (it is a mutation) but writes no audit row, since the
    /// state does not change.
    #[instrument(skip(self, message), fields(assessment_id = %id), err)]
    pub async fn report_progress(
        &self,
        id: AssessmentId,
        expected_version: ExpectedVersion,
        progress: u8,
        message: &str,
    ) -> AssessmentResult<AssessmentRecord> {
        if progress > 100 {
            return Err(AssessmentError::validation(format!(
                "assessment {id}: progress must be 0-100, got {progress}"
            )));
        }

        let current = self.get_assessment(id).await?;
        expected_version.check(id, current.version)?;
        if current.state != AssessmentState::Processing {
            return Err(AssessmentError::validation(format!(
                "assessment {id}: progress can only be reported while processing (state: {})",
                current.state
            )));
        }
        if progress < current.progress {
            warn!(
                assessment_id = %id,
                previous = current.progress,
                reported = progress,
                "progress regressed"
            );
        }

        let now = Utc::now();
        let mut next = current.clone();
        next.progress = progress;
        next.message = message.to_string();
        next.version = current.version + 1;
        next.updated_at = now;

        self.commit(&current, &next, None, now).await?;
        Ok(next)
    }

    /// Claim the next ready PENDING record for `worker`, moving it to PROCESSING.
    ///
    /// Ordered by priority (lower first), then creation time. Records waiting out
    /// a retry backoff are skipped until `next_retry_at` elapses. Two workers
    /// racing for the same record both go through compare-and-set; the loser gets
    /// `VersionConflict` and may simply claim again.
    #[instrument(skip(self), err)]
    pub async fn claim_next(&self, worker: &str) -> AssessmentResult<Option<AssessmentRecord>> {
        let now = Utc::now();
        let sql = format!(
            "SELECT {ASSESSMENT_COLUMNS} FROM assessments \
             WHERE state = ?1 AND (next_retry_at IS NULL OR next_retry_at <= ?2) \
             ORDER BY priority ASC, created_at ASC, id ASC \
             LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(AssessmentState::Pending.as_str())
            .bind(to_millis(now))
            .fetch_optional(self.pool())
            .await
            .map_err(|e| map_sqlx_error("claim_next", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let current = assessment_from_row(&row)?;

        let update = StateUpdate::processing()
            .expecting(current.version)
            .with_message(format!("claimed by {worker}"))
            .by(worker);
        let (next, entry) = self.plan(&current, &update, now)?;
        self.commit(&current, &next, Some(&entry), now).await?;

        info!(assessment_id = %current.id, worker, "assessment claimed");
        Ok(Some(next))
    }

    /// Compute the record as it will look after `update`, plus its audit row.
    fn plan(
        &self,
        current: &AssessmentRecord,
        update: &StateUpdate,
        now: DateTime<Utc>,
    ) -> AssessmentResult<(AssessmentRecord, NewAuditEntry)> {
        let mut next = current.clone();
        next.version = current.version + 1;
        next.updated_at = now;

        let mut action = update.new_state.entry_action();
        let mut context = json!({});

        match update.new_state {
            AssessmentState::Processing => {
                next.state = AssessmentState::Processing;
                next.next_retry_at = None;
                next.message = update.message.clone().unwrap_or_else(|| "processing".to_string());
            }
            AssessmentState::Completed => {
                next.state = AssessmentState::Completed;
                next.result_payload = update.result_payload.clone();
                next.progress = 100;
                next.completed_at = Some(now);
                next.next_retry_at = None;
                next.message = update.message.clone().unwrap_or_else(|| "completed".to_string());
            }
            AssessmentState::Failed => {
                let error = update.reason.clone().unwrap_or_default();
                next.error_message = Some(error.clone());
                match self
                    .config()
                    .retry_policy
                    .decide(current.retry_count, current.max_retries, now)
                {
                    RetryDecision::RetryAt(at) => {
                        next.state = AssessmentState::Pending;
                        next.retry_count = current.retry_count + 1;
                        next.next_retry_at = Some(at);
                        next.progress = 0;
                        next.message = format!(
                            "retry {} of {} scheduled",
                            next.retry_count, current.max_retries
                        );
                        action = AuditAction::Retry;
                        context = json!({
                            "error": error,
                            "retry_count": next.retry_count,
                            "next_retry_at": at.to_rfc3339(),
                        });
                    }
                    RetryDecision::Exhausted => {
                        next.state = AssessmentState::Failed;
                        next.completed_at = Some(now);
                        next.next_retry_at = None;
                        next.message = update.message.clone().unwrap_or_else(|| "failed".to_string());
                        context = json!({
                            "error": error,
                            "retry_count": current.retry_count,
                        });
                    }
                }
            }
            AssessmentState::Cancelled => {
                next.state = AssessmentState::Cancelled;
                next.completed_at = Some(now);
                next.next_retry_at = None;
                next.message = update.message.clone().unwrap_or_else(|| "cancelled".to_string());
            }
            // Requeue happens inside the FAILED arm above; never on request.
            AssessmentState::Pending => {
                return Err(AssessmentError::invalid_transition(
                    current.id,
                    current.state,
                    AssessmentState::Pending,
                ));
            }
        }

        let entry = NewAuditEntry {
            assessment_id: current.id,
            old_state: Some(current.state),
            new_state: next.state,
            version_from: current.version,
            version_to: next.version,
            changed_by: update.changed_by.clone(),
            reason: update.reason.clone(),
            action,
            context,
        };
        Ok((next, entry))
    }

    /// Compare-and-set `next` over `current`, appending `entry` in the same transaction.
    async fn commit(
        &self,
        current: &AssessmentRecord,
        next: &AssessmentRecord,
        entry: Option<&NewAuditEntry>,
        now: DateTime<Utc>,
    ) -> AssessmentResult<()> {
        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        // First statement of the transaction takes the write lock directly.
        let result = sqlx::query(
            r#"
            UPDATE assessments
            SET state = ?1,
                version = version + 1,
                progress = ?2,
                message = ?3,
                result_payload = ?4,
                error_message = ?5,
                retry_count = ?6,
                next_retry_at = ?7,
                updated_at = ?8,
                completed_at = ?9
            WHERE id = ?10 AND version = ?11
            "#,
        )
        .bind(next.state.as_str())
        .bind(next.progress as i64)
        .bind(&next.message)
        .bind(next.result_payload.as_ref().map(|v| v.to_string()))
        .bind(next.error_message.as_deref())
        .bind(next.retry_count as i64)
        .bind(next.next_retry_at.map(to_millis))
        .bind(to_millis(now))
        .bind(next.completed_at.map(to_millis))
        .bind(current.id.to_string())
        .bind(current.version as i64)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("compare_and_set", e))?;

        if result.rows_affected() == 0 {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(match self.fetch(current.id).await? {
                None => AssessmentError::not_found(current.id),
                Some(latest) => {
                    AssessmentError::version_conflict(current.id, current.version, latest.version)
                }
            });
        }

        if let Some(entry) = entry {
            self.audit_log().append(&mut *tx, entry, now).await?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }
}

/// Reject requests that are not an edge of the transition graph.
///
/// FAILED -> PENDING is an edge, but only the failure path takes it: a stored
/// FAILED record has no retry budget left, so a request for PENDING is refused.
fn ensure_transition(current: &AssessmentRecord, to: AssessmentState) -> AssessmentResult<()> {
    let allowed = current.state.can_transition_to(to) && to != AssessmentState::Pending;
    if allowed {
        Ok(())
    } else {
        Err(AssessmentError::invalid_transition(current.id, current.state, to))
    }
}
