//! Append-only audit log.
//!
//! One row per accepted state transition, written inside the same transaction
//! as the record update so the record and its history never diverge. Rows are
//! not linked to `assessments` by a foreign key: history outlives the record
//! until the retention purge removes both together.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, instrument};

use assessor_core::{AssessmentId, AssessmentResult, AuditEntry, NewAuditEntry};

use crate::db::rows::{audit_from_row, AUDIT_COLUMNS};
use crate::db::{map_sqlx_error, to_millis};

#[derive(Debug, Clone)]
pub struct AuditLog {
    pool: SqlitePool,
}

impl AuditLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append one entry on the caller's open transaction.
    ///
    /// Only the store calls this; it never commits on its own.
    pub(crate) async fn append(
        &self,
        conn: &mut SqliteConnection,
        entry: &NewAuditEntry,
        at: DateTime<Utc>,
    ) -> AssessmentResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO assessment_audit (
                assessment_id,
                old_state,
                new_state,
                version_from,
                version_to,
                changed_by,
                reason,
                action,
                context,
                created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(entry.assessment_id.to_string())
        .bind(entry.old_state.map(|s| s.as_str()))
        .bind(entry.new_state.as_str())
        .bind(entry.version_from as i64)
        .bind(entry.version_to as i64)
        .bind(&entry.changed_by)
        .bind(entry.reason.as_deref())
        .bind(entry.action.as_str())
        .bind(entry.context.to_string())
        .bind(to_millis(at))
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("append_audit", e))?;

        let sequence = result.last_insert_rowid();
        debug!(
            assessment_id = %entry.assessment_id,
            action = %entry.action,
            sequence,
            "audit entry appended"
        );
        Ok(sequence)
    }

    /// Full history for one assessment, oldest first.
    ///
    /// Returns an empty trail for unknown ids (the record may have been purged).
    #[instrument(skip(self), fields(assessment_id = %id), err)]
    pub async fn read_trail(&self, id: AssessmentId) -> AssessmentResult<Vec<AuditEntry>> {
        let sql = format!(
            "SELECT {AUDIT_COLUMNS} FROM assessment_audit WHERE assessment_id = ?1 ORDER BY sequence ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("read_trail", e))?;

        rows.iter().map(audit_from_row).collect()
    }
}
