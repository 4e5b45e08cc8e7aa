//! Schema bootstrap.
//!
//! Idempotent: every statement is `IF NOT EXISTS`, so concurrent processes can
//! all run it on startup.

use sqlx::SqlitePool;

use assessor_core::AssessmentResult;

use super::map_sqlx_error;

/// Timestamps are unix epoch milliseconds; payloads are JSON text.
const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS assessments (
        id               TEXT PRIMARY KEY,
        assessment_type  TEXT NOT NULL,
        options          TEXT NOT NULL,
        state            TEXT NOT NULL
                         CHECK (state IN ('pending', 'processing', 'completed', 'failed', 'cancelled')),
        version          INTEGER NOT NULL CHECK (version >= 1),
        progress         INTEGER NOT NULL DEFAULT 0 CHECK (progress BETWEEN 0 AND 100),
        message          TEXT NOT NULL DEFAULT '',
        request_payload  TEXT NOT NULL,
        result_payload   TEXT NULL,
        error_message    TEXT NULL,
        retry_count      INTEGER NOT NULL DEFAULT 0 CHECK (retry_count >= 0),
        max_retries      INTEGER NOT NULL CHECK (max_retries >= 0),
        next_retry_at    INTEGER NULL,
        priority         INTEGER NOT NULL DEFAULT 0,
        timeout_seconds  INTEGER NOT NULL,
        source           TEXT NULL,
        created_at       INTEGER NOT NULL,
        updated_at       INTEGER NOT NULL,
        completed_at     INTEGER NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_assessments_state_created ON assessments (state, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_assessments_next_retry ON assessments (next_retry_at) WHERE next_retry_at IS NOT NULL",
    "CREATE INDEX IF NOT EXISTS idx_assessments_state_completed ON assessments (state, completed_at)",
    "CREATE INDEX IF NOT EXISTS idx_assessments_claim ON assessments (state, priority, created_at)",
    r#"
    CREATE TABLE IF NOT EXISTS assessment_audit (
        sequence       INTEGER PRIMARY KEY AUTOINCREMENT,
        assessment_id  TEXT NOT NULL,
        old_state      TEXT NULL,
        new_state      TEXT NOT NULL,
        version_from   INTEGER NOT NULL,
        version_to     INTEGER NOT NULL CHECK (version_to = version_from + 1),
        changed_by     TEXT NOT NULL,
        reason         TEXT NULL,
        action         TEXT NOT NULL,
        context        TEXT NOT NULL,
        created_at     INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_assessment_audit_assessment ON assessment_audit (assessment_id, created_at)",
    r#"
    CREATE TRIGGER IF NOT EXISTS assessment_audit_immutable
    BEFORE UPDATE ON assessment_audit
    BEGIN
        SELECT RAISE(ABORT, 'assessment_audit rows are append-only');
    END
    "#,
    r#"
    CREATE TRIGGER IF NOT EXISTS assessment_audit_retained
    BEFORE DELETE ON assessment_audit
    WHEN EXISTS (SELECT 1 FROM assessments WHERE id = OLD.assessment_id)
    BEGIN
        SELECT RAISE(ABORT, 'assessment_audit rows outlive their assessment');
    END
    "#,
];

pub async fn ensure_schema(pool: &SqlitePool) -> AssessmentResult<()> {
    for statement in STATEMENTS {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
    }
    Ok(())
}
