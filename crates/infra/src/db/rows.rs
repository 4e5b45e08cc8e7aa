//! SQLx row types and their conversion into domain records.

use std::str::FromStr;

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};
use uuid::Uuid;

use assessor_core::{
    AssessmentError, AssessmentId, AssessmentRecord, AssessmentResult, AssessmentState,
    AuditAction, AuditEntry,
};

use super::from_millis;

/// Column list matching [`AssessmentRow`].
pub(crate) const ASSESSMENT_COLUMNS: &str = "id, assessment_type, options, state, version, progress, message, \
     request_payload, result_payload, error_message, retry_count, max_retries, next_retry_at, \
     priority, timeout_seconds, source, created_at, updated_at, completed_at";

/// Column list matching [`AuditRow`].
pub(crate) const AUDIT_COLUMNS: &str = "sequence, assessment_id, old_state, new_state, version_from, \
     version_to, changed_by, reason, action, context, created_at";

#[derive(Debug)]
pub(crate) struct AssessmentRow {
    id: String,
    assessment_type: String,
    options: String,
    state: String,
    version: i64,
    progress: i64,
    message: String,
    request_payload: String,
    result_payload: Option<String>,
    error_message: Option<String>,
    retry_count: i64,
    max_retries: i64,
    next_retry_at: Option<i64>,
    priority: i64,
    timeout_seconds: i64,
    source: Option<String>,
    created_at: i64,
    updated_at: i64,
    completed_at: Option<i64>,
}

impl<'r> FromRow<'r, SqliteRow> for AssessmentRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(AssessmentRow {
            id: row.try_get("id")?,
            assessment_type: row.try_get("assessment_type")?,
            options: row.try_get("options")?,
            state: row.try_get("state")?,
            version: row.try_get("version")?,
            progress: row.try_get("progress")?,
            message: row.try_get("message")?,
            request_payload: row.try_get("request_payload")?,
            result_payload: row.try_get("result_payload")?,
            error_message: row.try_get("error_message")?,
            retry_count: row.try_get("retry_count")?,
            max_retries: row.try_get("max_retries")?,
            next_retry_at: row.try_get("next_retry_at")?,
            priority: row.try_get("priority")?,
            timeout_seconds: row.try_get("timeout_seconds")?,
            source: row.try_get("source")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }
}

impl TryFrom<AssessmentRow> for AssessmentRecord {
    type Error = AssessmentError;

    fn try_from(row: AssessmentRow) -> AssessmentResult<Self> {
        Ok(AssessmentRecord {
            id: parse_id(&row.id)?,
            assessment_type: row.assessment_type,
            options: parse_json("options", &row.options)?,
            state: parse_state(&row.state)?,
            version: row.version as u64,
            progress: row.progress.clamp(0, 100) as u8,
            message: row.message,
            request_payload: parse_json("request_payload", &row.request_payload)?,
            result_payload: row
                .result_payload
                .as_deref()
                .map(|raw| parse_json("result_payload", raw))
                .transpose()?,
            error_message: row.error_message,
            retry_count: row.retry_count as u32,
            max_retries: row.max_retries as u32,
            next_retry_at: row
                .next_retry_at
                .map(|ms| from_millis("next_retry_at", ms))
                .transpose()?,
            priority: row.priority as i32,
            timeout_seconds: row.timeout_seconds as u32,
            source: row.source,
            created_at: from_millis("created_at", row.created_at)?,
            updated_at: from_millis("updated_at", row.updated_at)?,
            completed_at: row
                .completed_at
                .map(|ms| from_millis("completed_at", ms))
                .transpose()?,
        })
    }
}

#[derive(Debug)]
pub(crate) struct AuditRow {
    sequence: i64,
    assessment_id: String,
    old_state: Option<String>,
    new_state: String,
    version_from: i64,
    version_to: i64,
    changed_by: String,
    reason: Option<String>,
    action: String,
    context: String,
    created_at: i64,
}

impl<'r> FromRow<'r, SqliteRow> for AuditRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(AuditRow {
            sequence: row.try_get("sequence")?,
            assessment_id: row.try_get("assessment_id")?,
            old_state: row.try_get("old_state")?,
            new_state: row.try_get("new_state")?,
            version_from: row.try_get("version_from")?,
            version_to: row.try_get("version_to")?,
            changed_by: row.try_get("changed_by")?,
            reason: row.try_get("reason")?,
            action: row.try_get("action")?,
            context: row.try_get("context")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<AuditRow> for AuditEntry {
    type Error = AssessmentError;

    fn try_from(row: AuditRow) -> AssessmentResult<Self> {
        Ok(AuditEntry {
            sequence: row.sequence,
            assessment_id: parse_id(&row.assessment_id)?,
            old_state: row.old_state.as_deref().map(parse_state).transpose()?,
            new_state: parse_state(&row.new_state)?,
            version_from: row.version_from as u64,
            version_to: row.version_to as u64,
            changed_by: row.changed_by,
            reason: row.reason,
            action: AuditAction::from_str(&row.action).map_err(corrupt)?,
            context: parse_json("context", &row.context)?,
            created_at: from_millis("created_at", row.created_at)?,
        })
    }
}

/// Decode a full assessment row.
pub(crate) fn assessment_from_row(row: &SqliteRow) -> AssessmentResult<AssessmentRecord> {
    let raw = AssessmentRow::from_row(row)
        .map_err(|e| AssessmentError::storage(format!("failed to deserialize assessment row: {e}")))?;
    raw.try_into()
}

/// Decode a full audit row.
pub(crate) fn audit_from_row(row: &SqliteRow) -> AssessmentResult<AuditEntry> {
    let raw = AuditRow::from_row(row)
        .map_err(|e| AssessmentError::storage(format!("failed to deserialize audit row: {e}")))?;
    raw.try_into()
}

pub(crate) fn parse_id(raw: &str) -> AssessmentResult<AssessmentId> {
    Uuid::from_str(raw)
        .map(AssessmentId::from_uuid)
        .map_err(|e| AssessmentError::storage(format!("stored id {raw:?} is not a uuid: {e}")))
}

pub(crate) fn parse_state(raw: &str) -> AssessmentResult<AssessmentState> {
    AssessmentState::from_str(raw).map_err(corrupt)
}

fn parse_json(column: &str, raw: &str) -> AssessmentResult<serde_json::Value> {
    serde_json::from_str(raw)
        .map_err(|e| AssessmentError::storage(format!("stored {column} is not valid json: {e}")))
}

/// A value that made it into the database but no longer parses is a storage
/// fault, not a caller validation error.
fn corrupt(err: AssessmentError) -> AssessmentError {
    AssessmentError::storage(format!("corrupt row: {err}"))
}
