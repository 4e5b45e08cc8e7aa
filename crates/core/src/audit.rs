//! Audit trail entries.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::AssessmentError;
use crate::id::AssessmentId;
use crate::state::AssessmentState;

/// Short tag describing why a transition happened.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Start,
    Complete,
    Fail,
    Retry,
    Cancel,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Start => "start",
            AuditAction::Complete => "complete",
            AuditAction::Fail => "fail",
            AuditAction::Retry => "retry",
            AuditAction::Cancel => "cancel",
        }
    }
}

impl core::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = AssessmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(AuditAction::Create),
            "start" => Ok(AuditAction::Start),
            "complete" => Ok(AuditAction::Complete),
            "fail" => Ok(AuditAction::Fail),
            "retry" => Ok(AuditAction::Retry),
            "cancel" => Ok(AuditAction::Cancel),
            other => Err(AssessmentError::validation(format!(
                "invalid audit action: {other}"
            ))),
        }
    }
}

/// An audit row ready to be appended (not yet assigned a sequence number).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAuditEntry {
    pub assessment_id: AssessmentId,
    /// `None` for the creation entry
    pub old_state: Option<AssessmentState>,
    pub new_state: AssessmentState,
    /// `0` for the creation entry
    pub version_from: u64,
    pub version_to: u64,
    pub changed_by: String,
    pub reason: Option<String>,
    pub action: AuditAction,
    pub context: JsonValue,
}

impl NewAuditEntry {
    pub fn creation(assessment_id: AssessmentId, changed_by: impl Into<String>, context: JsonValue) -> Self {
        Self {
            assessment_id,
            old_state: None,
            new_state: AssessmentState::Pending,
            version_from: 0,
            version_to: 1,
            changed_by: changed_by.into(),
            reason: None,
            action: AuditAction::Create,
            context,
        }
    }
}

/// A persisted, immutable audit row.
///
/// Sequence numbers are assigned by the backend and increase monotonically, so
/// ordering by `sequence` matches commit order even when `created_at` ties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub sequence: i64,
    pub assessment_id: AssessmentId,
    pub old_state: Option<AssessmentState>,
    pub new_state: AssessmentState,
    pub version_from: u64,
    pub version_to: u64,
    pub changed_by: String,
    pub reason: Option<String>,
    pub action: AuditAction,
    pub context: JsonValue,
    pub created_at: DateTime<Utc>,
}
