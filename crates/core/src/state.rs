//! Assessment lifecycle state machine.
//!
//! ```text
//! PENDING    -> PROCESSING | CANCELLED
//! PROCESSING -> COMPLETED | FAILED | CANCELLED
//! FAILED     -> PENDING            (only while retry_count < max_retries)
//! COMPLETED, CANCELLED             (terminal)
//! ```
//!
//! The store never leaves a record sitting in FAILED while retries remain: a
//! failure with budget left is requeued to PENDING in the same transaction. A
//! persisted FAILED record is therefore always exhausted, which is why
//! [`AssessmentState::is_terminal`] treats it as terminal.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::audit::AuditAction;
use crate::error::AssessmentError;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentState {
    /// Queued, waiting for a processor to claim it
    Pending,
    /// Claimed by a processor
    Processing,
    /// Finished successfully; carries a result payload
    Completed,
    /// Failed after exhausting its retry budget
    Failed,
    /// Cancelled by a caller before completion
    Cancelled,
}

impl AssessmentState {
    pub const ALL: [AssessmentState; 5] = [
        AssessmentState::Pending,
        AssessmentState::Processing,
        AssessmentState::Completed,
        AssessmentState::Failed,
        AssessmentState::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssessmentState::Pending => "pending",
            AssessmentState::Processing => "processing",
            AssessmentState::Completed => "completed",
            AssessmentState::Failed => "failed",
            AssessmentState::Cancelled => "cancelled",
        }
    }

    /// Whether `next` is an edge of the transition graph.
    ///
    /// FAILED -> PENDING is listed here; the retry budget guard lives with the
    /// record (see `AssessmentRecord::can_requeue`).
    pub fn can_transition_to(self, next: AssessmentState) -> bool {
        use AssessmentState::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Cancelled)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Cancelled)
                | (Failed, Pending)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AssessmentState::Completed | AssessmentState::Failed | AssessmentState::Cancelled
        )
    }

    pub fn is_cancellable(self) -> bool {
        matches!(self, AssessmentState::Pending | AssessmentState::Processing)
    }

    /// Audit tag recorded when a record enters this state.
    pub fn entry_action(self) -> AuditAction {
        match self {
            AssessmentState::Pending => AuditAction::Retry,
            AssessmentState::Processing => AuditAction::Start,
            AssessmentState::Completed => AuditAction::Complete,
            AssessmentState::Failed => AuditAction::Fail,
            AssessmentState::Cancelled => AuditAction::Cancel,
        }
    }
}

impl core::fmt::Display for AssessmentState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssessmentState {
    type Err = AssessmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AssessmentState::Pending),
            "processing" => Ok(AssessmentState::Processing),
            "completed" => Ok(AssessmentState::Completed),
            "failed" => Ok(AssessmentState::Failed),
            "cancelled" => Ok(AssessmentState::Cancelled),
            other => Err(AssessmentError::validation(format!(
                "invalid assessment state: {other}"
            ))),
        }
    }
}
