//! Assessment error model.

use thiserror::Error;

use crate::id::AssessmentId;
use crate::state::AssessmentState;

/// Result type used across the assessment store.
pub type AssessmentResult<T> = Result<T, AssessmentError>;

/// Assessment store error.
///
/// Every variant carries enough context (assessment id, current state, attempted
/// state or version) for a caller to decide whether to retry, abandon, or escalate.
///
/// ## Retry policy
///
/// - `InvalidTransition` and `VersionConflict` are never retried inside the store;
///   re-read and decide at the caller.
/// - `StorageUnavailable` may be retried by the caller with backoff.
/// - `Timeout` only ends the caller's wait; the underlying job keeps running.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AssessmentError {
    #[error("assessment not found: {id}")]
    NotFound { id: AssessmentId },

    #[error("invalid transition for assessment {id}: {from} -> {to}")]
    InvalidTransition {
        id: AssessmentId,
        from: AssessmentState,
        to: AssessmentState,
    },

    #[error("version conflict on assessment {id}: expected version {expected}, found {actual}")]
    VersionConflict {
        id: AssessmentId,
        expected: u64,
        actual: u64,
    },

    #[error("timed out after {waited_ms}ms waiting for assessment {id} (last state: {state})")]
    Timeout {
        id: AssessmentId,
        waited_ms: u64,
        state: AssessmentState,
    },

    #[error("assessment {id} failed: {message}")]
    Failed { id: AssessmentId, message: String },

    #[error("assessment {id} was cancelled")]
    Cancelled { id: AssessmentId },

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A request was malformed (missing result payload, missing error reason, ...).
    #[error("validation failed: {0}")]
    Validation(String),
}

/// Copyable tag naming the taxonomy kind of an [`AssessmentError`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    InvalidTransition,
    VersionConflict,
    Timeout,
    Failed,
    Cancelled,
    StorageUnavailable,
    Validation,
}

impl AssessmentError {
    pub fn not_found(id: AssessmentId) -> Self {
        Self::NotFound { id }
    }

    pub fn invalid_transition(id: AssessmentId, from: AssessmentState, to: AssessmentState) -> Self {
        Self::InvalidTransition { id, from, to }
    }

    pub fn version_conflict(id: AssessmentId, expected: u64, actual: u64) -> Self {
        Self::VersionConflict {
            id,
            expected,
            actual,
        }
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::StorageUnavailable(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::VersionConflict { .. } => ErrorKind::VersionConflict,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Failed { .. } => ErrorKind::Failed,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::StorageUnavailable(_) => ErrorKind::StorageUnavailable,
            Self::Validation(_) => ErrorKind::Validation,
        }
    }

    /// Whether a caller may retry the same request unchanged after backing off.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_))
    }

    /// The assessment this error refers to, if any.
    pub fn assessment_id(&self) -> Option<AssessmentId> {
        match self {
            Self::NotFound { id }
            | Self::InvalidTransition { id, .. }
            | Self::VersionConflict { id, .. }
            | Self::Timeout { id, .. }
            | Self::Failed { id, .. }
            | Self::Cancelled { id } => Some(*id),
            Self::StorageUnavailable(_) | Self::Validation(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_context() {
        let id = AssessmentId::new();
        let err = AssessmentError::invalid_transition(
            id,
            AssessmentState::Completed,
            AssessmentState::Processing,
        );
        let msg = err.to_string();
        assert!(msg.contains(&id.to_string()));
        assert!(msg.contains("completed -> processing"));
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
        assert_eq!(err.assessment_id(), Some(id));
    }

    #[test]
    fn only_storage_errors_are_retryable() {
        let id = AssessmentId::new();
        assert!(AssessmentError::storage("database is locked").is_retryable());
        assert!(!AssessmentError::version_conflict(id, 2, 3).is_retryable());
        assert!(!AssessmentError::not_found(id).is_retryable());
        assert!(!AssessmentError::validation("missing payload").is_retryable());
    }
}
