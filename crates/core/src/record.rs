//! Assessment records and the requests that create and mutate them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{AssessmentError, AssessmentResult};
use crate::id::AssessmentId;
use crate::state::AssessmentState;
use crate::version::ExpectedVersion;

/// Largest accepted retry budget.
pub const MAX_RETRIES_LIMIT: u32 = 100;

/// Request to create a new assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAssessment {
    /// Assessment type tag (routes the job to a processor)
    pub assessment_type: String,
    /// Processing options, stored verbatim
    pub options: JsonValue,
    /// Opaque request payload, stored verbatim and never mutated
    pub request_payload: JsonValue,
    /// Lower sorts first when claiming work
    pub priority: i32,
    /// Overall job budget; store default when `None`
    pub timeout_seconds: Option<u32>,
    /// Retry budget; store default when `None`
    pub max_retries: Option<u32>,
    /// Where the request came from (API client, scheduler, ...)
    pub source: Option<String>,
}

impl NewAssessment {
    pub fn new(assessment_type: impl Into<String>, request_payload: JsonValue) -> Self {
        Self {
            assessment_type: assessment_type.into(),
            options: JsonValue::Object(Default::default()),
            request_payload,
            priority: 0,
            timeout_seconds: None,
            max_retries: None,
            source: None,
        }
    }

    pub fn with_options(mut self, options: JsonValue) -> Self {
        self.options = options;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timeout_seconds(mut self, timeout_seconds: u32) -> Self {
        self.timeout_seconds = Some(timeout_seconds);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn validate(&self) -> AssessmentResult<()> {
        if self.assessment_type.trim().is_empty() {
            return Err(AssessmentError::validation("assessment_type must not be empty"));
        }
        if let Some(max) = self.max_retries {
            if max > MAX_RETRIES_LIMIT {
                return Err(AssessmentError::validation(format!(
                    "max_retries must be <= {MAX_RETRIES_LIMIT}, got {max}"
                )));
            }
        }
        if self.timeout_seconds == Some(0) {
            return Err(AssessmentError::validation("timeout_seconds must be > 0"));
        }
        Ok(())
    }
}

/// One submitted job and its current lifecycle position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentRecord {
    pub id: AssessmentId,
    pub assessment_type: String,
    pub options: JsonValue,
    pub state: AssessmentState,
    /// Optimistic-concurrency token; starts at 1, +1 per accepted mutation
    pub version: u64,
    /// Advisory 0-100
    pub progress: u8,
    pub message: String,
    pub request_payload: JsonValue,
    pub result_payload: Option<JsonValue>,
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub priority: i32,
    pub timeout_seconds: u32,
    pub source: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl AssessmentRecord {
    /// Terminal records never change again except through the retention purge.
    pub fn is_terminal(&self) -> bool {
        match self.state {
            AssessmentState::Completed | AssessmentState::Cancelled => true,
            AssessmentState::Failed => !self.can_requeue(),
            AssessmentState::Pending | AssessmentState::Processing => false,
        }
    }

    /// Whether a failure now would be requeued instead of being final.
    pub fn can_requeue(&self) -> bool {
        self.retry_count < self.max_retries
    }

    pub fn status(&self) -> AssessmentStatus {
        AssessmentStatus {
            id: self.id,
            state: self.state,
            version: self.version,
            progress: self.progress,
            message: self.message.clone(),
            last_updated: self.updated_at,
            completed_at: self.completed_at,
        }
    }
}

/// Lightweight view returned by `get_state`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessmentStatus {
    pub id: AssessmentId,
    pub state: AssessmentState,
    pub version: u64,
    pub progress: u8,
    pub message: String,
    pub last_updated: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// A requested state transition.
///
/// `result_payload` is required when moving to COMPLETED and `reason` is
/// required when moving to FAILED (it becomes the stored error message).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    pub new_state: AssessmentState,
    pub expected_version: ExpectedVersion,
    pub result_payload: Option<JsonValue>,
    pub reason: Option<String>,
    pub message: Option<String>,
    pub changed_by: String,
}

impl StateUpdate {
    pub fn to(new_state: AssessmentState) -> Self {
        Self {
            new_state,
            expected_version: ExpectedVersion::Any,
            result_payload: None,
            reason: None,
            message: None,
            changed_by: "processor".to_string(),
        }
    }

    pub fn processing() -> Self {
        Self::to(AssessmentState::Processing)
    }

    pub fn completed(result_payload: JsonValue) -> Self {
        Self::to(AssessmentState::Completed).with_result(result_payload)
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self::to(AssessmentState::Failed).with_reason(reason)
    }

    pub fn expecting(mut self, version: u64) -> Self {
        self.expected_version = ExpectedVersion::Exact(version);
        self
    }

    pub fn with_result(mut self, result_payload: JsonValue) -> Self {
        self.result_payload = Some(result_payload);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn by(mut self, changed_by: impl Into<String>) -> Self {
        self.changed_by = changed_by.into();
        self
    }

    /// Check the payload requirements of the target state.
    pub fn validate(&self, id: AssessmentId) -> AssessmentResult<()> {
        match self.new_state {
            AssessmentState::Completed if self.result_payload.is_none() => Err(
                AssessmentError::validation(format!(
                    "assessment {id}: transition to completed requires a result payload"
                )),
            ),
            AssessmentState::Failed
                if self.reason.as_deref().map_or(true, |r| r.trim().is_empty()) =>
            {
                Err(AssessmentError::validation(format!(
                    "assessment {id}: transition to failed requires an error reason"
                )))
            }
            _ => Ok(()),
        }
    }
}

/// A requeued record whose backoff has elapsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryCandidate {
    pub id: AssessmentId,
    pub retry_count: u32,
    pub next_retry_at: DateTime<Utc>,
    pub error_message: Option<String>,
}
