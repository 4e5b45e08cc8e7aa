//! Blocking wait-for-completion.

use std::time::Duration;

use serde_json::Value as JsonValue;
use tokio::time::Instant;
use tracing::{debug, instrument};

use assessor_core::{AssessmentError, AssessmentId, AssessmentRecord, AssessmentResult, AssessmentState};

use super::AssessmentStore;

impl AssessmentStore {
    /// Wait until the record reaches a terminal state or `timeout` elapses.
    ///
    /// Re-reads the database every `poll_interval`; nothing is cached between
    /// polls. A record that is already terminal resolves without sleeping. The
    /// timeout only ends this caller's wait and never touches the record.
    ///
    /// - COMPLETED: `Ok(result_payload)`
    /// - FAILED (exhausted): `Err(Failed)` with the stored error message
    /// - CANCELLED: `Err(Cancelled)`
    /// - deadline passed: `Err(Timeout)`
    #[instrument(skip(self), fields(assessment_id = %id, timeout_ms = timeout.as_millis() as u64), err)]
    pub async fn wait_for_completion(
        &self,
        id: AssessmentId,
        timeout: Duration,
    ) -> AssessmentResult<JsonValue> {
        let started = Instant::now();
        let deadline = started + timeout;
        let mut polls: u32 = 0;

        loop {
            let record = self.get_assessment(id).await?;
            if let Some(outcome) = terminal_outcome(&record) {
                return outcome;
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(AssessmentError::Timeout {
                    id,
                    waited_ms: now.duration_since(started).as_millis() as u64,
                    state: record.state,
                });
            }

            polls += 1;
            let nap = self.config().poll_interval.min(deadline - now);
            debug!(assessment_id = %id, state = %record.state, polls, "assessment not finished; polling");
            tokio::time::sleep(nap).await;
        }
    }
}

fn terminal_outcome(record: &AssessmentRecord) -> Option<AssessmentResult<JsonValue>> {
    match record.state {
        AssessmentState::Completed => Some(Ok(record
            .result_payload
            .clone()
            .unwrap_or(JsonValue::Null))),
        AssessmentState::Failed if record.is_terminal() => Some(Err(AssessmentError::Failed {
            id: record.id,
            message: record
                .error_message
                .clone()
                .unwrap_or_else(|| "unknown error".to_string()),
        })),
        AssessmentState::Cancelled => Some(Err(AssessmentError::Cancelled { id: record.id })),
        _ => None,
    }
}
