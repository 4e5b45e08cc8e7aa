//! Read-only aggregate view over all assessment records.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::state::AssessmentState;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssessmentStatistics {
    pub total_count: u64,
    /// Every state is present, zero when no record is in it
    pub count_by_state: BTreeMap<AssessmentState, u64>,
    /// Mean seconds from creation to completion, over COMPLETED and FAILED
    /// records that have a completion time; `None` when there are none
    pub average_processing_secs: Option<f64>,
    /// Records created within the configured recent window
    pub recent_count: u64,
}

impl AssessmentStatistics {
    pub fn count(&self, state: AssessmentState) -> u64 {
        self.count_by_state.get(&state).copied().unwrap_or(0)
    }

    /// Records not yet in a terminal state.
    pub fn in_flight(&self) -> u64 {
        self.count(AssessmentState::Pending) + self.count(AssessmentState::Processing)
    }
}
