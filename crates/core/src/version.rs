//! Optimistic-concurrency token.

use serde::{Deserialize, Serialize};

use crate::error::{AssessmentError, AssessmentResult};
use crate::id::AssessmentId;

/// Version a writer expects a record to be at when its update lands.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedVersion {
    /// Compare-and-set against whatever version the store reads at call time.
    ///
    /// Still rejects a writer that races another writer between that read and
    /// its own write; it only skips the check against the caller's earlier read.
    Any,
    /// Require the record to be at an exact version.
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

    pub fn check(self, id: AssessmentId, actual: u64) -> AssessmentResult<()> {
        match self {
            _ if self.matches(actual) => Ok(()),
            ExpectedVersion::Exact(expected) => {
                Err(AssessmentError::version_conflict(id, expected, actual))
            }
            ExpectedVersion::Any => Ok(()),
        }
    }
}

impl From<u64> for ExpectedVersion {
    fn from(value: u64) -> Self {
        ExpectedVersion::Exact(value)
    }
}
