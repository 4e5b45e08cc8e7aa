//! Strongly-typed assessment identifier.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AssessmentError;

/// Identifier of an assessment record.
///
/// Uses UUIDv7 so identifiers sort roughly by creation time, which keeps
/// `(created_at, id)` ordering stable for records created in the same millisecond.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssessmentId(Uuid);

impl AssessmentId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for AssessmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for AssessmentId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<Uuid> for AssessmentId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<AssessmentId> for Uuid {
    fn from(value: AssessmentId) -> Self {
        value.0
    }
}

impl FromStr for AssessmentId {
    type Err = AssessmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = Uuid::from_str(s)
            .map_err(|e| AssessmentError::validation(format!("AssessmentId: {e}")))?;
        Ok(Self(uuid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_display() {
        let id = AssessmentId::new();
        let parsed: AssessmentId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn rejects_garbage() {
        let err = "not-a-uuid".parse::<AssessmentId>().unwrap_err();
        assert!(matches!(err, AssessmentError::Validation(_)));
    }
}
