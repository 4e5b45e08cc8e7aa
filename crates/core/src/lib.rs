//! `assessor-core`: domain building blocks for the assessment state store.
//!
//! This crate contains **pure domain** types (no infrastructure concerns): the
//! lifecycle state machine, the optimistic-concurrency token, the retry
//! scheduler and the error taxonomy shared by every store backend.

pub mod audit;
pub mod error;
pub mod id;
pub mod record;
pub mod retry;
pub mod state;
pub mod stats;
pub mod version;

pub use audit::{AuditAction, AuditEntry, NewAuditEntry};
pub use error::{AssessmentError, AssessmentResult, ErrorKind};
pub use id::AssessmentId;
pub use record::{AssessmentRecord, AssessmentStatus, NewAssessment, RetryCandidate, StateUpdate};
pub use retry::{RetryDecision, RetryPolicy};
pub use state::AssessmentState;
pub use stats::AssessmentStatistics;
pub use version::ExpectedVersion;
