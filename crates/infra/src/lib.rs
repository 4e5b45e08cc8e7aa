//! Infrastructure layer: SQLite persistence, audit log, and the assessment store.
//!
//! ## Components
//!
//! - `config`: `StoreConfig` (pool sizing, wait polling, retry defaults)
//! - `db`: connection pool, schema bootstrap, row mapping, sqlx error mapping
//! - `audit`: append-only `AuditLog` bound to the store's write transactions
//! - `store`: `AssessmentStore`, the state machine under optimistic concurrency
//! - `stats`: read-only aggregate counts and timings

pub mod audit;
pub mod config;
pub mod db;
pub mod stats;
pub mod store;

pub use audit::AuditLog;
pub use config::{ConfigError, StoreConfig};
pub use store::{AssessmentStore, CancelOutcome};
