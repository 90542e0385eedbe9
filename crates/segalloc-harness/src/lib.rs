//! Verification harness for segalloc.
//!
//! This crate provides:
//! - Named deterministic allocation scenarios with pass/fail checks
//! - Seeded churn storms that re-verify conservation and partitioning
//! - Snapshot export with a SHA-256 digest of the canonical JSON
//! - JSONL structured logs, including allocator lifecycle records

#![forbid(unsafe_code)]

pub mod error;
pub mod invariants;
pub mod scenario;
pub mod snapshot_digest;
pub mod storm;
pub mod structured_log;

pub use error::HarnessError;
pub use scenario::{ScenarioCheck, ScenarioKind, ScenarioReport};
pub use storm::{StormConfig, StormReport};
pub use structured_log::{LogEmitter, LogEntry, LogLevel};
