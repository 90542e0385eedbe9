use segalloc_core::{ConfigError, SnapshotError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("allocator config: {0}")]
    Config(#[from] ConfigError),
    #[error("snapshot: {0}")]
    Snapshot(#[from] SnapshotError),
    #[error("unknown scenario `{0}` (expected one of: {1})")]
    UnknownScenario(String, &'static str),
    #[error("snapshot digest mismatch: expected={expected}, actual={actual}")]
    DigestMismatch { expected: String, actual: String },
    #[error("invariant violated at step {step}: {detail}")]
    Invariant { step: usize, detail: String },
}
