//! Snapshot artifacts with SHA-256 integrity.
//!
//! An artifact is the snapshot's canonical JSON (compact `serde_json`
//! output, field order fixed by the struct definitions) plus the lowercase
//! hex digest of those exact bytes.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use segalloc_core::{Allocator, AllocatorSnapshot};

use crate::error::HarnessError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotArtifact {
    pub sha256: String,
    pub snapshot: AllocatorSnapshot,
}

fn hex_lower(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(&mut out, "{b:02x}");
    }
    out
}

pub fn canonical_json(snapshot: &AllocatorSnapshot) -> Result<Vec<u8>, HarnessError> {
    Ok(serde_json::to_vec(snapshot)?)
}

pub fn digest(snapshot: &AllocatorSnapshot) -> Result<String, HarnessError> {
    let bytes = canonical_json(snapshot)?;
    Ok(hex_lower(&Sha256::digest(&bytes)))
}

impl SnapshotArtifact {
    pub fn capture(allocator: &Allocator) -> Result<Self, HarnessError> {
        let snapshot = allocator.snapshot();
        Ok(Self {
            sha256: digest(&snapshot)?,
            snapshot,
        })
    }

    /// Recomputes the digest and rebuilds the allocator.
    pub fn restore(self) -> Result<Allocator, HarnessError> {
        let actual = digest(&self.snapshot)?;
        if !actual.eq_ignore_ascii_case(&self.sha256) {
            return Err(HarnessError::DigestMismatch {
                expected: self.sha256,
                actual,
            });
        }
        Ok(Allocator::from_snapshot(self.snapshot)?)
    }

    pub fn write(&self, path: &Path) -> Result<(), HarnessError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self, HarnessError> {
        let data = std::fs::read(path)?;
        Ok(serde_json::from_slice(&data)?)
    }
}
