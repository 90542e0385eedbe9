//! Extent values handed out and reclaimed by the allocator.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;

use serde::{Deserialize, Serialize};

/// A logical `(address, length)` extent inside the managed range.
///
/// Chunks are plain values: splitting or merging always builds new chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub address: u64,
    pub length: u64,
}

impl Chunk {
    /// Not-found marker. Deallocating it is a no-op.
    pub const INVALID: Chunk = Chunk {
        address: u64::MAX,
        length: 0,
    };

    #[must_use]
    pub const fn new(address: u64, length: u64) -> Self {
        Self { address, length }
    }

    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.address != u64::MAX && self.length != 0
    }

    /// One past the last address covered by this chunk.
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.address.saturating_add(self.length)
    }

    /// True when `other` starts exactly where `self` ends.
    #[must_use]
    pub const fn precedes(&self, other: &Chunk) -> bool {
        self.end() == other.address
    }

    #[must_use]
    pub const fn overlaps(&self, other: &Chunk) -> bool {
        self.address < other.end() && other.address < self.end()
    }
}

impl Default for Chunk {
    fn default() -> Self {
        Self::INVALID
    }
}

// Identity is the address: two live chunks never share one.
impl Hash for Chunk {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#x}, +{}]", self.address, self.length)
    }
}

/// The result of a chained allocation: one or more non-contiguous chunks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chain {
    chunks: Vec<Chunk>,
}

impl Chain {
    #[must_use]
    pub fn new() -> Self {
        Self { chunks: Vec::new() }
    }

    pub(crate) fn push(&mut self, chunk: Chunk) {
        self.chunks.push(chunk);
    }

    /// Sum of every chunk length, overhead included.
    #[must_use]
    pub fn allocated_count(&self) -> u64 {
        self.chunks.iter().map(|c| c.length).sum()
    }

    /// Bytes left for the caller after reserving `overhead` in every chunk.
    #[must_use]
    pub fn usable_count(&self, overhead: u64) -> u64 {
        self.chunks
            .iter()
            .map(|c| c.length.saturating_sub(overhead))
            .sum()
    }

    #[must_use]
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<Chunk> {
        self.chunks
    }
}

impl Deref for Chain {
    type Target = [Chunk];

    fn deref(&self) -> &Self::Target {
        &self.chunks
    }
}

impl From<Vec<Chunk>> for Chain {
    fn from(chunks: Vec<Chunk>) -> Self {
        Self { chunks }
    }
}

impl IntoIterator for Chain {
    type Item = Chunk;
    type IntoIter = std::vec::IntoIter<Chunk>;

    fn into_iter(self) -> Self::IntoIter {
        self.chunks.into_iter()
    }
}

impl<'a> IntoIterator for &'a Chain {
    type Item = &'a Chunk;
    type IntoIter = std::slice::Iter<'a, Chunk>;

    fn into_iter(self) -> Self::IntoIter {
        self.chunks.iter()
    }
}
