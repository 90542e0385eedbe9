//! Global free pool: every extent not owned by a region.
//!
//! Kept sorted by length so the best fit is a single binary search.

use super::chunk::Chunk;
use super::ordered::{first_at_least, insert_ordered};

#[derive(Debug, Clone, Default)]
pub struct FreePool {
    chunks: Vec<Chunk>,
}

impl FreePool {
    #[must_use]
    pub fn new() -> Self {
        Self { chunks: Vec::new() }
    }

    /// Seeds the pool with the whole managed range.
    #[must_use]
    pub fn seeded(extent: Chunk) -> Self {
        let mut pool = Self::new();
        if extent.is_valid() {
            pool.chunks.push(extent);
        }
        pool
    }

    pub(crate) fn from_chunks(mut chunks: Vec<Chunk>) -> Self {
        chunks.sort_by_key(|c| c.length);
        Self { chunks }
    }

    #[must_use]
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    #[must_use]
    pub fn free_byte_count(&self) -> u64 {
        self.chunks.iter().map(|c| c.length).sum()
    }

    /// Length of the largest free extent, 0 when empty.
    #[must_use]
    pub fn largest(&self) -> u64 {
        self.chunks.last().map_or(0, |c| c.length)
    }

    /// Carves exactly `length` bytes out of the smallest chunk that fits.
    ///
    /// `length` must already be aligned. The remainder, if any, goes back
    /// into the pool at its sorted position.
    pub fn take(&mut self, length: u64) -> Option<Chunk> {
        if length == 0 {
            return None;
        }
        let position = first_at_least(&self.chunks, length, |c| c.length);
        if position == self.chunks.len() {
            return None;
        }
        let chunk = self.chunks.remove(position);
        if chunk.length > length {
            self.reclaim(Chunk::new(chunk.address + length, chunk.length - length));
        }
        Some(Chunk::new(chunk.address, length))
    }

    pub fn reclaim(&mut self, chunk: Chunk) {
        insert_ordered(&mut self.chunks, chunk, |c| c.length);
    }

    /// Bulk reclaim: one stable sort instead of an insert per chunk.
    pub fn absorb(&mut self, chunks: Vec<Chunk>) {
        if chunks.is_empty() {
            return;
        }
        self.chunks.extend(chunks);
        self.chunks.sort_by_key(|c| c.length);
    }

    /// Merges address-adjacent extents. Returns how many merges happened.
    pub fn coalesce_by_address(&mut self) -> usize {
        if self.chunks.len() < 2 {
            return 0;
        }
        let before = self.chunks.len();
        let mut sorted = std::mem::take(&mut self.chunks);
        sorted.sort_unstable_by_key(|c| c.address);

        let mut merged = Vec::with_capacity(sorted.len());
        let mut running = sorted[0];
        for chunk in &sorted[1..] {
            if running.precedes(chunk) {
                running = Chunk::new(running.address, running.length + chunk.length);
            } else {
                merged.push(running);
                running = *chunk;
            }
        }
        merged.push(running);
        merged.sort_by_key(|c| c.length);

        self.chunks = merged;
        before - self.chunks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_is_best_fit_and_splits() {
        let mut pool = FreePool::new();
        pool.reclaim(Chunk::new(0, 4096));
        pool.reclaim(Chunk::new(8192, 512));
        pool.reclaim(Chunk::new(16384, 1024));

        let c = pool.take(600).unwrap();
        assert_eq!(c, Chunk::new(16384, 600));
        assert_eq!(
            pool.chunks(),
            &[
                Chunk::new(16984, 424),
                Chunk::new(8192, 512),
                Chunk::new(0, 4096)
            ]
        );
    }

    #[test]
    fn take_exact_removes_chunk() {
        let mut pool = FreePool::seeded(Chunk::new(64, 1024));
        assert_eq!(pool.take(1024), Some(Chunk::new(64, 1024)));
        assert!(pool.is_empty());
        assert_eq!(pool.take(8), None);
    }

    #[test]
    fn seeded_with_zero_capacity_is_empty() {
        assert!(FreePool::seeded(Chunk::new(0, 0)).is_empty());
    }

    #[test]
    fn coalesce_merges_adjacent_only() {
        let mut pool = FreePool::new();
        for c in [
            Chunk::new(256, 256),
            Chunk::new(0, 128),
            Chunk::new(128, 128),
            Chunk::new(1024, 64),
        ] {
            pool.reclaim(c);
        }
        assert_eq!(pool.coalesce_by_address(), 2);
        assert_eq!(pool.chunks(), &[Chunk::new(1024, 64), Chunk::new(0, 512)]);
        assert_eq!(pool.free_byte_count(), 576);
        assert_eq!(pool.largest(), 512);
    }
}
