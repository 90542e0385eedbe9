//! Thread-safe wrapper around [`Allocator`].

use parking_lot::Mutex;

use crate::config::{AllocatorConfig, ConfigError};
use crate::log::AllocatorLogRecord;
use crate::snapshot::{AllocatorSnapshot, SnapshotError};
use crate::space::{Allocator, Chain, Chunk, DefragSummary};

/// An [`Allocator`] behind a single lock. Every call holds the lock for the
/// whole operation, so operations are serialized.
pub struct SharedAllocator {
    inner: Mutex<Allocator>,
}

impl SharedAllocator {
    #[must_use]
    pub fn new(allocator: Allocator) -> Self {
        Self {
            inner: Mutex::new(allocator),
        }
    }

    pub fn with_config(
        capacity: u64,
        start: u64,
        config: AllocatorConfig,
    ) -> Result<Self, ConfigError> {
        Allocator::with_config(capacity, start, config).map(Self::new)
    }

    pub fn from_snapshot(snapshot: AllocatorSnapshot) -> Result<Self, SnapshotError> {
        Allocator::from_snapshot(snapshot).map(Self::new)
    }

    pub fn allocate(&self, count: u64, overhead: u64) -> Option<Chain> {
        self.inner.lock().allocate(count, overhead)
    }

    pub fn allocate_contiguous(&self, count: u64) -> Option<Chunk> {
        self.inner.lock().allocate_contiguous(count)
    }

    pub fn deallocate(&self, chunk: Chunk) {
        self.inner.lock().deallocate(chunk);
    }

    pub fn deallocate_chain(&self, chain: Chain) {
        self.inner.lock().deallocate_chain(chain);
    }

    pub fn defrag(&self, purge: bool) -> DefragSummary {
        self.inner.lock().defrag(purge)
    }

    #[must_use]
    pub fn free_byte_count(&self) -> u64 {
        self.inner.lock().free_byte_count()
    }

    #[must_use]
    pub fn snapshot(&self) -> AllocatorSnapshot {
        self.inner.lock().snapshot()
    }

    pub fn drain_lifecycle_logs(&self) -> Vec<AllocatorLogRecord> {
        self.inner.lock().drain_lifecycle_logs()
    }

    /// Runs `f` with exclusive access, for reads or multi-step sequences that
    /// must not interleave with other threads.
    pub fn with<R>(&self, f: impl FnOnce(&mut Allocator) -> R) -> R {
        f(&mut self.inner.lock())
    }

    #[must_use]
    pub fn into_inner(self) -> Allocator {
        self.inner.into_inner()
    }
}

impl From<Allocator> for SharedAllocator {
    fn from(allocator: Allocator) -> Self {
        Self::new(allocator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn concurrent_churn_conserves_bytes() {
        let shared = Arc::new(SharedAllocator::new(Allocator::new(16 * MIB, 0)));
        let handles: Vec<_> = (0..4u64)
            .map(|t| {
                let shared = Arc::clone(&shared);
                thread::spawn(move || {
                    for round in 0..200u64 {
                        let size = 64 + ((t * 997 + round * 131) % 8192);
                        let chain = shared.allocate(size, 8).expect("capacity is ample");
                        assert!(chain.usable_count(8) >= size);
                        shared.deallocate_chain(chain);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(shared.free_byte_count(), 16 * MIB);
        assert_eq!(shared.with(|a| a.outstanding_count()), 0);
    }

    #[test]
    fn with_sees_consistent_state() {
        let shared = SharedAllocator::from(Allocator::new(MIB, 0));
        let c = shared.allocate_contiguous(512).unwrap();
        let (free, outstanding) = shared.with(|a| (a.free_byte_count(), a.outstanding_count()));
        assert_eq!(free + 512, MIB);
        assert_eq!(outstanding, 1);
        shared.deallocate(c);
        shared.defrag(true);
        let allocator = shared.into_inner();
        assert_eq!(allocator.pool().chunks(), &[Chunk::new(0, MIB)]);
    }
}
