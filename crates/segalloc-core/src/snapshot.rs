//! Plain-data export and import of the full allocator state.
//!
//! A snapshot holds every free list verbatim plus the checked-out chunks, so
//! a persistence layer can store it with any serde format and rebuild an
//! identical allocator later. Import re-checks every invariant the live
//! allocator maintains.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{AllocatorConfig, ConfigError};
use crate::space::{Allocator, Chunk, FreePool, Region};

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionSnapshot {
    pub stride: u64,
    pub page_element_count: u64,
    pub free: Vec<Chunk>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotCounters {
    pub deallocs_count: u64,
    pub defrags_count: u64,
    pub total_deallocated_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatorSnapshot {
    pub version: u32,
    pub start: u64,
    pub capacity: u64,
    pub config: AllocatorConfig,
    pub regions: Vec<RegionSnapshot>,
    pub pool: Vec<Chunk>,
    pub outstanding: Vec<Chunk>,
    pub counters: SnapshotCounters,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("unsupported snapshot version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
    #[error("invalid config: {0}")]
    Config(#[from] ConfigError),
    #[error("snapshot has {found} regions, config ladder has {expected}")]
    RegionCount { expected: usize, found: usize },
    #[error("region {index}: stride {found} / {found_page} elements, expected {expected} / {expected_page}")]
    RegionShape {
        index: usize,
        expected: u64,
        found: u64,
        expected_page: u64,
        found_page: u64,
    },
    #[error("region {index}: chunk {chunk} does not match stride {stride}")]
    StrideMismatch {
        index: usize,
        stride: u64,
        chunk: Chunk,
    },
    #[error("outstanding chunks present while tracking is disabled")]
    UntrackedOutstanding,
    #[error("chunk {0} is invalid")]
    InvalidChunk(Chunk),
    #[error("chunk {chunk} lies outside [{start:#x}, {end:#x})")]
    OutOfRange { chunk: Chunk, start: u64, end: u64 },
    #[error("outstanding chunk {0} has a length no allocation produces")]
    UnissuedLength(Chunk),
    #[error("chunk {chunk} length is not a multiple of alignment {alignment}")]
    MisalignedLength { chunk: Chunk, alignment: u64 },
    #[error("chunks {first} and {second} overlap")]
    Overlap { first: Chunk, second: Chunk },
    #[error("free and outstanding extents cover {accounted} bytes of {capacity}")]
    Conservation { accounted: u64, capacity: u64 },
}

impl Allocator {
    /// Exports the complete allocator state.
    #[must_use]
    pub fn snapshot(&self) -> AllocatorSnapshot {
        AllocatorSnapshot {
            version: SNAPSHOT_VERSION,
            start: self.start,
            capacity: self.capacity,
            config: self.config.clone(),
            regions: self
                .regions
                .iter()
                .map(|r| RegionSnapshot {
                    stride: r.stride(),
                    page_element_count: r.page_element_count(),
                    free: r.free().to_vec(),
                })
                .collect(),
            pool: self.pool.chunks().to_vec(),
            outstanding: self.outstanding_chunks(),
            counters: SnapshotCounters {
                deallocs_count: self.deallocs_count,
                defrags_count: self.defrags_count,
                total_deallocated_bytes: self.total_deallocated_bytes,
            },
        }
    }

    /// Rebuilds an allocator from a snapshot after validating it.
    pub fn from_snapshot(snapshot: AllocatorSnapshot) -> Result<Self, SnapshotError> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: snapshot.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        let mut allocator = Allocator::empty(snapshot.capacity, snapshot.start, snapshot.config)?;
        validate_extents(&allocator, &snapshot.regions, &snapshot.pool, &snapshot.outstanding)?;

        allocator.regions = snapshot
            .regions
            .into_iter()
            .map(|r| Region::from_parts(r.stride, r.page_element_count, r.free))
            .collect();
        allocator.pool = FreePool::from_chunks(snapshot.pool);
        allocator.outstanding = snapshot
            .outstanding
            .into_iter()
            .map(|c| (c.address, c.length))
            .collect();
        allocator.deallocs_count = snapshot.counters.deallocs_count;
        allocator.defrags_count = snapshot.counters.defrags_count;
        allocator.total_deallocated_bytes = snapshot.counters.total_deallocated_bytes;
        Ok(allocator)
    }
}

fn validate_extents(
    allocator: &Allocator,
    regions: &[RegionSnapshot],
    pool: &[Chunk],
    outstanding: &[Chunk],
) -> Result<(), SnapshotError> {
    let expected = allocator.regions();
    if regions.len() != expected.len() {
        return Err(SnapshotError::RegionCount {
            expected: expected.len(),
            found: regions.len(),
        });
    }
    for (index, (found, want)) in regions.iter().zip(expected).enumerate() {
        if found.stride != want.stride() || found.page_element_count != want.page_element_count() {
            return Err(SnapshotError::RegionShape {
                index,
                expected: want.stride(),
                found: found.stride,
                expected_page: want.page_element_count(),
                found_page: found.page_element_count,
            });
        }
        if let Some(&chunk) = found.free.iter().find(|c| c.length != found.stride) {
            return Err(SnapshotError::StrideMismatch {
                index,
                stride: found.stride,
                chunk,
            });
        }
    }
    let tracking = allocator.config().track_outstanding;
    if !tracking && !outstanding.is_empty() {
        return Err(SnapshotError::UntrackedOutstanding);
    }

    let (start, end) = (allocator.start_address(), allocator.end_address());
    let mut extents: Vec<Chunk> = regions
        .iter()
        .flat_map(|r| r.free.iter().copied())
        .chain(pool.iter().copied())
        .chain(outstanding.iter().copied())
        .collect();
    for &chunk in &extents {
        if !chunk.is_valid() {
            return Err(SnapshotError::InvalidChunk(chunk));
        }
        if chunk.address < start || chunk.end() > end {
            return Err(SnapshotError::OutOfRange { chunk, start, end });
        }
    }
    validate_lengths(allocator, pool, outstanding)?;

    extents.sort_unstable_by_key(|c| c.address);
    for pair in extents.windows(2) {
        if pair[0].overlaps(&pair[1]) {
            return Err(SnapshotError::Overlap {
                first: pair[0],
                second: pair[1],
            });
        }
    }
    if tracking {
        let accounted: u64 = extents.iter().map(|c| c.length).sum();
        if accounted != allocator.capacity() {
            return Err(SnapshotError::Conservation {
                accounted,
                capacity: allocator.capacity(),
            });
        }
    }
    Ok(())
}

/// Outstanding chunks must be a stride or an aligned carve above the largest
/// stride, so freeing them routes cleanly. Pool chunks are aligned whenever
/// the capacity is.
fn validate_lengths(
    allocator: &Allocator,
    pool: &[Chunk],
    outstanding: &[Chunk],
) -> Result<(), SnapshotError> {
    let alignment = allocator.config().alignment;
    let ladder = &allocator.config().stride_ladder;
    let largest = ladder.last().copied().unwrap_or(0);
    for &chunk in outstanding {
        if chunk.length > largest {
            if chunk.length % alignment != 0 {
                return Err(SnapshotError::MisalignedLength { chunk, alignment });
            }
        } else if ladder.binary_search(&chunk.length).is_err() {
            return Err(SnapshotError::UnissuedLength(chunk));
        }
    }
    if allocator.capacity() % alignment == 0 {
        if let Some(&chunk) = pool.iter().find(|c| c.length % alignment != 0) {
            return Err(SnapshotError::MisalignedLength { chunk, alignment });
        }
    }
    Ok(())
}
