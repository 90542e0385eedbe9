//! Allocator state.
//!
//! Coordinates the size-class regions and the global free pool: picks a
//! region per request with the best-fit heuristic, replenishes regions from
//! the pool page by page, routes frees back by length, and runs
//! defragmentation when the pool cannot serve a reservation.

use std::collections::{HashMap, HashSet};
use std::fmt;

use super::chunk::{Chain, Chunk};
use super::ordered::{first_at_least, sum_of_lower};
use super::pool::FreePool;
use super::region::Region;
use crate::config::{AllocatorConfig, ConfigError};
use crate::log::{AllocatorLogLevel, AllocatorLogRecord, LifecycleEvent, LifecycleLog};

/// What a single defragmentation pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DefragSummary {
    /// Whole pages moved from regions to the pool.
    pub promoted_pages: usize,
    /// Loose region chunks moved to the pool by a purge.
    pub purged_chunks: usize,
    /// Address-adjacent merges inside the pool.
    pub pool_merges: usize,
}

/// Segregated free-list allocator over `[start, start + capacity)`.
///
/// Single owner: every mutating call takes `&mut self`. Wrap it in
/// [`crate::SharedAllocator`] to share it between threads.
pub struct Allocator {
    pub(crate) config: AllocatorConfig,
    pub(crate) start: u64,
    pub(crate) capacity: u64,
    pub(crate) end: u64,
    /// Ascending by stride; fixed after construction.
    pub(crate) regions: Vec<Region>,
    /// `sum_of_lower_strides[i]` is the sum of every stride below region `i`.
    pub(crate) sum_of_lower_strides: Vec<u64>,
    pub(crate) pool: FreePool,
    /// Checked-out chunks (address -> length). Empty when tracking is off.
    pub(crate) outstanding: HashMap<u64, u64>,
    /// Addresses freed since they were last checked out, to tell a double
    /// free from a foreign chunk.
    pub(crate) recently_freed: HashSet<u64>,
    pub(crate) deallocs_count: u64,
    pub(crate) defrags_count: u64,
    pub(crate) total_deallocated_bytes: u64,
    pub(crate) log: LifecycleLog,
}

impl Allocator {
    /// Creates an allocator with the default configuration.
    ///
    /// # Panics
    ///
    /// If `start + capacity` overflows `u64`.
    #[must_use]
    pub fn new(capacity: u64, start: u64) -> Self {
        match Self::with_config(capacity, start, AllocatorConfig::default()) {
            Ok(allocator) => allocator,
            Err(err) => panic!("invalid allocator range: {err}"),
        }
    }

    /// Default configuration with the stride ladder starting at
    /// `min_allocation_size`.
    pub fn with_min_allocation_size(
        capacity: u64,
        start: u64,
        min_allocation_size: u64,
    ) -> Result<Self, ConfigError> {
        Self::with_config(
            capacity,
            start,
            AllocatorConfig::with_min_allocation_size(min_allocation_size),
        )
    }

    pub fn with_config(
        capacity: u64,
        start: u64,
        config: AllocatorConfig,
    ) -> Result<Self, ConfigError> {
        let mut allocator = Self::empty(capacity, start, config)?;
        allocator.pool = FreePool::seeded(Chunk::new(start, capacity));
        Ok(allocator)
    }

    /// Validated allocator with empty free lists.
    pub(crate) fn empty(
        capacity: u64,
        start: u64,
        config: AllocatorConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let end = start
            .checked_add(capacity)
            .ok_or(ConfigError::RangeOverflow { start, capacity })?;
        let regions = config
            .stride_ladder
            .iter()
            .map(|&stride| Region::new(stride, config.page_byte_budget))
            .collect();
        let sum_of_lower_strides = sum_of_lower(&config.stride_ladder);
        let log = LifecycleLog::new(config.min_log_level, config.log_capacity);
        Ok(Self {
            config,
            start,
            capacity,
            end,
            regions,
            sum_of_lower_strides,
            pool: FreePool::new(),
            outstanding: HashMap::new(),
            recently_freed: HashSet::new(),
            deallocs_count: 0,
            defrags_count: 0,
            total_deallocated_bytes: 0,
            log,
        })
    }

    fn record(&mut self, event: LifecycleEvent, details: impl FnOnce() -> String) {
        if !self.log.enabled(event.level) {
            return;
        }
        let details = details();
        let free_bytes = self.free_byte_count();
        let pool_chunks = self.pool.len();
        let outstanding = self.outstanding.len();
        self.log
            .push(event, details, free_bytes, pool_chunks, outstanding);
    }

    fn check_out(&mut self, chunk: Chunk) {
        if self.config.track_outstanding {
            self.outstanding.insert(chunk.address, chunk.length);
            self.recently_freed.remove(&chunk.address);
        }
    }

    /// Picks the region for a request of `value` bytes (overhead included).
    ///
    /// Starts from the first stride that covers `value`; steps down one
    /// region when the slack of that stride exceeds how far the smaller
    /// strides combined are from covering the request.
    #[must_use]
    pub fn find_best_fit_region(&self, value: u64, overhead: u64) -> usize {
        let c = first_at_least(&self.regions, value, Region::stride);
        if c >= self.regions.len() {
            return self.regions.len() - 1;
        }
        if c > 1 {
            let stride = self.regions[c].stride();
            if stride > value && self.regions[c - 1].stride() > overhead {
                let slack = stride - value;
                let lower = i128::from(self.sum_of_lower_strides[c])
                    - (c as i128) * i128::from(overhead);
                let estimate = (lower - i128::from(value)).unsigned_abs();
                if u128::from(slack) > estimate {
                    return c - 1;
                }
            }
        }
        c
    }

    /// Pops a chunk from region `index`, replenishing it with one page from
    /// the pool when its free list is empty.
    fn take_from_region(&mut self, index: usize) -> Option<Chunk> {
        if let Some(chunk) = self.regions[index].take_chunk() {
            return Some(chunk);
        }
        let page = self.regions[index].page_byte_count();
        let extent = self.reserve_free_storage(page)?;
        let region = &mut self.regions[index];
        region.add_free_space(extent);
        region.take_chunk()
    }

    /// Carves `length` bytes (rounded up to the alignment) from the pool.
    /// On a miss runs one non-purging defrag and retries once.
    fn reserve_free_storage(&mut self, length: u64) -> Option<Chunk> {
        let aligned = length.checked_next_multiple_of(self.config.alignment)?;
        if let Some(chunk) = self.pool.take(aligned) {
            return Some(chunk);
        }
        let summary = self.defrag_pass(false);
        let chunk = self.pool.take(aligned);
        let outcome = if chunk.is_some() { "recovered" } else { "exhausted" };
        self.record(
            LifecycleEvent::new(AllocatorLogLevel::Info, "reserve", "pool_miss_defrag", outcome)
                .length(aligned),
            || {
                format!(
                    "promoted_pages={} pool_merges={}",
                    summary.promoted_pages, summary.pool_merges
                )
            },
        );
        chunk
    }

    /// Returns a chunk to its region, or to the pool when it is longer than
    /// every stride. Returns the receiving region.
    fn route_free(&mut self, chunk: Chunk) -> Option<usize> {
        let index = first_at_least(&self.regions, chunk.length, Region::stride);
        if index == self.regions.len() {
            self.pool.reclaim(chunk);
            return None;
        }
        self.regions[index].give_chunk(chunk);
        Some(index)
    }

    /// Allocates at least `count` usable bytes as a chain of chunks, each
    /// reserving `overhead` bytes for the caller.
    ///
    /// All or nothing: on exhaustion every chunk taken so far goes back and
    /// `None` is returned. Every returned chunk is longer than `overhead`.
    pub fn allocate(&mut self, count: u64, overhead: u64) -> Option<Chain> {
        let mut remaining = count;
        let mut chain = Chain::new();
        let mut best = 0usize;
        let mut lookup = true;

        while remaining > 0 {
            if lookup {
                best = self.find_best_fit_region(remaining.saturating_add(overhead), overhead);
                if self.regions[best].stride() <= overhead {
                    break;
                }
            }
            match self.take_from_region(best) {
                Some(chunk) => {
                    chain.push(chunk);
                    if remaining.saturating_add(overhead) <= chunk.length {
                        remaining = 0;
                    } else {
                        remaining = remaining.saturating_sub(chunk.length - overhead);
                    }
                    // Stop hammering a region that is now larger than needed.
                    if remaining.saturating_add(overhead) < self.regions[best].stride() {
                        lookup = true;
                    }
                }
                None => {
                    if best == 0 {
                        break;
                    }
                    lookup = false;
                    best -= 1;
                    if self.regions[best].stride() <= overhead {
                        break;
                    }
                }
            }
        }

        if remaining != 0 {
            let taken = chain.len();
            for chunk in chain {
                self.route_free(chunk);
            }
            self.record(
                LifecycleEvent::new(AllocatorLogLevel::Info, "allocate", "alloc", "exhausted")
                    .length(count),
                || format!("overhead={overhead} remaining={remaining} rolled_back={taken}"),
            );
            return None;
        }

        for chunk in &chain {
            self.check_out(*chunk);
        }
        let (chunks, total) = (chain.len(), chain.allocated_count());
        self.record(
            LifecycleEvent::new(AllocatorLogLevel::Trace, "allocate", "alloc", "success")
                .length(count)
                .region(best),
            || format!("overhead={overhead} chunks={chunks} allocated={total}"),
        );
        Some(chain)
    }

    /// Allocates one extent of at least `count` bytes.
    ///
    /// Requests covered by a stride get a whole region chunk (its length is
    /// the stride); larger requests are carved straight from the pool.
    pub fn allocate_contiguous(&mut self, count: u64) -> Option<Chunk> {
        let index = first_at_least(&self.regions, count, Region::stride);
        let (chunk, region) = if index == self.regions.len() {
            (self.reserve_free_storage(count), None)
        } else {
            (self.take_from_region(index), Some(index))
        };

        let Some(chunk) = chunk else {
            let largest = self.pool.largest();
            self.record(
                LifecycleEvent::new(
                    AllocatorLogLevel::Info,
                    "allocate_contiguous",
                    "alloc",
                    "exhausted",
                )
                .length(count),
                || format!("largest_pool_extent={largest}"),
            );
            return None;
        };

        self.check_out(chunk);
        let mut event = LifecycleEvent::new(
            AllocatorLogLevel::Trace,
            "allocate_contiguous",
            "alloc",
            "success",
        )
        .chunk(chunk.address, chunk.length);
        if let Some(region) = region {
            event = event.region(region);
        }
        self.record(event, || {
            if region.is_some() {
                "path=region".to_string()
            } else {
                "path=pool".to_string()
            }
        });
        Some(chunk)
    }

    /// Takes back a chunk handed out by this allocator.
    ///
    /// Invalid chunks are ignored. Out-of-range chunks (with bounds checking)
    /// and chunks that are not checked out (with outstanding tracking) are
    /// ignored and logged.
    ///
    /// # Panics
    ///
    /// Without outstanding tracking, if the chunk length matches no stride
    /// while being covered by one.
    pub fn deallocate(&mut self, chunk: Chunk) {
        if !chunk.is_valid() {
            self.record(
                LifecycleEvent::new(AllocatorLogLevel::Trace, "deallocate", "free_invalid", "noop"),
                || "invalid_chunk".to_string(),
            );
            return;
        }

        if self.config.bounds_checking && (chunk.address < self.start || chunk.end() > self.end) {
            let (start, end) = (self.start, self.end);
            self.record(
                LifecycleEvent::new(
                    AllocatorLogLevel::Warn,
                    "deallocate",
                    "out_of_bounds",
                    "ignored",
                )
                .chunk(chunk.address, chunk.length),
                || format!("range=[{start:#x}, {end:#x})"),
            );
            return;
        }

        if self.config.track_outstanding {
            match self.outstanding.get(&chunk.address).copied() {
                Some(length) if length == chunk.length => {
                    self.outstanding.remove(&chunk.address);
                    self.recently_freed.insert(chunk.address);
                }
                Some(length) => {
                    self.record(
                        LifecycleEvent::new(
                            AllocatorLogLevel::Warn,
                            "deallocate",
                            "length_mismatch",
                            "ignored",
                        )
                        .chunk(chunk.address, chunk.length),
                        || format!("outstanding_length={length}"),
                    );
                    return;
                }
                None => {
                    let event = if self.recently_freed.contains(&chunk.address) {
                        "double_free_detected"
                    } else {
                        "unknown_chunk"
                    };
                    self.record(
                        LifecycleEvent::new(AllocatorLogLevel::Warn, "deallocate", event, "ignored")
                            .chunk(chunk.address, chunk.length),
                        || "address_not_outstanding".to_string(),
                    );
                    return;
                }
            }
        }

        let region = self.route_free(chunk);
        self.deallocs_count += 1;
        self.total_deallocated_bytes = self.total_deallocated_bytes.saturating_add(chunk.length);

        let mut promoted = 0usize;
        if let (Some(index), Some(threshold)) = (region, self.config.region_coalesce_threshold) {
            if self.regions[index].should_coalesce(threshold) {
                let pages = self.regions[index].coalesce();
                promoted = pages.len();
                self.pool.absorb(pages);
            }
        }

        let mut event = LifecycleEvent::new(AllocatorLogLevel::Trace, "deallocate", "free", "success")
            .chunk(chunk.address, chunk.length);
        if let Some(index) = region {
            event = event.region(index);
        }
        self.record(event, || {
            if region.is_some() {
                format!("path=region promoted_pages={promoted}")
            } else {
                "path=pool".to_string()
            }
        });
    }

    /// Deallocates every chunk of a chain.
    pub fn deallocate_chain(&mut self, chain: Chain) {
        for chunk in chain {
            self.deallocate(chunk);
        }
    }

    /// Deallocates the chunk `(address, length)`.
    pub fn deallocate_range(&mut self, address: u64, length: u64) {
        self.deallocate(Chunk::new(address, length));
    }

    /// Coalesces every region into whole pages, moves them to the pool, then
    /// merges address-adjacent pool extents. With `purge` every region is
    /// emptied into the pool, not only its complete pages.
    pub fn defrag(&mut self, purge: bool) -> DefragSummary {
        let summary = self.defrag_pass(purge);
        self.record(
            LifecycleEvent::new(AllocatorLogLevel::Debug, "defrag", "defrag", "done"),
            || {
                format!(
                    "purge={} promoted_pages={} purged_chunks={} pool_merges={}",
                    purge, summary.promoted_pages, summary.purged_chunks, summary.pool_merges
                )
            },
        );
        summary
    }

    fn defrag_pass(&mut self, purge: bool) -> DefragSummary {
        self.defrags_count += 1;
        let mut summary = DefragSummary::default();
        let mut reclaimed = Vec::new();
        for region in &mut self.regions {
            let pages = region.coalesce();
            summary.promoted_pages += pages.len();
            reclaimed.extend(pages);
            if purge {
                let loose = region.drain();
                summary.purged_chunks += loose.len();
                reclaimed.extend(loose);
            }
        }
        self.pool.absorb(reclaimed);
        summary.pool_merges = self.pool.coalesce_by_address();
        summary
    }

    #[must_use]
    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    #[must_use]
    pub fn start_address(&self) -> u64 {
        self.start
    }

    #[must_use]
    pub fn end_address(&self) -> u64 {
        self.end
    }

    #[must_use]
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    #[must_use]
    pub fn pool(&self) -> &FreePool {
        &self.pool
    }

    /// Free bytes in the pool and every region.
    #[must_use]
    pub fn free_byte_count(&self) -> u64 {
        self.regions
            .iter()
            .fold(self.pool.free_byte_count(), |acc, r| acc + r.free_byte_count())
    }

    #[must_use]
    pub fn free_chunks_count(&self) -> usize {
        self.regions
            .iter()
            .fold(self.pool.len(), |acc, r| acc + r.free().len())
    }

    #[must_use]
    pub fn total_deallocated_byte_count(&self) -> u64 {
        self.total_deallocated_bytes
    }

    #[must_use]
    pub fn total_deallocs_count(&self) -> u64 {
        self.deallocs_count
    }

    #[must_use]
    pub fn defrags_count(&self) -> u64 {
        self.defrags_count
    }

    /// Checked-out chunk count; 0 when tracking is off.
    #[must_use]
    pub fn outstanding_count(&self) -> usize {
        self.outstanding.len()
    }

    #[must_use]
    pub fn outstanding_byte_count(&self) -> u64 {
        self.outstanding.values().sum()
    }

    /// Checked-out chunks sorted by address.
    #[must_use]
    pub fn outstanding_chunks(&self) -> Vec<Chunk> {
        let mut chunks: Vec<Chunk> = self
            .outstanding
            .iter()
            .map(|(&address, &length)| Chunk::new(address, length))
            .collect();
        chunks.sort_unstable_by_key(|c| c.address);
        chunks
    }

    /// Every free extent, pool and regions, sorted by address.
    #[must_use]
    pub fn free_extents(&self) -> Vec<Chunk> {
        let mut extents: Vec<Chunk> = self.pool.chunks().to_vec();
        for region in &self.regions {
            extents.extend_from_slice(region.free());
        }
        extents.sort_unstable_by_key(|c| c.address);
        extents
    }

    /// Returns a view of allocator lifecycle log records.
    pub fn lifecycle_logs(&self) -> impl Iterator<Item = &AllocatorLogRecord> {
        self.log.records()
    }

    /// Drains allocator lifecycle log records.
    pub fn drain_lifecycle_logs(&mut self) -> Vec<AllocatorLogRecord> {
        self.log.drain()
    }
}

impl fmt::Debug for Allocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Allocator")
            .field("start", &self.start)
            .field("capacity", &self.capacity)
            .field("free_bytes", &self.free_byte_count())
            .field("free_chunks", &self.free_chunks_count())
            .field("outstanding", &self.outstanding.len())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Allocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "allocator [{:#x}, {:#x}) free={} / {} defrags={} deallocs={}",
            self.start,
            self.end,
            self.free_byte_count(),
            self.capacity,
            self.defrags_count,
            self.deallocs_count
        )?;
        writeln!(
            f,
            "  pool: {} extents, {} bytes, largest {}",
            self.pool.len(),
            self.pool.free_byte_count(),
            self.pool.largest()
        )?;
        for (i, region) in self.regions.iter().enumerate() {
            if region.is_empty() {
                continue;
            }
            writeln!(
                f,
                "  region {i:2} stride {:>8}: {} free ({} bytes)",
                region.stride(),
                region.free().len(),
                region.free_byte_count()
            )?;
        }
        Ok(())
    }
}
