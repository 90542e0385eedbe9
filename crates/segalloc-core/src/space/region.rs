//! Size-class regions.
//!
//! A region owns free chunks of exactly one stride. It talks to the global
//! pool one page (`stride * page_element_count` bytes) at a time; the
//! allocator does the reserving, the region only splits and merges.

use super::chunk::Chunk;

#[derive(Debug, Clone)]
pub struct Region {
    stride: u64,
    page_element_count: u64,
    free: Vec<Chunk>,
    /// Chunks given back since the last coalesce.
    distance_since_coalesce: u64,
}

impl Region {
    /// Creates an empty region. A page is `page_byte_budget / stride`
    /// elements, never fewer than one.
    pub fn new(stride: u64, page_byte_budget: u64) -> Self {
        assert!(stride > 0, "region stride must be non-zero");
        Self {
            stride,
            page_element_count: (page_byte_budget / stride).max(1),
            free: Vec::new(),
            distance_since_coalesce: 0,
        }
    }

    pub(crate) fn from_parts(stride: u64, page_element_count: u64, free: Vec<Chunk>) -> Self {
        Self {
            stride,
            page_element_count,
            free,
            distance_since_coalesce: 0,
        }
    }

    #[must_use]
    pub fn stride(&self) -> u64 {
        self.stride
    }

    #[must_use]
    pub fn page_element_count(&self) -> u64 {
        self.page_element_count
    }

    #[must_use]
    pub fn page_byte_count(&self) -> u64 {
        self.stride * self.page_element_count
    }

    #[must_use]
    pub fn free(&self) -> &[Chunk] {
        &self.free
    }

    #[must_use]
    pub fn free_byte_count(&self) -> u64 {
        self.free.len() as u64 * self.stride
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.free.is_empty()
    }

    /// Pops any free chunk. All chunks are interchangeable, so take the last.
    pub fn take_chunk(&mut self) -> Option<Chunk> {
        self.free.pop()
    }

    /// Splits `extent` into stride-sized chunks and appends them.
    ///
    /// # Panics
    ///
    /// If `extent.length` is not a multiple of the stride.
    pub fn add_free_space(&mut self, extent: Chunk) {
        if extent.length % self.stride != 0 {
            panic!(
                "region invariant violated: extent length {} is not a multiple of stride {}",
                extent.length, self.stride
            );
        }
        let count = extent.length / self.stride;
        self.free.reserve(count as usize);
        self.free
            .extend((0..count).map(|i| Chunk::new(extent.address + i * self.stride, self.stride)));
    }

    /// Takes back one chunk from a caller.
    ///
    /// # Panics
    ///
    /// If `chunk.length` differs from the stride.
    pub fn give_chunk(&mut self, chunk: Chunk) {
        if chunk.length != self.stride {
            panic!(
                "region invariant violated: chunk length {} given to region of stride {}",
                chunk.length, self.stride
            );
        }
        self.free.push(chunk);
        self.distance_since_coalesce += 1;
    }

    /// True once `threshold` pages' worth of chunks came back since the last
    /// coalesce.
    #[must_use]
    pub fn should_coalesce(&self, threshold: u64) -> bool {
        self.distance_since_coalesce >= threshold.saturating_mul(self.page_element_count)
    }

    /// Merges contiguous free chunks into whole pages.
    ///
    /// Every run of address-adjacent chunks that reaches exactly one page is
    /// removed from the free list and returned as a single page chunk. The
    /// free list is left sorted by address.
    pub fn coalesce(&mut self) -> Vec<Chunk> {
        self.distance_since_coalesce = 0;
        let page_bytes = self.page_byte_count();
        self.free.sort_unstable_by_key(|c| c.address);

        let mut pages = Vec::new();
        let mut kept = Vec::with_capacity(self.free.len());
        let mut run_start = 0usize;
        let mut run_bytes = 0u64;

        for (i, chunk) in self.free.iter().enumerate() {
            let extends_run = run_bytes > 0 && self.free[run_start].address + run_bytes == chunk.address;
            if !extends_run {
                kept.extend_from_slice(&self.free[run_start..i]);
                run_start = i;
                run_bytes = 0;
            }
            run_bytes += self.stride;
            if run_bytes == page_bytes {
                pages.push(Chunk::new(self.free[run_start].address, page_bytes));
                run_start = i + 1;
                run_bytes = 0;
            }
        }
        kept.extend_from_slice(&self.free[run_start..]);

        if !pages.is_empty() {
            self.free = kept;
        }
        pages
    }

    /// Empties the free list.
    pub fn drain(&mut self) -> Vec<Chunk> {
        self.distance_since_coalesce = 0;
        std::mem::take(&mut self.free)
    }
}
