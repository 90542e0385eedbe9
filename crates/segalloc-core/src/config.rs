//! Construction-time allocator configuration.
//!
//! Defaults mirror the classic layout: 8-byte alignment, 8 KiB region pages,
//! sixteen size classes doubling from 32 bytes. Environment overrides:
//! - `SEGALLOC_MIN_ALLOC`: smallest stride, the ladder doubles from it.
//! - `SEGALLOC_PAGE_BYTES`: byte budget of one region page.
//! - `SEGALLOC_LOG_LEVEL`: `trace|debug|info|warn|error`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::log::AllocatorLogLevel;

pub const DEFAULT_ALIGNMENT: u64 = 8;
pub const DEFAULT_PAGE_BYTE_BUDGET: u64 = 8 * 1024;
pub const DEFAULT_MIN_ALLOCATION_SIZE: u64 = 32;
pub const DEFAULT_STRIDE_COUNT: u32 = 16;
pub const DEFAULT_LOG_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("alignment {0} is not a non-zero power of two")]
    BadAlignment(u64),
    #[error("stride ladder is empty")]
    EmptyLadder,
    #[error("stride ladder is not strictly ascending at index {index}")]
    UnorderedLadder { index: usize },
    #[error("stride {stride} is not a multiple of alignment {alignment}")]
    MisalignedStride { stride: u64, alignment: u64 },
    #[error("stride ladder starts at {first}, minimum allocation size is {min}")]
    LadderMinMismatch { min: u64, first: u64 },
    #[error("page byte budget must be non-zero")]
    ZeroPageBudget,
    #[error("region coalesce threshold must be non-zero when set")]
    ZeroCoalesceThreshold,
    #[error("range start {start:#x} + capacity {capacity} overflows the address space")]
    RangeOverflow { start: u64, capacity: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatorConfig {
    /// Pool carve granularity; every reservation is rounded up to it.
    pub alignment: u64,
    /// Bytes a region fetches from the pool per replenishment.
    pub page_byte_budget: u64,
    /// Region strides, strictly ascending.
    pub stride_ladder: Vec<u64>,
    /// Smallest chunk ever handed out; must equal the first stride.
    pub min_allocation_size: u64,
    /// Ignore deallocations outside the managed range.
    pub bounds_checking: bool,
    /// Keep an index of checked-out chunks and reject double frees.
    pub track_outstanding: bool,
    /// Coalesce a region locally once this many pages came back to it.
    /// `None` leaves coalescing to reservation failures and explicit defrag.
    pub region_coalesce_threshold: Option<u64>,
    /// Lifecycle records below this level are not built.
    pub min_log_level: AllocatorLogLevel,
    /// Lifecycle ring size; oldest records are dropped first.
    pub log_capacity: usize,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self::with_min_allocation_size(DEFAULT_MIN_ALLOCATION_SIZE)
    }
}

impl AllocatorConfig {
    /// Default configuration with the ladder `min * 2^i`, sixteen steps.
    #[must_use]
    pub fn with_min_allocation_size(min_allocation_size: u64) -> Self {
        let stride_ladder = (0..DEFAULT_STRIDE_COUNT)
            .map(|i| min_allocation_size.saturating_mul(1u64 << i))
            .collect();
        Self {
            alignment: DEFAULT_ALIGNMENT,
            page_byte_budget: DEFAULT_PAGE_BYTE_BUDGET,
            stride_ladder,
            min_allocation_size,
            bounds_checking: true,
            track_outstanding: true,
            region_coalesce_threshold: None,
            min_log_level: AllocatorLogLevel::Info,
            log_capacity: DEFAULT_LOG_CAPACITY,
        }
    }

    /// Defaults adjusted by `SEGALLOC_*` environment variables. Unparseable
    /// values fall back to the default.
    #[must_use]
    pub fn from_env_overrides() -> Self {
        let read = |name: &str| std::env::var(name).ok();
        Self::from_overrides(
            read("SEGALLOC_MIN_ALLOC").as_deref(),
            read("SEGALLOC_PAGE_BYTES").as_deref(),
            read("SEGALLOC_LOG_LEVEL").as_deref(),
        )
    }

    fn from_overrides(
        min_alloc: Option<&str>,
        page_bytes: Option<&str>,
        log_level: Option<&str>,
    ) -> Self {
        let min = min_alloc
            .and_then(parse_size)
            .filter(|&v| v > 0)
            .unwrap_or(DEFAULT_MIN_ALLOCATION_SIZE);
        let mut config = Self::with_min_allocation_size(min);
        if let Some(page) = page_bytes.and_then(parse_size).filter(|&v| v > 0) {
            config.page_byte_budget = page;
        }
        if let Some(level) = log_level {
            config.min_log_level = AllocatorLogLevel::from_str_loose(level);
        }
        config
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.alignment == 0 || !self.alignment.is_power_of_two() {
            return Err(ConfigError::BadAlignment(self.alignment));
        }
        if self.stride_ladder.is_empty() {
            return Err(ConfigError::EmptyLadder);
        }
        for (index, pair) in self.stride_ladder.windows(2).enumerate() {
            if pair[0] >= pair[1] {
                return Err(ConfigError::UnorderedLadder { index: index + 1 });
            }
        }
        for &stride in &self.stride_ladder {
            if stride == 0 || stride % self.alignment != 0 {
                return Err(ConfigError::MisalignedStride {
                    stride,
                    alignment: self.alignment,
                });
            }
        }
        if self.stride_ladder[0] != self.min_allocation_size {
            return Err(ConfigError::LadderMinMismatch {
                min: self.min_allocation_size,
                first: self.stride_ladder[0],
            });
        }
        if self.page_byte_budget == 0 {
            return Err(ConfigError::ZeroPageBudget);
        }
        if self.region_coalesce_threshold == Some(0) {
            return Err(ConfigError::ZeroCoalesceThreshold);
        }
        Ok(())
    }
}

/// Accepts plain decimal, `0x` hex, and `k`/`m`/`g` binary suffixes.
fn parse_size(raw: &str) -> Option<u64> {
    let s = raw.trim().to_ascii_lowercase().replace('_', "");
    if let Some(hex) = s.strip_prefix("0x") {
        return u64::from_str_radix(hex, 16).ok();
    }
    let (digits, shift) = match s.chars().last()? {
        'k' => (&s[..s.len() - 1], 10),
        'm' => (&s[..s.len() - 1], 20),
        'g' => (&s[..s.len() - 1], 30),
        _ => (s.as_str(), 0),
    };
    digits.parse::<u64>().ok()?.checked_mul(1u64 << shift)
}
