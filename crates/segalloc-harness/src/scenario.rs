//! Named deterministic allocation scenarios.
//!
//! Each scenario drives a fresh allocator through a fixed sequence and
//! records one [`ScenarioCheck`] per expectation. A scenario never stops at
//! the first failed check, so a report always shows the whole picture.

use std::time::Instant;

use serde::Serialize;

use segalloc_core::{Allocator, AllocatorConfig, AllocatorLogRecord, Chain, Chunk};

use crate::error::HarnessError;
use crate::invariants::{check_conservation, check_partition};

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScenarioKind {
    AllocateAll,
    FragmentedChain,
    MixedClasses,
    ContiguousFill,
}

impl ScenarioKind {
    pub const ALL: [ScenarioKind; 4] = [
        ScenarioKind::AllocateAll,
        ScenarioKind::FragmentedChain,
        ScenarioKind::MixedClasses,
        ScenarioKind::ContiguousFill,
    ];

    const NAMES: &'static str = "allocate-all, fragmented-chain, mixed-classes, contiguous-fill";

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AllocateAll => "allocate-all",
            Self::FragmentedChain => "fragmented-chain",
            Self::MixedClasses => "mixed-classes",
            Self::ContiguousFill => "contiguous-fill",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, HarnessError> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == name.trim())
            .ok_or_else(|| HarnessError::UnknownScenario(name.to_string(), Self::NAMES))
    }

    /// Managed range size the scenario runs against.
    #[must_use]
    pub const fn capacity(self) -> u64 {
        match self {
            Self::AllocateAll => 4 * GIB,
            Self::FragmentedChain | Self::MixedClasses | Self::ContiguousFill => 10 * MIB,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioCheck {
    pub name: String,
    pub passed: bool,
    pub expected: String,
    pub observed: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub scenario: ScenarioKind,
    pub capacity: u64,
    pub passed: bool,
    pub checks: Vec<ScenarioCheck>,
    pub defrags: u64,
    pub deallocs: u64,
    pub duration_ms: u64,
    /// Allocator lifecycle records captured during the run.
    #[serde(skip)]
    pub lifecycle: Vec<AllocatorLogRecord>,
}

impl ScenarioReport {
    #[must_use]
    pub fn failed_checks(&self) -> impl Iterator<Item = &ScenarioCheck> {
        self.checks.iter().filter(|c| !c.passed)
    }
}

#[derive(Default)]
struct Checks(Vec<ScenarioCheck>);

impl Checks {
    fn eq<T: PartialEq + std::fmt::Debug>(&mut self, name: &str, expected: T, observed: T) {
        self.0.push(ScenarioCheck {
            name: name.to_string(),
            passed: expected == observed,
            expected: format!("{expected:?}"),
            observed: format!("{observed:?}"),
        });
    }

    fn holds(&mut self, name: &str, result: Result<(), String>) {
        let (passed, observed) = match result {
            Ok(()) => (true, "ok".to_string()),
            Err(detail) => (false, detail),
        };
        self.0.push(ScenarioCheck {
            name: name.to_string(),
            passed,
            expected: "ok".to_string(),
            observed,
        });
    }
}

/// Runs `kind` on a fresh allocator built from `config`.
pub fn run(kind: ScenarioKind, config: AllocatorConfig) -> Result<ScenarioReport, HarnessError> {
    let mut allocator = Allocator::with_config(kind.capacity(), 0, config)?;
    let started = Instant::now();
    let mut checks = Checks::default();

    match kind {
        ScenarioKind::AllocateAll => allocate_all(&mut allocator, &mut checks),
        ScenarioKind::FragmentedChain => fragmented_chain(&mut allocator, &mut checks),
        ScenarioKind::MixedClasses => mixed_classes(&mut allocator, &mut checks),
        ScenarioKind::ContiguousFill => contiguous_fill(&mut allocator, &mut checks),
    }
    checks.holds("partition", check_partition(&allocator));
    checks.holds("conservation", check_conservation(&allocator));

    let checks = checks.0;
    Ok(ScenarioReport {
        scenario: kind,
        capacity: allocator.capacity(),
        passed: checks.iter().all(|c| c.passed),
        checks,
        defrags: allocator.defrags_count(),
        deallocs: allocator.total_deallocs_count(),
        duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        lifecycle: allocator.drain_lifecycle_logs(),
    })
}

fn release(allocator: &mut Allocator, chains: impl IntoIterator<Item = Chain>) {
    for chain in chains {
        allocator.deallocate_chain(chain);
    }
}

fn allocate_all(allocator: &mut Allocator, checks: &mut Checks) {
    let capacity = allocator.capacity();
    let all = allocator.allocate(capacity, 0);
    checks.eq(
        "whole_range_chain",
        Some(capacity),
        all.as_ref().map(Chain::allocated_count),
    );
    checks.eq("free_after_fill", 0, allocator.free_byte_count());
    checks.eq("extra_byte_refused", true, allocator.allocate(1, 0).is_none());
    release(allocator, all);
    checks.eq("free_after_release", capacity, allocator.free_byte_count());

    let overhead = 16;
    let half = allocator.allocate(capacity / 2, overhead);
    let usable = half.as_ref().map_or(0, |c| c.usable_count(overhead));
    checks.eq("overhead_chain_usable", true, usable >= capacity / 2);
    checks.eq(
        "overhead_below_every_chunk",
        true,
        half.as_ref()
            .is_some_and(|c| c.iter().all(|chunk| chunk.length > overhead)),
    );
    release(allocator, half);
    checks.eq("free_after_overhead", capacity, allocator.free_byte_count());
}

fn fragmented_chain(allocator: &mut Allocator, checks: &mut Checks) {
    let capacity = allocator.capacity();
    let count = capacity / 1024;
    let mut held: Vec<Option<Chain>> = (0..count).map(|_| allocator.allocate(1024, 0)).collect();
    checks.eq(
        "all_kib_allocations",
        count as usize,
        held.iter().filter(|c| c.is_some()).count(),
    );
    checks.eq("free_after_fill", 0, allocator.free_byte_count());

    for slot in held.iter_mut().skip(1).step_by(2) {
        release(allocator, slot.take());
    }
    checks.eq("half_free", capacity / 2, allocator.free_byte_count());

    let large = allocator.allocate(capacity / 2, 0);
    checks.eq(
        "chain_over_holes",
        Some(capacity / 2),
        large.as_ref().map(Chain::allocated_count),
    );
    checks.eq("free_after_chain", 0, allocator.free_byte_count());
    release(allocator, large);
    release(allocator, held.into_iter().flatten());
    checks.eq("free_after_release", capacity, allocator.free_byte_count());
}

fn mixed_classes(allocator: &mut Allocator, checks: &mut Checks) {
    let mut held = Vec::new();
    let mut failed = 0usize;
    for size in [64u64, 128, 256, 512, 1024, 2048] {
        for _ in 0..2600 {
            match allocator.allocate(size, 0) {
                Some(chain) => held.push(chain),
                None => failed += 1,
            }
        }
    }
    checks.eq("failed_allocations", 0, failed);
    checks.eq("free_after_fill", 2560, allocator.free_byte_count());

    let mut kept = Vec::with_capacity(held.len() / 2);
    for (i, chain) in held.into_iter().enumerate() {
        if i % 2 == 1 {
            allocator.deallocate_chain(chain);
        } else {
            kept.push(chain);
        }
    }
    let freed = allocator.free_byte_count();
    checks.eq("free_after_half_release", 5_244_160, freed);

    let large = allocator.allocate(freed, 0);
    checks.eq("freed_bytes_reallocated", true, large.is_some());
    checks.eq("free_after_reallocation", 0, allocator.free_byte_count());
    release(allocator, large);
    release(allocator, kept);
    checks.eq(
        "free_after_release",
        allocator.capacity(),
        allocator.free_byte_count(),
    );
}

fn contiguous_fill(allocator: &mut Allocator, checks: &mut Checks) {
    let capacity = allocator.capacity();
    for size in [32u64, 64, 128, 256] {
        let available = allocator.free_byte_count();
        let chunks: Vec<Chunk> = (0..available / size)
            .map_while(|_| allocator.allocate_contiguous(size))
            .collect();
        checks.eq(
            &format!("fill_{size}"),
            available / size,
            chunks.len() as u64,
        );
        checks.eq(&format!("free_after_fill_{size}"), 0, allocator.free_byte_count());
        for chunk in chunks {
            allocator.deallocate(chunk);
        }
        checks.eq(
            &format!("free_after_release_{size}"),
            capacity,
            allocator.free_byte_count(),
        );
    }

    allocator.defrag(true);
    checks.eq(
        "purge_leaves_regions_empty",
        true,
        allocator.regions().iter().all(|r| r.is_empty()),
    );
    checks.eq(
        "pool_is_whole_range",
        vec![Chunk::new(allocator.start_address(), capacity)],
        allocator.pool().chunks().to_vec(),
    );
}
