//! Seeded allocation churn.
//!
//! A storm mixes chained allocations (with random overhead), contiguous
//! allocations, frees of random live handles, and explicit defrags. After
//! every `check_every` steps the allocator must still partition its range
//! and conserve bytes; the first violation aborts the storm.

use serde::{Deserialize, Serialize};

use segalloc_core::{Allocator, AllocatorConfig, AllocatorLogRecord, Chunk};

use crate::error::HarnessError;
use crate::invariants::{check_conservation, check_partition};

#[derive(Clone, Copy, Debug)]
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        // Zero is a fixed point of xorshift.
        Self {
            state: if seed == 0 { 0x9E37_79B9_7F4A_7C15 } else { seed },
        }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    fn gen_range(&mut self, low: u64, high_inclusive: u64) -> u64 {
        assert!(low <= high_inclusive);
        let span = high_inclusive - low + 1;
        low + self.next_u64() % span
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StormConfig {
    pub seed: u64,
    pub ops: usize,
    pub capacity: u64,
    pub start: u64,
    /// Largest single request, chained or contiguous.
    pub max_request: u64,
    pub check_every: usize,
}

impl Default for StormConfig {
    fn default() -> Self {
        Self {
            seed: 0xDEAD_BEEF,
            ops: 2_000,
            capacity: 4 * 1024 * 1024,
            start: 0x1000,
            max_request: 64 * 1024,
            check_every: 1,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StormReport {
    pub seed: u64,
    pub ops: usize,
    pub capacity: u64,
    pub chained_allocations: u64,
    pub contiguous_allocations: u64,
    pub failed_allocations: u64,
    pub frees: u64,
    pub explicit_defrags: u64,
    pub total_defrags: u64,
    pub peak_outstanding_bytes: u64,
    pub invariant_checks: u64,
    pub final_free_bytes: u64,
    #[serde(skip)]
    pub lifecycle: Vec<AllocatorLogRecord>,
}

pub fn run(storm: &StormConfig, config: AllocatorConfig) -> Result<StormReport, HarnessError> {
    let mut allocator = Allocator::with_config(storm.capacity, storm.start, config)?;
    let mut rng = XorShift64::new(storm.seed);
    let mut live: Vec<Vec<Chunk>> = Vec::new();
    let max_request = storm.max_request.max(1);
    let check_every = storm.check_every.max(1);
    let mut report = StormReport {
        seed: storm.seed,
        ops: storm.ops,
        capacity: storm.capacity,
        ..StormReport::default()
    };

    for step in 0..storm.ops {
        match rng.gen_range(0, 9) {
            0..=3 => {
                let size = rng.gen_range(1, max_request);
                let overhead = [0u64, 8, 16, 64][rng.gen_range(0, 3) as usize];
                match allocator.allocate(size, overhead) {
                    Some(chain) => {
                        if chain.usable_count(overhead) < size {
                            return Err(HarnessError::Invariant {
                                step,
                                detail: format!("chain short of {size} usable bytes"),
                            });
                        }
                        report.chained_allocations += 1;
                        live.push(chain.into_vec());
                    }
                    None => report.failed_allocations += 1,
                }
            }
            4..=5 => {
                let size = rng.gen_range(1, max_request);
                match allocator.allocate_contiguous(size) {
                    Some(chunk) => {
                        report.contiguous_allocations += 1;
                        live.push(vec![chunk]);
                    }
                    None => report.failed_allocations += 1,
                }
            }
            6..=8 if !live.is_empty() => {
                let index = rng.gen_range(0, live.len() as u64 - 1) as usize;
                for chunk in live.swap_remove(index) {
                    allocator.deallocate(chunk);
                }
                report.frees += 1;
            }
            _ => {
                allocator.defrag(rng.next_u64() % 4 == 0);
                report.explicit_defrags += 1;
            }
        }

        report.peak_outstanding_bytes = report
            .peak_outstanding_bytes
            .max(allocator.outstanding_byte_count());
        if step % check_every == 0 {
            verify(&allocator, step)?;
            report.invariant_checks += 1;
        }
    }

    for chunks in live {
        for chunk in chunks {
            allocator.deallocate(chunk);
        }
    }
    verify(&allocator, storm.ops)?;
    report.invariant_checks += 1;
    if allocator.free_byte_count() != storm.capacity {
        return Err(HarnessError::Invariant {
            step: storm.ops,
            detail: format!(
                "{} of {} bytes free after releasing everything",
                allocator.free_byte_count(),
                storm.capacity
            ),
        });
    }

    report.total_defrags = allocator.defrags_count();
    report.final_free_bytes = allocator.free_byte_count();
    report.lifecycle = allocator.drain_lifecycle_logs();
    Ok(report)
}

fn verify(allocator: &Allocator, step: usize) -> Result<(), HarnessError> {
    check_partition(allocator)
        .and_then(|()| check_conservation(allocator))
        .map_err(|detail| HarnessError::Invariant { step, detail })
}
