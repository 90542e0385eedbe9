use segalloc_core::{Allocator, AllocatorConfig, AllocatorLogLevel, Chunk, SharedAllocator};

const MIB: u64 = 1024 * 1024;

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

    fn gen_range(&mut self, low: usize, high_inclusive: usize) -> usize {
        assert!(low <= high_inclusive);
        let span = high_inclusive - low + 1;
        low + (self.next_u64() as usize % span)
    }
}

/// Free extents plus checked-out chunks must tile the managed range.
fn assert_partition(allocator: &Allocator) {
    let mut extents = allocator.free_extents();
    extents.extend(allocator.outstanding_chunks());
    extents.sort_unstable_by_key(|c| c.address);

    let mut cursor = allocator.start_address();
    for chunk in &extents {
        assert_eq!(chunk.address, cursor, "gap or overlap at {chunk}");
        cursor = chunk.end();
    }
    assert_eq!(cursor, allocator.end_address());
}

fn run_sequence(seed: u64, ops: usize, capacity: u64) {
    let mut rng = XorShift64::new(seed);
    let mut allocator = Allocator::new(capacity, 0x10_0000);
    let mut live: Vec<Vec<Chunk>> = Vec::new();

    for step in 0..ops {
        match rng.gen_range(0, 9) {
            0..=3 => {
                let size = rng.gen_range(1, 64 * 1024) as u64;
                let overhead = [0u64, 8, 16, 48][rng.gen_range(0, 3)];
                if let Some(chain) = allocator.allocate(size, overhead) {
                    assert!(chain.usable_count(overhead) >= size);
                    assert!(chain.iter().all(|c| c.length > overhead));
                    live.push(chain.into_vec());
                }
            }
            4..=5 => {
                let size = rng.gen_range(1, 256 * 1024) as u64;
                if let Some(chunk) = allocator.allocate_contiguous(size) {
                    assert!(chunk.length >= size);
                    live.push(vec![chunk]);
                }
            }
            6..=8 if !live.is_empty() => {
                let index = rng.gen_range(0, live.len() - 1);
                for chunk in live.swap_remove(index) {
                    allocator.deallocate(chunk);
                }
            }
            _ => {
                allocator.defrag(rng.next_u64() % 4 == 0);
            }
        }
        if step % 64 == 0 {
            assert_partition(&allocator);
        }
    }

    assert_partition(&allocator);
    for chunks in live {
        for chunk in chunks {
            allocator.deallocate(chunk);
        }
    }
    assert_eq!(allocator.free_byte_count(), capacity);
    assert_eq!(allocator.outstanding_count(), 0);
    allocator.defrag(true);
    assert_eq!(allocator.pool().chunks(), &[Chunk::new(0x10_0000, capacity)]);
}

#[test]
fn random_sequences_conserve_and_partition() {
    for seed in [0, 1, 42, 0xDEAD_BEEF] {
        run_sequence(seed, 4_000, 8 * MIB);
    }
}

#[test]
fn tight_capacity_sequences_roll_back_cleanly() {
    for seed in [7, 1234] {
        run_sequence(seed, 3_000, 512 * 1024);
    }
}

#[test]
fn double_free_never_inflates_free_bytes() {
    let config = AllocatorConfig {
        min_log_level: AllocatorLogLevel::Warn,
        ..AllocatorConfig::default()
    };
    let mut allocator = Allocator::with_config(MIB, 0, config).unwrap();
    let chain = allocator.allocate(10_000, 0).unwrap();
    let copy = chain.clone();
    allocator.deallocate_chain(chain);
    allocator.deallocate_chain(copy);
    assert_eq!(allocator.free_byte_count(), MIB);
    assert_partition(&allocator);

    let warnings = allocator.drain_lifecycle_logs();
    assert!(!warnings.is_empty());
    assert!(warnings.iter().all(|r| r.event == "double_free_detected"));
}

#[test]
fn snapshot_restores_mid_sequence() {
    let mut rng = XorShift64::new(99);
    let mut allocator = Allocator::new(4 * MIB, 0);
    let mut live = Vec::new();
    for _ in 0..500 {
        let size = rng.gen_range(1, 20_000) as u64;
        if let Some(chain) = allocator.allocate(size, 16) {
            live.push(chain);
        }
        if rng.gen_range(0, 2) == 0 && !live.is_empty() {
            let index = rng.gen_range(0, live.len() - 1);
            allocator.deallocate_chain(live.swap_remove(index));
        }
    }

    let mut restored = Allocator::from_snapshot(allocator.snapshot()).unwrap();
    assert_partition(&restored);
    for chain in live {
        restored.deallocate_chain(chain);
    }
    assert_eq!(restored.free_byte_count(), 4 * MIB);
}

#[test]
fn shared_allocator_serializes_threads() {
    use std::sync::Arc;

    let shared = Arc::new(SharedAllocator::new(Allocator::new(32 * MIB, 0)));
    let handles: Vec<_> = (0..8u64)
        .map(|t| {
            let shared = Arc::clone(&shared);
            std::thread::spawn(move || {
                let mut rng = XorShift64::new(t + 1);
                let mut held = Vec::new();
                for _ in 0..300 {
                    let size = rng.gen_range(1, 32 * 1024) as u64;
                    if let Some(chain) = shared.allocate(size, 8) {
                        held.push(chain);
                    }
                    if held.len() > 8 {
                        shared.deallocate_chain(held.remove(0));
                    }
                }
                for chain in held {
                    shared.deallocate_chain(chain);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    shared.with(|a| {
        assert_partition(a);
        assert_eq!(a.free_byte_count(), 32 * MIB);
    });
}
