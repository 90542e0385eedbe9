use segalloc_core::{Allocator, Chain, Chunk};

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;
const GIB: u64 = 1024 * MIB;

#[test]
fn allocate_all_then_release() {
    let mut allocator = Allocator::new(4 * GIB, 0);
    let all = allocator.allocate(4 * GIB, 0).expect("whole range fits");
    assert_eq!(all.allocated_count(), 4 * GIB);
    assert_eq!(allocator.free_byte_count(), 0);
    assert!(allocator.allocate(1, 0).is_none());

    allocator.deallocate_chain(all);
    assert_eq!(allocator.free_byte_count(), 4 * GIB);
    assert_eq!(allocator.outstanding_count(), 0);
}

#[test]
fn allocate_all_with_overhead() {
    let overhead = 16;
    let mut allocator = Allocator::new(4 * GIB, 0);
    let half = allocator.allocate(2 * GIB, overhead).expect("half fits");
    let reserved = overhead * half.len() as u64;

    assert!(half.allocated_count() >= 2 * GIB + reserved);
    assert!(half.usable_count(overhead) >= 2 * GIB);
    assert!(half.iter().all(|c| c.length > overhead));
    assert!(allocator.free_byte_count() <= 2 * GIB - reserved);

    allocator.deallocate_chain(half);
    assert_eq!(allocator.free_byte_count(), 4 * GIB);
}

#[test]
fn two_halves_of_the_range() {
    let mut allocator = Allocator::new(GIB, 0);
    let h1 = allocator.allocate(GIB / 2, 0).unwrap();
    let h2 = allocator.allocate(GIB / 2, 0).unwrap();
    assert_eq!(allocator.free_byte_count(), 0);
    allocator.deallocate_chain(h1);
    assert_eq!(allocator.free_byte_count(), GIB / 2);
    allocator.deallocate_chain(h2);
    assert_eq!(allocator.free_byte_count(), GIB);
}

#[test]
fn many_kib_allocations_fill_the_range() {
    let mut allocator = Allocator::new(10 * MIB, 0);
    let allocated: Vec<Chain> = (0..10240)
        .map(|_| allocator.allocate(1024, 0).expect("fits"))
        .collect();
    let total: u64 = allocated.iter().map(Chain::allocated_count).sum();
    assert_eq!(total, 10 * MIB);
    assert_eq!(allocator.free_byte_count(), 0);

    for chain in allocated {
        allocator.deallocate_chain(chain);
    }
    assert_eq!(allocator.free_byte_count(), 10 * MIB);
}

#[test]
fn chained_allocation_spans_fragmented_space() {
    let mut allocator = Allocator::new(10 * MIB, 0);
    let mut allocated: Vec<Option<Chain>> = (0..10240)
        .map(|_| allocator.allocate(1024, 0))
        .collect();
    for slot in allocated.iter_mut().skip(1).step_by(2) {
        allocator.deallocate_chain(slot.take().unwrap());
    }
    assert_eq!(allocator.free_byte_count(), 5 * MIB);
    // Every free byte sits in a lone 1 KiB hole; no contiguous page exists.
    assert!(allocator.allocate_contiguous(2048).is_none());

    let large = allocator.allocate(5 * MIB, 0).expect("chain over holes");
    assert_eq!(large.allocated_count(), 5 * MIB);
    assert_eq!(allocator.free_byte_count(), 0);
    allocator.deallocate_chain(large);
    assert_eq!(allocator.free_byte_count(), 5 * MIB);

    for chain in allocated.into_iter().flatten() {
        allocator.deallocate_chain(chain);
    }
    assert_eq!(allocator.free_byte_count(), 10 * MIB);
}

#[test]
fn mixed_size_classes_reuse_freed_bytes_exactly() {
    let mut allocator = Allocator::new(10 * MIB, 0);
    let mut allocated = Vec::new();
    for size in [64u64, 128, 256, 512, 1024, 2048] {
        for _ in 0..2600 {
            allocated.push(allocator.allocate(size, 0).expect("fits"));
        }
    }
    assert_eq!(allocator.free_byte_count(), 2560);

    for (i, chain) in allocated.into_iter().enumerate() {
        if i % 2 == 1 {
            allocator.deallocate_chain(chain);
        }
    }
    assert_eq!(allocator.free_byte_count(), 5_244_160);

    let large = allocator.allocate(5_244_160, 0).expect("freed bytes come back");
    assert_eq!(allocator.free_byte_count(), 0);
    allocator.deallocate_chain(large);
    assert_eq!(allocator.free_byte_count(), 5_244_160);
}

#[test]
fn contiguous_allocate_all() {
    let mut allocator = Allocator::new(4 * GIB, 0);
    let all = allocator.allocate_contiguous(4 * GIB).unwrap();
    assert_eq!(all, Chunk::new(0, 4 * GIB));
    assert!(allocator.allocate_contiguous(10).is_none());
    allocator.deallocate(all);
    assert_eq!(allocator.free_byte_count(), 4 * GIB);
}

#[test]
fn contiguous_halves() {
    let mut allocator = Allocator::new(GIB, 0);
    let h1 = allocator.allocate_contiguous(GIB / 2).unwrap();
    let h2 = allocator.allocate_contiguous(GIB / 2).unwrap();
    assert!(!h1.overlaps(&h2));
    allocator.deallocate(h1);
    assert_eq!(allocator.free_byte_count(), GIB / 2);
}

#[test]
fn contiguous_small_fills_recombine_between_sizes() {
    let mut allocator = Allocator::new(10 * MIB, 0);
    for size in [32u64, 64, 128, 256] {
        let available = allocator.free_byte_count();
        let allocated: Vec<Chunk> = (0..available / size)
            .map(|_| allocator.allocate_contiguous(size).expect("fits"))
            .collect();
        assert_eq!(allocator.free_byte_count(), 0, "size {size}");
        for chunk in allocated {
            allocator.deallocate(chunk);
        }
        assert_eq!(allocator.free_byte_count(), 10 * MIB, "size {size}");
    }
}

#[test]
fn fixed_stride_round_trips_return_every_byte() {
    let capacity = 4 * MIB;
    let mut allocator = Allocator::new(capacity, 0);
    let strides: Vec<u64> = allocator.regions().iter().map(|r| r.stride()).collect();
    for stride in strides {
        let chains: Vec<Chain> = (0..capacity / stride)
            .map(|_| allocator.allocate(stride, 0).expect("fits"))
            .collect();
        for chain in chains {
            allocator.deallocate_chain(chain);
        }
        assert_eq!(allocator.free_byte_count(), capacity, "stride {stride}");
    }
}

#[test]
fn nonzero_start_is_respected() {
    let start = 0x4000_0000;
    let mut allocator = Allocator::new(MIB, start);
    let chain = allocator.allocate(300 * KIB, 8).unwrap();
    assert!(chain
        .iter()
        .all(|c| c.address >= start && c.end() <= start + MIB));
    allocator.deallocate_chain(chain);
    allocator.defrag(true);
    assert_eq!(allocator.pool().chunks(), &[Chunk::new(start, MIB)]);
}
