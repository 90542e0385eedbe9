//! Allocator benchmarks.

use criterion::{BatchSize, BenchmarkId, Criterion, criterion_group, criterion_main};
use segalloc_core::{Allocator, Chain, Chunk};

const MIB: u64 = 1024 * 1024;

fn bench_chain_cycle(c: &mut Criterion) {
    let sizes: &[u64] = &[16, 64, 256, 1024, 4096, 32768, 300_000];
    let mut group = c.benchmark_group("chain_alloc_free_cycle");

    for &size in sizes {
        group.bench_with_input(BenchmarkId::new("overhead_0", size), &size, |b, &sz| {
            let mut allocator = Allocator::new(64 * MIB, 0);
            b.iter(|| {
                let chain = allocator.allocate(sz, 0).expect("capacity is ample");
                allocator.deallocate_chain(criterion::black_box(chain));
            });
        });
        group.bench_with_input(BenchmarkId::new("overhead_16", size), &size, |b, &sz| {
            let mut allocator = Allocator::new(64 * MIB, 0);
            b.iter(|| {
                let chain = allocator.allocate(sz, 16).expect("capacity is ample");
                allocator.deallocate_chain(criterion::black_box(chain));
            });
        });
    }
    group.finish();
}

fn bench_contiguous_burst(c: &mut Criterion) {
    let mut group = c.benchmark_group("contiguous_burst");

    for &size in &[64u64, 1024, 16384] {
        group.bench_with_input(BenchmarkId::new("1000x", size), &size, |b, &sz| {
            let mut allocator = Allocator::new(64 * MIB, 0);
            b.iter(|| {
                let chunks: Vec<Chunk> = (0..1000)
                    .map(|_| allocator.allocate_contiguous(sz).expect("capacity is ample"))
                    .collect();
                for chunk in criterion::black_box(chunks) {
                    allocator.deallocate(chunk);
                }
            });
        });
    }
    group.finish();
}

/// Every other KiB chunk freed, then one chain across the holes.
fn fragmented(capacity: u64) -> (Allocator, Vec<Chain>) {
    let mut allocator = Allocator::new(capacity, 0);
    let held: Vec<Chain> = (0..capacity / 1024)
        .map(|_| allocator.allocate(1024, 0).expect("fits"))
        .collect();
    let mut kept = Vec::with_capacity(held.len() / 2);
    for (i, chain) in held.into_iter().enumerate() {
        if i % 2 == 1 {
            allocator.deallocate_chain(chain);
        } else {
            kept.push(chain);
        }
    }
    (allocator, kept)
}

fn bench_fragmented_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("fragmented_chain");
    group.sample_size(20);

    group.bench_function("half_of_4MiB", |b| {
        b.iter_batched(
            || fragmented(4 * MIB),
            |(mut allocator, kept)| {
                let chain = allocator.allocate(2 * MIB, 0).expect("holes suffice");
                criterion::black_box((chain, kept));
            },
            BatchSize::LargeInput,
        );
    });
    group.finish();
}

fn bench_defrag_after_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("defrag_after_churn");
    group.sample_size(20);

    for purge in [false, true] {
        group.bench_with_input(BenchmarkId::new("purge", purge), &purge, |b, &purge| {
            b.iter_batched(
                || {
                    let mut allocator = Allocator::new(16 * MIB, 0);
                    let chunks: Vec<Chunk> = (0..20_000u64)
                        .map(|i| allocator.allocate_contiguous(32 << (i % 6)).expect("fits"))
                        .collect();
                    for chunk in chunks {
                        allocator.deallocate(chunk);
                    }
                    allocator
                },
                |mut allocator| criterion::black_box(allocator.defrag(purge)),
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_chain_cycle,
    bench_contiguous_burst,
    bench_fragmented_chain,
    bench_defrag_after_churn
);
criterion_main!(benches);
