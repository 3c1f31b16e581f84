//! Backend benchmarks.
//!
//! Raw probe cost without telemetry: one allocate/free pair per size, and a
//! burst of allocations released in reverse.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use heapscope_core::{BackendConfig, BackendKind, build_probe};

fn bench_alloc_free_cycle(c: &mut Criterion) {
    let sizes: &[usize] = &[16, 64, 128, 512, 2048];
    let config = BackendConfig::default();
    let mut group = c.benchmark_group("alloc_free_cycle");

    for kind in BackendKind::ALL {
        for &size in sizes {
            let mut probe = build_probe(kind, kind.as_str(), &config);
            if probe.max_allocations(size) == 0 {
                continue;
            }
            group.bench_with_input(BenchmarkId::new(kind.as_str(), size), &size, |b, &sz| {
                b.iter(|| {
                    if let Some(handle) = probe.allocate(black_box(sz)) {
                        black_box(probe.free(handle));
                    }
                });
            });
        }
    }
    group.finish();
}

fn bench_burst(c: &mut Criterion) {
    let config = BackendConfig::default();
    let mut group = c.benchmark_group("burst_lifo");
    group.throughput(Throughput::Elements(100));

    for kind in [
        BackendKind::GeneralHeap,
        BackendKind::FixedBlockPool,
        BackendKind::SegregatedFit,
    ] {
        let mut probe = build_probe(kind, kind.as_str(), &config);
        let mut handles = Vec::with_capacity(100);
        group.bench_function(kind.as_str(), |b| {
            b.iter(|| {
                for _ in 0..100 {
                    if let Some(handle) = probe.allocate(128) {
                        handles.push(handle);
                    }
                }
                while let Some(handle) = handles.pop() {
                    probe.free(handle);
                }
            });
        });
    }
    group.finish();
}

fn bench_usage_query(c: &mut Criterion) {
    let config = BackendConfig::default();
    let mut group = c.benchmark_group("query_usage");

    for kind in BackendKind::ALL {
        let mut probe = build_probe(kind, kind.as_str(), &config);
        for _ in 0..64 {
            let _ = probe.allocate(96);
        }
        group.bench_function(kind.as_str(), |b| {
            b.iter(|| black_box(probe.query_usage()));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_alloc_free_cycle, bench_burst, bench_usage_query);
criterion_main!(benches);
