//! Snapshot store benchmarks.
//!
//! Measures snapshot writes at typical state sizes and the height lookup
//! used during reorg recovery.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use strata_storage::{FileSnapshotStore, MemorySnapshotStore, Snapshot, SnapshotStore};
use strata_types::BlockHash;

/// Generate test data of specified size
fn generate_data(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

fn bench_snapshot_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot_write");

    for size in [10_240, 1_048_576].iter() {
        group.throughput(Throughput::Bytes(*size as u64));

        group.bench_with_input(BenchmarkId::new("memory", size), size, |b, &size| {
            let store = MemorySnapshotStore::new();
            let data = generate_data(size);
            let mut height = 0;
            b.iter(|| {
                height += 1;
                black_box(store.put(Snapshot::new(height, BlockHash::null(), data.clone())))
            });
        });

        group.bench_with_input(BenchmarkId::new("file", size), size, |b, &size| {
            let dir = tempfile::TempDir::new().unwrap();
            let store = FileSnapshotStore::open(dir.path()).unwrap();
            let data = generate_data(size);
            let mut height = 0;
            b.iter(|| {
                height += 1;
                black_box(store.put(Snapshot::new(height, BlockHash::null(), data.clone())))
            });
        });
    }

    group.finish();
}

fn bench_latest_lookup(c: &mut Criterion) {
    let store = MemorySnapshotStore::new();
    for h in (0..10_000u32).step_by(100) {
        store
            .put(Snapshot::new(h, BlockHash::null(), vec![0u8; 64]))
            .unwrap();
    }

    c.bench_function("latest_at_or_below", |b| {
        b.iter(|| black_box(store.latest_at_or_below(black_box(5_050)).unwrap()))
    });
}

criterion_group!(benches, bench_snapshot_write, bench_latest_lookup);
criterion_main!(benches);
