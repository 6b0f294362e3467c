use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use parsa::{GlobalKey, NeighborSetMode, NeighborSetTracker, PartitionMask};

fn snapshot(n: usize, partitions: u32) -> (Vec<GlobalKey>, Vec<PartitionMask>) {
    let keys: Vec<GlobalKey> = (0..n as u64).map(|i| i.wrapping_mul(0x9e37_79b9_7f4a_7c15)).collect();
    let masks = (0..n as u64)
        .map(|i| PartitionMask::single((i % u64::from(partitions)) as u32))
        .collect();
    (keys, masks)
}

fn neighbor_set_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("NeighborSetTracker");
    let n = 50_000;
    let partitions = 16;
    let (keys, masks) = snapshot(n, 16);

    let modes = [
        ("exact", NeighborSetMode::Exact),
        (
            "approximate",
            NeighborSetMode::Approximate {
                hash_count: 4,
                bits_ratio: 1.0,
            },
        ),
    ];

    for (name, mode) in modes {
        group.bench_function(BenchmarkId::new("rebuild", name), |b| {
            let mut tracker = NeighborSetTracker::new(mode);
            b.iter(|| tracker.rebuild(partitions, black_box(&keys), black_box(&masks)));
        });

        group.bench_function(BenchmarkId::new("contains", name), |b| {
            let mut tracker = NeighborSetTracker::new(mode);
            tracker.rebuild(partitions, &keys, &masks);
            b.iter(|| {
                let mut hits = 0usize;
                for (i, &key) in keys.iter().enumerate() {
                    if tracker.contains((i % partitions) as u32, black_box(key)) {
                        hits += 1;
                    }
                }
                hits
            });
        });
    }

    group.finish();
}

criterion_group!(benches, neighbor_set_benchmark);
criterion_main!(benches);
