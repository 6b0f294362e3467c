use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use parsa::{
    localize, BlockData, GlobalKey, InMemoryStore, NeighborSetMode, PartitionConfig, PartitionEngine,
};

/// Rows with a power-law-ish key distribution: low keys are shared by many rows.
fn rows(n: usize, degree: usize, universe: u64) -> Vec<Vec<GlobalKey>> {
    let mut state = 0x2545_f491_4f6c_dd1du64;
    (0..n)
        .map(|_| {
            (0..degree)
                .map(|_| {
                    state ^= state << 13;
                    state ^= state >> 7;
                    state ^= state << 17;
                    let r = state % universe;
                    r * r / universe
                })
                .collect()
        })
        .collect()
}

fn partition_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("PartitionEngine");
    let block = rows(20_000, 8, 50_000);
    group.throughput(Throughput::Elements(block.len() as u64));

    for (name, mode) in [
        ("exact", NeighborSetMode::Exact),
        ("approximate", NeighborSetMode::default()),
    ] {
        for partitions in [4usize, 16] {
            let config = PartitionConfig {
                num_partitions: partitions,
                neighbor_set: mode,
                ..PartitionConfig::default()
            };
            group.bench_with_input(BenchmarkId::new(name, partitions), &block, |b, block| {
                b.iter_batched(
                    || {
                        let store = InMemoryStore::new();
                        let engine = PartitionEngine::new(store.clone(), &config).unwrap();
                        let localized = localize(block).unwrap();
                        let data = BlockData::issue(&store, 0, localized, vec![(); block.len()]);
                        (engine, data)
                    },
                    |(mut engine, data)| {
                        let partitioned = engine.partition_block(data).unwrap();
                        engine.finish().unwrap();
                        partitioned.stats
                    },
                    BatchSize::LargeInput,
                );
            });
        }
    }

    group.finish();
}

criterion_group!(benches, partition_benchmark);
criterion_main!(benches);
