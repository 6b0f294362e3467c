use parsa::{
    localize, BlockData, GlobalKey, Graph, InMemoryStore, NeighborSetMode, PartitionConfig,
    PartitionEngine, PartitionError, PartitionMask, RetryChannel, SyncChannel,
};
use std::time::Duration;

const A: GlobalKey = 100;
const B: GlobalKey = 200;

fn config(num_partitions: usize, neighbor_set: NeighborSetMode) -> PartitionConfig {
    PartitionConfig {
        num_partitions,
        neighbor_set,
        ..PartitionConfig::default()
    }
}

fn block<C: SyncChannel>(channel: &C, block_id: u64, rows: &[Vec<GlobalKey>]) -> BlockData<usize> {
    let localized = localize(rows).unwrap();
    BlockData::issue(channel, block_id, localized, (0..rows.len()).collect())
}

#[test]
fn two_partitions_two_shared_neighbors() {
    let store = InMemoryStore::new();
    let mut engine = PartitionEngine::new(store.clone(), &config(2, NeighborSetMode::Exact)).unwrap();

    let rows = vec![vec![A], vec![A], vec![B], vec![B]];
    let partitioned = engine.partition_block(block(&store, 0, &rows)).unwrap();
    engine.finish().unwrap();

    // Round 0: partition 0 takes U0 (all tied at 1). Round 1: partition 1's tracker is
    // independent, U1 still costs 1 there and is the lowest live index. Rounds 2 and 3 repeat
    // the pattern on B.
    assert_eq!(partitioned.assignment, vec![0, 1, 0, 1]);
    assert_eq!(partitioned.examples, vec![0, 1, 2, 3]);
    assert_eq!(partitioned.stats.added_replicas, 4);
    assert_eq!(partitioned.stats.pushed_keys, 2);
    assert_eq!(
        store.snapshot(),
        vec![(A, PartitionMask::from_bits(0b11)), (B, PartitionMask::from_bits(0b11))]
    );
    assert_eq!(store.push_count(), 1);
    assert!(store.cached_channels().is_empty());
}

#[test]
fn empty_delta_sends_no_push() {
    let store = InMemoryStore::new();
    store.seed([(A, PartitionMask::from_bits(0b11)), (B, PartitionMask::from_bits(0b11))]);
    let mut engine = PartitionEngine::new(store.clone(), &config(2, NeighborSetMode::Exact)).unwrap();

    let rows = vec![vec![A], vec![A, B], vec![B]];
    let partitioned = engine.partition_block(block(&store, 0, &rows)).unwrap();
    engine.finish().unwrap();

    assert_eq!(partitioned.stats.added_replicas, 0);
    assert_eq!(partitioned.stats.pushed_keys, 0);
    assert_eq!(store.push_count(), 0);
    assert_eq!(engine.pending_pushes(), 0);
}

#[test]
fn later_blocks_see_earlier_pushes() {
    let store = InMemoryStore::new();
    let mut engine = PartitionEngine::new(store.clone(), &config(2, NeighborSetMode::Exact)).unwrap();

    let first = engine.partition_block(block(&store, 0, &[vec![A]])).unwrap();
    assert_eq!(first.assignment, vec![0]);
    engine.finish().unwrap();
    assert_eq!(store.get(A), PartitionMask::single(0));

    // A is already in partition 0, so only partition 1 has to add it.
    let second = engine.partition_block(block(&store, 1, &[vec![A], vec![A]])).unwrap();
    engine.finish().unwrap();
    assert_eq!(second.assignment, vec![0, 1]);
    assert_eq!(second.stats.added_replicas, 1);
    assert_eq!(store.get(A), PartitionMask::from_bits(0b11));
    assert_eq!(engine.blocks_done(), 2);
}

#[test]
fn every_partition_gets_a_fair_share() {
    let store = InMemoryStore::new();
    let mut engine = PartitionEngine::new(store.clone(), &config(3, NeighborSetMode::default())).unwrap();

    let rows: Vec<Vec<GlobalKey>> = (0..10u64).map(|i| vec![i % 4, 10 + i % 3, 20 + i]).collect();
    let partitioned = engine.partition_block(block(&store, 0, &rows)).unwrap();

    let mut counts = [0usize; 3];
    for &k in &partitioned.assignment {
        counts[k as usize] += 1;
    }
    assert_eq!(partitioned.assignment.len(), 10);
    for count in counts {
        assert!(count == 3 || count == 4, "unbalanced partition sizes {counts:?}");
    }
}

#[test]
fn assigned_vertices_attract_their_neighbors() {
    let store = InMemoryStore::new();
    store.seed([(A, PartitionMask::single(1))]);
    let mut engine = PartitionEngine::new(store.clone(), &config(2, NeighborSetMode::Exact)).unwrap();

    // Partition 0 is empty: both vertices cost 1 there and U0 wins the tie. Partition 1 already
    // holds A, so U1 costs 0 there and is picked next.
    let rows = vec![vec![B], vec![A]];
    let partitioned = engine.partition_block(block(&store, 0, &rows)).unwrap();
    engine.finish().unwrap();

    assert_eq!(partitioned.assignment, vec![0, 1]);
    assert_eq!(partitioned.stats.added_replicas, 1);
    assert_eq!(store.get(B), PartitionMask::single(0));
    assert_eq!(store.get(A), PartitionMask::single(1));
}

#[test]
fn slow_pull_is_awaited() {
    let store = InMemoryStore::new().with_latency(Duration::from_millis(20));
    let mut engine = PartitionEngine::new(store.clone(), &config(2, NeighborSetMode::Exact)).unwrap();

    let pending = block(&store, 0, &[vec![A], vec![B]]);
    let partitioned = engine.partition_block(pending).unwrap();
    engine.finish().unwrap();
    assert_eq!(partitioned.assignment, vec![0, 1]);
    assert_eq!(store.get(A), PartitionMask::single(0));
}

#[test]
fn failed_pull_is_reported() {
    let store = InMemoryStore::new();
    store.fail_next_pulls(1);
    let mut engine = PartitionEngine::new(store.clone(), &config(2, NeighborSetMode::Exact)).unwrap();

    let err = engine.partition_block(block(&store, 3, &[vec![A]])).unwrap_err();
    assert!(matches!(err, PartitionError::Sync { channel: 3, .. }));
}

#[test]
fn mask_count_mismatch_is_malformed() {
    let store = InMemoryStore::new();
    let mut engine = PartitionEngine::new(store, &config(2, NeighborSetMode::Exact)).unwrap();
    let localized = localize(&[vec![A, B]]).unwrap();
    let col_major = localized.row_major.to_col_major();

    let err = engine
        .partition_graph(5, &localized.keys, &localized.row_major, &col_major, &[PartitionMask::EMPTY])
        .unwrap_err();
    assert!(matches!(err, PartitionError::MalformedBlock { block_id: 5, .. }));
}

#[test]
fn inconsistent_views_are_malformed() {
    let store = InMemoryStore::new();
    let mut engine = PartitionEngine::new(store, &config(2, NeighborSetMode::Exact)).unwrap();
    let localized = localize(&[vec![A], vec![B]]).unwrap();
    let wrong = Graph::from_parts(vec![0, 1, 1], vec![0], 2).unwrap();
    let masks = [PartitionMask::EMPTY; 2];

    let err = engine
        .partition_graph(1, &localized.keys, &localized.row_major, &wrong, &masks)
        .unwrap_err();
    assert!(matches!(err, PartitionError::MalformedBlock { block_id: 1, .. }));
}

#[test]
fn swapped_columns_are_malformed() {
    let store = InMemoryStore::new();
    let mut engine = PartitionEngine::new(store, &config(2, NeighborSetMode::Exact)).unwrap();
    let localized = localize(&[vec![A], vec![B]]).unwrap();
    // Right shape and entry count, but column A lists U1 and column B lists U0.
    let swapped = Graph::from_parts(vec![0, 1, 2], vec![1, 0], 2).unwrap();
    let masks = [PartitionMask::EMPTY; 2];

    let err = engine
        .partition_graph(4, &localized.keys, &localized.row_major, &swapped, &masks)
        .unwrap_err();
    assert!(matches!(err, PartitionError::MalformedBlock { block_id: 4, .. }));
}

#[test]
fn retried_pushes_are_reaped_every_block() {
    let store = InMemoryStore::new();
    store.fail_next_pushes(1);
    let channel = RetryChannel::new(store.clone(), 2);
    let mut engine = PartitionEngine::new(channel.clone(), &config(2, NeighborSetMode::Exact)).unwrap();

    let first = engine.partition_block(block(&channel, 0, &[vec![A]])).unwrap();
    assert_eq!(first.assignment, vec![0]);
    assert_eq!(engine.pending_pushes(), 0);
    assert_eq!(store.push_count(), 2);

    for block_id in 1..50u64 {
        engine
            .partition_block(block(&channel, block_id, &[vec![1_000 + block_id]]))
            .unwrap();
        assert_eq!(engine.pending_pushes(), 0, "block {block_id} left pushes behind");
    }
    // The failed push landed long before the final flush.
    assert_eq!(store.get(A), PartitionMask::single(0));

    let later = engine.partition_block(block(&channel, 50, &[vec![A], vec![A]])).unwrap();
    assert_eq!(later.assignment, vec![0, 1]);
    assert_eq!(later.stats.added_replicas, 1);
    engine.finish().unwrap();
    assert_eq!(store.get(A), PartitionMask::from_bits(0b11));
}

#[test]
fn example_count_mismatch_is_malformed() {
    let store = InMemoryStore::new();
    let mut engine = PartitionEngine::new(store.clone(), &config(2, NeighborSetMode::Exact)).unwrap();
    let mut data = block(&store, 2, &[vec![A], vec![B]]);
    data.examples.pop();

    let err = engine.partition_block(data).unwrap_err();
    assert!(matches!(err, PartitionError::MalformedBlock { block_id: 2, .. }));
}

#[test]
fn invalid_config_is_rejected() {
    let err = PartitionEngine::new(InMemoryStore::new(), &config(0, NeighborSetMode::Exact)).err();
    assert!(matches!(err, Some(PartitionError::InvalidConfig(_))));
}
