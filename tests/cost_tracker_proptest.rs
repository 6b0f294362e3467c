use parsa::CostTracker;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Operation {
    Decr(usize),
    Remove(usize),
    Min,
}

fn operation() -> impl Strategy<Value = Operation> {
    prop_oneof![
        3 => any::<usize>().prop_map(Operation::Decr),
        1 => any::<usize>().prop_map(Operation::Remove),
        2 => Just(Operation::Min),
    ]
}

proptest! {
    #[test]
    fn test_cost_tracker_matches_naive_model(
        costs in proptest::collection::vec(0u32..12, 1..64),
        cache_limit in 0u32..16,
        ops in proptest::collection::vec(operation(), 1..200),
    ) {
        let mut tracker = CostTracker::new();
        tracker.init(&costs, cache_limit);
        let mut model: Vec<Option<u32>> = costs.iter().copied().map(Some).collect();

        for op in ops {
            match op {
                Operation::Decr(i) => {
                    let v = i % model.len();
                    if let Some(c) = model[v].filter(|&c| c > 0) {
                        tracker.decr_and_reorder(v);
                        model[v] = Some(c - 1);
                    }
                }
                Operation::Remove(i) => {
                    let v = i % model.len();
                    if model[v].is_some() {
                        tracker.remove(v);
                        model[v] = None;
                    }
                }
                Operation::Min => {
                    let expected = model.iter().flatten().min().copied();
                    match tracker.min_index() {
                        Some(v) => {
                            prop_assert_eq!(model[v], expected, "min_index returned {}", v);
                        }
                        None => prop_assert_eq!(expected, None),
                    }
                }
            }
        }

        prop_assert_eq!(tracker.len(), model.iter().flatten().count());
        for (v, &cost) in model.iter().enumerate() {
            prop_assert_eq!(tracker.cost(v), cost);
        }
    }

    #[test]
    fn test_untouched_ties_resolve_to_lowest_index(
        costs in proptest::collection::vec(0u32..4, 1..32),
    ) {
        let mut tracker = CostTracker::new();
        tracker.init(&costs, 8);
        let min = costs.iter().min().copied();
        let first = costs.iter().position(|&c| Some(c) == min);
        prop_assert_eq!(tracker.min_index(), first);
    }
}
