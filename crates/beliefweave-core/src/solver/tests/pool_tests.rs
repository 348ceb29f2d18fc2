use crate::solver::pool::{Region, StatePool};
use crate::solver::tests::support::ChainState;
use crate::solver::ids::StateId;

#[test]
fn canonicalization_deduplicates_states() {
    let mut pool: StatePool<ChainState> = StatePool::new();
    let a = pool.get_or_canonicalize(ChainState(1));
    let b = pool.get_or_canonicalize(ChainState(2));
    let c = pool.get_or_canonicalize(ChainState(1));

    assert_eq!(a, c);
    assert_ne!(a, b);
    assert_eq!(pool.len(), 2);
    assert_eq!(pool.state(a), Some(&ChainState(1)));
    assert_eq!(pool.vector(b), Some([2.0].as_slice()));
}

#[test]
fn states_within_matches_a_linear_scan() {
    let mut pool: StatePool<ChainState> = StatePool::new();
    for position in 0..=200_u8 {
        pool.get_or_canonicalize(ChainState(position));
    }

    let region = Region::new(vec![40.0], vec![90.0]);
    let mut hits = pool.states_within(&region);
    hits.sort();

    let expected: Vec<StateId> = pool
        .states()
        .filter(|(_, state)| (40..=90).contains(&state.0))
        .map(|(id, _)| id)
        .collect();
    assert_eq!(hits, expected);
}

#[test]
fn states_within_everything_returns_all_states() {
    let mut pool: StatePool<ChainState> = StatePool::new();
    for position in 0..50_u8 {
        pool.get_or_canonicalize(ChainState(position));
    }
    assert_eq!(pool.states_within(&Region::everything(1)).len(), 50);
}

#[test]
fn queries_on_an_empty_pool_never_fail() {
    let pool: StatePool<ChainState> = StatePool::new();
    assert!(pool.states_within(&Region::everything(1)).is_empty());
}

#[test]
fn region_containment_is_inclusive_of_bounds() {
    let region = Region::new(vec![0.0, -1.0], vec![2.0, 1.0]);
    assert!(region.contains(&[0.0, -1.0]));
    assert!(region.contains(&[2.0, 1.0]));
    assert!(!region.contains(&[2.1, 0.0]));
    assert!(region.intersects(&Region::new(vec![2.0, 0.0], vec![3.0, 0.5])));
    assert!(!region.intersects(&Region::new(vec![2.5, 0.0], vec![3.0, 0.5])));
}
