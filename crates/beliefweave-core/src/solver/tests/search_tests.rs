use crate::solver::solve::{SearchBudget, Solver};
use crate::solver::tests::support::{chain_options, ChainAction, ChainModel, ChainObservation};

#[test]
fn zero_budget_improve_leaves_the_tree_unchanged() {
    let mut solver =
        Solver::new(ChainModel::default(), chain_options()).expect("solver should build");
    let nodes_before = solver.tree().node_count();
    let sequences_before = solver.history().len();

    let ran = solver
        .improve(SearchBudget::none())
        .expect("zero-budget improve should succeed");

    assert_eq!(ran, 0);
    assert_eq!(solver.tree().node_count(), nodes_before);
    assert_eq!(solver.history().len(), sequences_before);
}

#[test]
fn improve_runs_the_requested_simulation_count() {
    let mut solver =
        Solver::new(ChainModel::default(), chain_options()).expect("solver should build");
    let ran = solver
        .improve(SearchBudget::simulations(40))
        .expect("improve should succeed");

    assert_eq!(ran, 40);
    // Every simulation takes at least one action from the root.
    let root = solver.root().expect("root exists");
    assert_eq!(root.mapping().total_visits(), 40);
    solver.check_invariants().expect("invariants should hold");
}

#[test]
fn the_recommended_action_walks_toward_the_exit() {
    let mut solver =
        Solver::new(ChainModel::default(), chain_options()).expect("solver should build");
    solver
        .improve(SearchBudget::simulations(400))
        .expect("improve should succeed");

    assert_eq!(solver.recommended_action(), Some(ChainAction::Right));
    let q = solver.root_q_value().expect("root q should be available");
    assert!(q > 0.0, "walking right should look profitable, got {q}");
}

#[test]
fn advance_reroots_at_the_cached_child_and_preserves_ids() {
    let mut solver =
        Solver::new(ChainModel::default(), chain_options()).expect("solver should build");
    solver
        .improve(SearchBudget::simulations(200))
        .expect("improve should succeed");

    let old_root = solver.root_id();
    let expected_child = solver
        .root()
        .expect("root exists")
        .get_child(&ChainAction::Right, &ChainObservation(1))
        .expect("the RIGHT/saw1 child must exist after search");

    solver
        .advance(&ChainAction::Right, &ChainObservation(1))
        .expect("advance should succeed");

    assert_eq!(solver.root_id(), expected_child);
    assert!(!solver.tree().contains(old_root));
    assert_eq!(solver.root().expect("root exists").depth(), 0);
    solver.check_invariants().expect("invariants should hold");
}

#[test]
fn advance_replenishes_a_thin_child_belief() {
    let mut solver =
        Solver::new(ChainModel::default(), chain_options()).expect("solver should build");
    // No search at all: the child belief starts empty and must be filled by
    // the replenisher.
    solver
        .advance(&ChainAction::Right, &ChainObservation(1))
        .expect("advance should succeed");

    let minimum = solver.options().min_particle_count as usize;
    let root = solver.root().expect("root exists");
    assert!(root.particle_count() >= minimum);
    solver.check_invariants().expect("invariants should hold");
}

#[test]
fn search_continues_across_multiple_advances() {
    let mut solver =
        Solver::new(ChainModel::default(), chain_options()).expect("solver should build");
    for expected_position in 1..=2_u8 {
        solver
            .improve(SearchBudget::simulations(150))
            .expect("improve should succeed");
        let action = solver.recommended_action().expect("an action is known");
        assert_eq!(action, ChainAction::Right);
        solver
            .advance(&action, &ChainObservation(expected_position))
            .expect("advance should succeed");
        solver.check_invariants().expect("invariants should hold");
    }
}

#[test]
fn applying_a_model_change_replays_affected_histories() {
    let mut solver =
        Solver::new(ChainModel::default(), chain_options()).expect("solver should build");
    solver
        .improve(SearchBudget::simulations(150))
        .expect("improve should succeed");
    let q_before = solver.root_q_value().expect("root q available");

    // Make intermediate RIGHT steps much more rewarding and replay.
    solver
        .apply_changes(&[6.0])
        .expect("apply_changes should succeed");
    solver.check_invariants().expect("invariants should hold");

    let q_after = solver.root_q_value().expect("root q available");
    assert!(
        q_after > q_before + 1.0,
        "rewritten rewards should lift the root value ({q_before} -> {q_after})"
    );
    assert_eq!(solver.model().right_reward, 6.0);
}

#[test]
fn rejecting_invalid_options_is_a_configuration_error() {
    let mut options = chain_options();
    options.discount_factor = 1.5;
    let result = Solver::new(ChainModel::default(), options);
    assert!(matches!(
        result,
        Err(crate::solver::error::SolverError::Configuration { .. })
    ));
}
