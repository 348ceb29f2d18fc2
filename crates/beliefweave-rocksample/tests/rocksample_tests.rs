use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use beliefweave_core::{
    HeuristicType, PomdpModel, SearchBudget, Solver, SolverOptions,
};
use beliefweave_rocksample::{
    MapError, RockObservation, RockSampleAction, RockSampleChange, RockSampleMap, RockSampleModel,
    RockSampleState, BAD_ROCK_PENALTY, EXIT_REWARD, GOOD_ROCK_REWARD, ILLEGAL_MOVE_PENALTY,
};

fn options(min_particles: u64, max_particles: u64, horizon: u64, seed: u64) -> SolverOptions {
    SolverOptions {
        discount_factor: 0.95,
        min_particle_count: min_particles,
        max_particle_count: max_particles,
        horizon,
        exploration_coefficient: 1.0,
        heuristic_type: HeuristicType::Zero,
        search_budget_ms: 0,
        search_budget_iterations: 0,
        rng_seed: seed,
        serializer_path: None,
        max_replenish_attempts: 5000,
    }
}

#[test]
fn maps_parse_start_and_rock_cells() {
    let map = RockSampleMap::parse("0..\n.S.\n1..\n").expect("map should parse");
    assert_eq!(map.width, 3);
    assert_eq!(map.height, 3);
    assert_eq!(map.start, (1, 1));
    assert_eq!(map.rocks, vec![(0, 0), (0, 2)]);
    assert_eq!(map.rock_at(0, 2), Some(1));
    assert_eq!(map.rock_at(1, 1), None);
}

#[test]
fn malformed_maps_are_rejected() {
    assert_eq!(RockSampleMap::parse(""), Err(MapError::Empty));
    assert_eq!(RockSampleMap::parse("S.\n..."), Err(MapError::RaggedRows));
    assert_eq!(RockSampleMap::parse("..\n.."), Err(MapError::MissingStart));
    assert_eq!(
        RockSampleMap::parse("S.1\n..."),
        Err(MapError::NonConsecutiveRocks { missing: 0 })
    );
    assert_eq!(
        RockSampleMap::parse("Sx."),
        Err(MapError::UnexpectedCharacter {
            found: 'x',
            row: 0,
            column: 1
        })
    );
}

#[test]
fn moving_east_off_the_grid_exits_with_the_terminal_reward() {
    let map = RockSampleMap::parse("S.0").expect("map should parse");
    let model = RockSampleModel::new(map);
    let mut rng = ChaCha8Rng::seed_from_u64(0);

    let mut state = RockSampleState {
        x: 2,
        y: 0,
        rocks: vec![false],
    };
    let step = model.generate_step(&state, &RockSampleAction::East, &mut rng);
    assert_eq!(step.reward, EXIT_REWARD);
    assert!(step.is_terminal);
    assert!(model.is_terminal(&step.next_state));

    // Walking into the north wall bounces with the illegal-move penalty.
    state.x = 0;
    let bounced = model.generate_step(&state, &RockSampleAction::North, &mut rng);
    assert_eq!(bounced.reward, -ILLEGAL_MOVE_PENALTY);
    assert!(!bounced.is_legal);
    assert_eq!(bounced.next_state, state);
}

#[test]
fn sampling_a_good_rock_collects_it_and_turns_it_bad() {
    let map = RockSampleMap {
        width: 3,
        height: 1,
        start: (0, 0),
        rocks: vec![(0, 0)],
    };
    let model = RockSampleModel::new(map);
    let mut rng = ChaCha8Rng::seed_from_u64(0);

    let good = RockSampleState {
        x: 0,
        y: 0,
        rocks: vec![true],
    };
    let collected = model.generate_step(&good, &RockSampleAction::Sample, &mut rng);
    assert_eq!(collected.reward, GOOD_ROCK_REWARD);
    assert_eq!(collected.next_state.rocks, vec![false]);

    let again = model.generate_step(&collected.next_state, &RockSampleAction::Sample, &mut rng);
    assert_eq!(again.reward, -BAD_ROCK_PENALTY);
}

#[test]
fn the_check_sensor_is_perfect_at_distance_zero() {
    let map = RockSampleMap {
        width: 3,
        height: 1,
        start: (0, 0),
        rocks: vec![(0, 0)],
    };
    let model = RockSampleModel::new(map);
    assert_eq!(model.sensor_accuracy(0, 0, 0), 1.0);

    let mut rng = ChaCha8Rng::seed_from_u64(0);
    let state = RockSampleState {
        x: 0,
        y: 0,
        rocks: vec![true],
    };
    for _ in 0..20 {
        let step = model.generate_step(&state, &RockSampleAction::Check(0), &mut rng);
        assert_eq!(step.observation, RockObservation::Good);
        assert_eq!(step.next_state, state);
    }
}

// Scenario: exiting beats a distant rock detour under a short horizon; after
// heavy search the recommendation at the start cell is EAST.
#[test]
fn exiting_east_is_recommended_from_the_start_column() {
    let map = RockSampleMap::parse("0..\n.S.\n1..\n").expect("map should parse");
    let model = RockSampleModel::new(map).with_half_efficiency_distance(1.0);
    let mut solver =
        Solver::new(model, options(50, 80, 4, 3)).expect("solver should build");

    solver
        .improve(SearchBudget::simulations(10_000))
        .expect("improve should succeed");
    solver.check_invariants().expect("invariants should hold");

    assert_eq!(solver.recommended_action(), Some(RockSampleAction::East));
}

// Scenario: SAMPLE over an empty cell is worth exactly the bad-rock penalty
// when nothing follows it.
#[test]
fn sampling_an_empty_cell_costs_the_penalty() {
    let map = RockSampleMap::parse("S.0").expect("map should parse");
    let model = RockSampleModel::new(map);
    let mut solver = Solver::new(model, options(50, 80, 1, 5)).expect("solver should build");

    solver
        .improve(SearchBudget::simulations(1000))
        .expect("improve should succeed");

    let root = solver.root().expect("root exists");
    let sample_q = root
        .mapping()
        .get_entry(&RockSampleAction::Sample)
        .expect("SAMPLE was tried")
        .stats()
        .mean_q();
    assert!(
        (sample_q + BAD_ROCK_PENALTY).abs() < 0.5,
        "SAMPLE mean q should sit at -10, got {sample_q}"
    );
}

// Scenario: a perfect CHECK pins the rock quality; after advancing on a
// `good` reading every particle agrees.
#[test]
fn a_perfect_check_concentrates_the_belief() {
    let map = RockSampleMap {
        width: 3,
        height: 1,
        start: (0, 0),
        rocks: vec![(0, 0)],
    };
    let model = RockSampleModel::new(map);
    let mut solver = Solver::new(model, options(60, 80, 5, 9)).expect("solver should build");

    solver
        .advance(&RockSampleAction::Check(0), &RockObservation::Good)
        .expect("advance should succeed");
    solver.check_invariants().expect("invariants should hold");

    let root = solver.root().expect("root exists");
    assert!(root.particle_count() >= 60);
    for particle in root.particles() {
        let entry = solver.history().entry(*particle).expect("particle resolves");
        let state = solver.pool().state(entry.state()).expect("state resolves");
        assert!(state.rocks[0], "a perfect good reading admits only good rocks");
    }
}

// Scenario: at the half-efficiency distance the sensor is 75% accurate, so a
// `good` reading leaves three quarters of the replenished belief good.
#[test]
fn a_half_efficiency_check_leaves_three_quarters_good() {
    let map = RockSampleMap {
        width: 5,
        height: 1,
        start: (0, 0),
        rocks: vec![(2, 0)],
    };
    let model = RockSampleModel::new(map).with_half_efficiency_distance(2.0);
    assert_eq!(model.sensor_accuracy(0, 0, 0), 0.75);

    let mut solver =
        Solver::new(model, options(1000, 1200, 5, 13)).expect("solver should build");
    solver
        .advance(&RockSampleAction::Check(0), &RockObservation::Good)
        .expect("advance should succeed");

    let root = solver.root().expect("root exists");
    let mut good = 0_usize;
    let mut total = 0_usize;
    for particle in root.particles() {
        let entry = solver.history().entry(*particle).expect("particle resolves");
        let state = solver.pool().state(entry.state()).expect("state resolves");
        total += 1;
        if state.rocks[0] {
            good += 1;
        }
    }
    let fraction = good as f64 / total as f64;
    assert!(
        (fraction - 0.75).abs() < 0.05,
        "good fraction should be near 0.75, got {fraction:.3}"
    );
}

#[test]
fn blocking_a_cell_replays_the_histories_that_walked_it() {
    let map = RockSampleMap::parse("0..\n.S.\n1..\n").expect("map should parse");
    let model = RockSampleModel::new(map);
    let mut solver = Solver::new(model, options(50, 80, 6, 17)).expect("solver should build");
    solver
        .improve(SearchBudget::simulations(500))
        .expect("improve should succeed");

    solver
        .apply_changes(&[RockSampleChange::BlockCell { x: 1, y: 0 }])
        .expect("apply_changes should succeed");
    solver.check_invariants().expect("invariants should hold");
    assert!(solver.model().is_blocked(1, 0));

    // The walled-off cell now bounces the rover.
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    let state = RockSampleState {
        x: 1,
        y: 1,
        rocks: vec![false, false],
    };
    let step = solver
        .model()
        .generate_step(&state, &RockSampleAction::North, &mut rng);
    assert_eq!(step.reward, -ILLEGAL_MOVE_PENALTY);
}

#[test]
fn snapshots_of_a_rocksample_solver_round_trip() {
    let map = RockSampleMap::parse("0..\n.S.\n1..\n").expect("map should parse");
    let model = RockSampleModel::new(map);
    let mut solver =
        Solver::new(model.clone(), options(50, 80, 6, 21)).expect("solver should build");
    solver
        .improve(SearchBudget::simulations(300))
        .expect("improve should succeed");

    let mut first = Vec::new();
    solver.save(&mut first).expect("save should succeed");
    let loaded = Solver::load(model, first.as_slice()).expect("load should succeed");
    loaded.check_invariants().expect("loaded tree is consistent");

    let mut second = Vec::new();
    loaded.save(&mut second).expect("save should succeed");
    assert_eq!(first, second);
}
