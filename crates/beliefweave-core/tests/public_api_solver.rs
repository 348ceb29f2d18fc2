use std::fmt;

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use beliefweave_core::{
    HeuristicType, PomdpAction, PomdpModel, PomdpObservation, PomdpState, SearchBudget, Solver,
    SolverOptions, StepResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
enum TigerState {
    TigerLeft,
    TigerRight,
    Done,
}

impl fmt::Display for TigerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TigerState::TigerLeft => write!(f, "tiger-left"),
            TigerState::TigerRight => write!(f, "tiger-right"),
            TigerState::Done => write!(f, "done"),
        }
    }
}

impl PomdpState for TigerState {
    fn to_vector(&self) -> Vec<f64> {
        match self {
            TigerState::TigerLeft => vec![0.0],
            TigerState::TigerRight => vec![1.0],
            TigerState::Done => vec![2.0],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
enum TigerAction {
    Listen,
    OpenLeft,
    OpenRight,
}

impl fmt::Display for TigerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TigerAction::Listen => write!(f, "LISTEN"),
            TigerAction::OpenLeft => write!(f, "OPEN-LEFT"),
            TigerAction::OpenRight => write!(f, "OPEN-RIGHT"),
        }
    }
}

impl PomdpAction for TigerAction {
    fn bin_number(&self) -> u64 {
        match self {
            TigerAction::Listen => 0,
            TigerAction::OpenLeft => 1,
            TigerAction::OpenRight => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
enum TigerObservation {
    HearLeft,
    HearRight,
    Silence,
}

impl fmt::Display for TigerObservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TigerObservation::HearLeft => write!(f, "hear-left"),
            TigerObservation::HearRight => write!(f, "hear-right"),
            TigerObservation::Silence => write!(f, "silence"),
        }
    }
}

impl PomdpObservation for TigerObservation {}

/// The classic tiger problem: listening is cheap and noisy, opening the
/// wrong door is catastrophic.
#[derive(Debug, Clone, Default)]
struct TigerModel;

const HEAR_CORRECTLY: f64 = 0.85;

impl PomdpModel for TigerModel {
    type State = TigerState;
    type Action = TigerAction;
    type Observation = TigerObservation;
    type Change = ();

    fn sample_an_init_state(&self, rng: &mut ChaCha8Rng) -> TigerState {
        if rng.gen::<bool>() {
            TigerState::TigerLeft
        } else {
            TigerState::TigerRight
        }
    }

    fn sample_state_uniform(&self, rng: &mut ChaCha8Rng) -> TigerState {
        self.sample_an_init_state(rng)
    }

    fn is_terminal(&self, state: &TigerState) -> bool {
        *state == TigerState::Done
    }

    fn generate_step(
        &self,
        state: &TigerState,
        action: &TigerAction,
        rng: &mut ChaCha8Rng,
    ) -> StepResult<TigerState, TigerObservation> {
        match action {
            TigerAction::Listen => {
                let truthful = rng.gen::<f64>() < HEAR_CORRECTLY;
                let observation = match (state, truthful) {
                    (TigerState::TigerLeft, true) | (TigerState::TigerRight, false) => {
                        TigerObservation::HearLeft
                    }
                    _ => TigerObservation::HearRight,
                };
                StepResult {
                    next_state: *state,
                    observation,
                    reward: -1.0,
                    is_legal: true,
                    is_terminal: false,
                }
            }
            TigerAction::OpenLeft | TigerAction::OpenRight => {
                let opened_tiger = matches!(
                    (state, action),
                    (TigerState::TigerLeft, TigerAction::OpenLeft)
                        | (TigerState::TigerRight, TigerAction::OpenRight)
                );
                StepResult {
                    next_state: TigerState::Done,
                    observation: TigerObservation::Silence,
                    reward: if opened_tiger { -100.0 } else { 10.0 },
                    is_legal: true,
                    is_terminal: true,
                }
            }
        }
    }

    fn action_space(&self) -> Vec<TigerAction> {
        vec![
            TigerAction::Listen,
            TigerAction::OpenLeft,
            TigerAction::OpenRight,
        ]
    }

    fn heuristic_value(&self, _state: &TigerState) -> f64 {
        0.0
    }

    fn observation_likelihood(
        &self,
        state: &TigerState,
        action: &TigerAction,
        observation: &TigerObservation,
    ) -> f64 {
        match action {
            TigerAction::Listen => match (state, observation) {
                (TigerState::TigerLeft, TigerObservation::HearLeft)
                | (TigerState::TigerRight, TigerObservation::HearRight) => HEAR_CORRECTLY,
                (TigerState::TigerLeft, TigerObservation::HearRight)
                | (TigerState::TigerRight, TigerObservation::HearLeft) => 1.0 - HEAR_CORRECTLY,
                _ => 0.0,
            },
            _ => {
                if *observation == TigerObservation::Silence {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    fn num_state_variables(&self) -> usize {
        1
    }

    fn discount_factor(&self) -> f64 {
        0.95
    }

    fn min_value(&self) -> f64 {
        -100.0
    }

    fn max_value(&self) -> f64 {
        10.0
    }
}

fn tiger_options() -> SolverOptions {
    SolverOptions {
        discount_factor: 0.95,
        min_particle_count: 100,
        max_particle_count: 150,
        horizon: 8,
        exploration_coefficient: 5.0,
        heuristic_type: HeuristicType::Zero,
        search_budget_ms: 0,
        search_budget_iterations: 0,
        rng_seed: 11,
        serializer_path: None,
        max_replenish_attempts: 2000,
    }
}

#[test]
fn listening_beats_guessing_at_the_initial_belief() {
    let mut solver = Solver::new(TigerModel, tiger_options()).expect("solver should build");
    solver
        .improve(SearchBudget::simulations(3000))
        .expect("improve should succeed");
    solver.check_invariants().expect("invariants should hold");

    assert_eq!(solver.recommended_action(), Some(TigerAction::Listen));

    let root = solver.root().expect("root exists");
    let listen_q = root
        .mapping()
        .get_entry(&TigerAction::Listen)
        .expect("listen was tried")
        .stats()
        .mean_q();
    let open_left_q = root
        .mapping()
        .get_entry(&TigerAction::OpenLeft)
        .expect("open-left was tried")
        .stats()
        .mean_q();
    assert!(listen_q > open_left_q);
}

#[test]
fn advancing_on_a_heard_roar_concentrates_the_belief() {
    let mut solver = Solver::new(TigerModel, tiger_options()).expect("solver should build");
    solver
        .improve(SearchBudget::simulations(2000))
        .expect("improve should succeed");

    solver
        .advance(&TigerAction::Listen, &TigerObservation::HearLeft)
        .expect("advance should succeed");
    solver.check_invariants().expect("invariants should hold");

    let root = solver.root().expect("root exists");
    let mut left = 0_usize;
    let mut total = 0_usize;
    for particle in root.particles() {
        let entry = solver.history().entry(*particle).expect("particle resolves");
        let state = solver.pool().state(entry.state()).expect("state resolves");
        total += 1;
        if *state == TigerState::TigerLeft {
            left += 1;
        }
    }
    assert!(total >= solver.options().min_particle_count as usize);
    let fraction = left as f64 / total as f64;
    assert!(
        fraction > 0.6,
        "hearing the tiger left should concentrate the belief, got {fraction:.3}"
    );
}

#[test]
fn a_zero_budget_is_a_no_op() {
    let mut solver = Solver::new(TigerModel, tiger_options()).expect("solver should build");
    let ran = solver
        .improve(SearchBudget::none())
        .expect("improve should succeed");
    assert_eq!(ran, 0);
    assert_eq!(solver.tree().node_count(), 1);
}

#[test]
fn snapshots_round_trip_through_the_public_api() {
    let mut solver = Solver::new(TigerModel, tiger_options()).expect("solver should build");
    solver
        .improve(SearchBudget::simulations(500))
        .expect("improve should succeed");

    let mut first = Vec::new();
    solver.save(&mut first).expect("save should succeed");
    let loaded = Solver::load(TigerModel, first.as_slice()).expect("load should succeed");
    let mut second = Vec::new();
    loaded.save(&mut second).expect("save should succeed");
    assert_eq!(first, second);
}
