use std::fmt;

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::solver::model::{PomdpAction, PomdpModel, PomdpObservation, PomdpState, StepResult};
use crate::solver::options::{HeuristicType, SolverOptions};

pub const CHAIN_END: u8 = 3;

/// Position on a four-cell chain; cell 3 is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainState(pub u8);

impl fmt::Display for ChainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pos{}", self.0)
    }
}

impl PomdpState for ChainState {
    fn to_vector(&self) -> Vec<f64> {
        vec![self.0 as f64]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChainAction {
    Left,
    Right,
}

impl fmt::Display for ChainAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainAction::Left => write!(f, "LEFT"),
            ChainAction::Right => write!(f, "RIGHT"),
        }
    }
}

impl PomdpAction for ChainAction {
    fn bin_number(&self) -> u64 {
        match self {
            ChainAction::Left => 0,
            ChainAction::Right => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainObservation(pub u8);

impl fmt::Display for ChainObservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "saw{}", self.0)
    }
}

impl PomdpObservation for ChainObservation {}

/// Deterministic chain world: RIGHT walks toward the exit at cell 3 for a
/// small step reward (10 on arrival), LEFT walks back for -1 and is illegal
/// at cell 0. Observations reveal the next position exactly.
#[derive(Debug, Clone)]
pub struct ChainModel {
    pub right_reward: f64,
}

impl Default for ChainModel {
    fn default() -> Self {
        ChainModel { right_reward: 1.0 }
    }
}

impl ChainModel {
    fn next_position(&self, state: ChainState, action: ChainAction) -> u8 {
        match action {
            ChainAction::Right => (state.0 + 1).min(CHAIN_END),
            ChainAction::Left => state.0.saturating_sub(1),
        }
    }
}

impl PomdpModel for ChainModel {
    type State = ChainState;
    type Action = ChainAction;
    type Observation = ChainObservation;
    /// A change rewrites the per-step reward of RIGHT moves.
    type Change = f64;

    fn sample_an_init_state(&self, _rng: &mut ChaCha8Rng) -> ChainState {
        ChainState(0)
    }

    fn sample_state_uniform(&self, rng: &mut ChaCha8Rng) -> ChainState {
        ChainState(rng.gen_range(0..CHAIN_END))
    }

    fn is_terminal(&self, state: &ChainState) -> bool {
        state.0 >= CHAIN_END
    }

    fn generate_step(
        &self,
        state: &ChainState,
        action: &ChainAction,
        _rng: &mut ChaCha8Rng,
    ) -> StepResult<ChainState, ChainObservation> {
        let illegal = *action == ChainAction::Left && state.0 == 0;
        let next = ChainState(self.next_position(*state, *action));
        let reward = if illegal {
            -10.0
        } else {
            match action {
                ChainAction::Right if next.0 == CHAIN_END => 10.0,
                ChainAction::Right => self.right_reward,
                ChainAction::Left => -1.0,
            }
        };
        StepResult {
            observation: ChainObservation(next.0),
            reward,
            is_legal: !illegal,
            is_terminal: next.0 == CHAIN_END,
            next_state: next,
        }
    }

    fn action_space(&self) -> Vec<ChainAction> {
        vec![ChainAction::Left, ChainAction::Right]
    }

    fn heuristic_value(&self, state: &ChainState) -> f64 {
        (CHAIN_END - state.0.min(CHAIN_END)) as f64
    }

    fn observation_likelihood(
        &self,
        state: &ChainState,
        action: &ChainAction,
        observation: &ChainObservation,
    ) -> f64 {
        if self.next_position(*state, *action) == observation.0 {
            1.0
        } else {
            0.0
        }
    }

    fn num_state_variables(&self) -> usize {
        1
    }

    fn discount_factor(&self) -> f64 {
        0.95
    }

    fn min_value(&self) -> f64 {
        -20.0
    }

    fn max_value(&self) -> f64 {
        20.0
    }

    fn apply_change(&mut self, change: &f64) {
        self.right_reward = *change;
    }
}

pub fn chain_options() -> SolverOptions {
    SolverOptions {
        discount_factor: 0.95,
        min_particle_count: 5,
        max_particle_count: 8,
        horizon: 10,
        exploration_coefficient: 1.0,
        heuristic_type: HeuristicType::Model,
        search_budget_ms: 0,
        search_budget_iterations: 0,
        rng_seed: 7,
        serializer_path: None,
        max_replenish_attempts: 1000,
    }
}
