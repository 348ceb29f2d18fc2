use std::fmt::{Debug, Display};
use std::hash::Hash;

use rand_chacha::ChaCha8Rng;
use serde::{de::DeserializeOwned, Serialize};

use crate::solver::pool::Region;

/// Capability set for problem states: equality, hash, print, plus the numeric
/// variable vector the spatial index is keyed on.
pub trait PomdpState: Clone + Eq + Hash + Debug + Display + Serialize + DeserializeOwned {
    /// The state's numeric variable vector; its length must equal the model's
    /// `num_state_variables`.
    fn to_vector(&self) -> Vec<f64>;

    /// Euclidean distance in state-variable space.
    fn distance_to(&self, other: &Self) -> f64 {
        self.to_vector()
            .iter()
            .zip(other.to_vector())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>()
            .sqrt()
    }
}

/// Capability set for actions. The bin number is a stable integer used for
/// deterministic tie-breaking between equal-valued actions.
pub trait PomdpAction: Clone + Eq + Hash + Debug + Display + Serialize + DeserializeOwned {
    fn bin_number(&self) -> u64;
}

/// Capability set for observations. Equality doubles as the discrete
/// equivalence-class key of the default observation mapping.
pub trait PomdpObservation: Clone + Eq + Hash + Debug + Display + Serialize + DeserializeOwned {}

/// Represents the results of a complete step in the model, including the
/// next state, observation, and reward.
#[derive(Debug, Clone)]
pub struct StepResult<S, O> {
    pub next_state: S,
    pub observation: O,
    pub reward: f64,
    /// False when the action was illegal from the given state; the reward is
    /// then expected to already carry the penalty.
    pub is_legal: bool,
    pub is_terminal: bool,
}

/// Black-box generative model interface demanded of any problem.
///
/// The solver only ever samples, steps, and evaluates through this trait;
/// it never inspects states, actions, or observations beyond the capability
/// traits above.
pub trait PomdpModel {
    type State: PomdpState;
    type Action: PomdpAction;
    type Observation: PomdpObservation;
    /// Problem-specific description of a change to the world model.
    type Change;

    /// Samples an initial state from the initial belief.
    fn sample_an_init_state(&self, rng: &mut ChaCha8Rng) -> Self::State;

    /// Samples a state uniformly at random from all states.
    fn sample_state_uniform(&self, rng: &mut ChaCha8Rng) -> Self::State;

    fn is_terminal(&self, state: &Self::State) -> bool;

    /// Generates the next state, an observation, and the reward.
    fn generate_step(
        &self,
        state: &Self::State,
        action: &Self::Action,
        rng: &mut ChaCha8Rng,
    ) -> StepResult<Self::State, Self::Observation>;

    /// The enumerated (or discretized) action space; every belief's action
    /// mapping seeds its untried set from this.
    fn action_space(&self) -> Vec<Self::Action>;

    /// Bootstrap value used at the leaf of a simulation in place of
    /// continuing the rollout.
    fn heuristic_value(&self, state: &Self::State) -> f64;

    /// Problem-informed rollout action; `None` makes rollouts fall back to a
    /// uniform draw from the action space.
    fn rollout_action(&self, _state: &Self::State, _rng: &mut ChaCha8Rng) -> Option<Self::Action> {
        None
    }

    /// Likelihood of receiving `observation` after taking `action` from
    /// `state`. Only consulted by weighted resampling; the default of 0
    /// forces rejection sampling instead.
    fn observation_likelihood(
        &self,
        _state: &Self::State,
        _action: &Self::Action,
        _observation: &Self::Observation,
    ) -> f64 {
        0.0
    }

    fn num_state_variables(&self) -> usize;
    fn discount_factor(&self) -> f64;
    /// Lower bound on any leaf value the heuristic may produce.
    fn min_value(&self) -> f64;
    /// Upper bound on any leaf value the heuristic may produce.
    fn max_value(&self) -> f64;

    /// Apply a world change to the model itself.
    fn apply_change(&mut self, _change: &Self::Change) {}

    /// Bounding region of state-variable space affected by a change; the
    /// solver re-simulates history entries whose states fall inside it.
    fn affected_region(&self, _change: &Self::Change) -> Region {
        Region::everything(self.num_state_variables())
    }
}
