use std::collections::HashSet;
use std::fmt;

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use beliefweave_core::{
    PomdpAction, PomdpModel, PomdpObservation, PomdpState, Region, StepResult,
};

use crate::map::RockSampleMap;

pub const EXIT_REWARD: f64 = 10.0;
pub const GOOD_ROCK_REWARD: f64 = 10.0;
pub const BAD_ROCK_PENALTY: f64 = 10.0;
pub const ILLEGAL_MOVE_PENALTY: f64 = 10.0;

/// Rover position plus the hidden quality bit of every rock. The rover has
/// exited (terminal) once `x` equals the map width.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RockSampleState {
    pub x: u8,
    pub y: u8,
    pub rocks: Vec<bool>,
}

impl fmt::Display for RockSampleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})[", self.x, self.y)?;
        for good in &self.rocks {
            write!(f, "{}", if *good { '+' } else { '-' })?;
        }
        write!(f, "]")
    }
}

impl PomdpState for RockSampleState {
    fn to_vector(&self) -> Vec<f64> {
        let mut vector = Vec::with_capacity(2 + self.rocks.len());
        vector.push(self.x as f64);
        vector.push(self.y as f64);
        vector.extend(self.rocks.iter().map(|good| if *good { 1.0 } else { 0.0 }));
        vector
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RockSampleAction {
    North,
    East,
    South,
    West,
    Sample,
    Check(u8),
}

impl fmt::Display for RockSampleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RockSampleAction::North => write!(f, "NORTH"),
            RockSampleAction::East => write!(f, "EAST"),
            RockSampleAction::South => write!(f, "SOUTH"),
            RockSampleAction::West => write!(f, "WEST"),
            RockSampleAction::Sample => write!(f, "SAMPLE"),
            RockSampleAction::Check(rock) => write!(f, "CHECK-{rock}"),
        }
    }
}

impl PomdpAction for RockSampleAction {
    fn bin_number(&self) -> u64 {
        match self {
            RockSampleAction::North => 0,
            RockSampleAction::East => 1,
            RockSampleAction::South => 2,
            RockSampleAction::West => 3,
            RockSampleAction::Sample => 4,
            RockSampleAction::Check(rock) => 5 + *rock as u64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RockObservation {
    /// Movement and sampling carry no sensor reading.
    None,
    Good,
    Bad,
}

impl fmt::Display for RockObservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RockObservation::None => write!(f, "none"),
            RockObservation::Good => write!(f, "good"),
            RockObservation::Bad => write!(f, "bad"),
        }
    }
}

impl PomdpObservation for RockObservation {}

/// World changes the solver propagates into its search tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RockSampleChange {
    /// A cell becomes impassable; moves into it bounce with the
    /// illegal-move penalty.
    BlockCell { x: u8, y: u8 },
    /// A previously blocked cell opens up again.
    UnblockCell { x: u8, y: u8 },
}

/// The RockSample generative model: a rover on a grid, k rocks of hidden
/// quality, a distance-degraded CHECK sensor, and an exit at the east edge.
#[derive(Debug, Clone)]
pub struct RockSampleModel {
    map: RockSampleMap,
    blocked: HashSet<(u8, u8)>,
    half_efficiency_distance: f64,
    discount: f64,
}

impl RockSampleModel {
    pub fn new(map: RockSampleMap) -> Self {
        RockSampleModel {
            map,
            blocked: HashSet::new(),
            half_efficiency_distance: 20.0,
            discount: 0.95,
        }
    }

    /// Distance at which the CHECK sensor degrades to 75% accuracy.
    pub fn with_half_efficiency_distance(mut self, distance: f64) -> Self {
        self.half_efficiency_distance = distance;
        self
    }

    pub fn with_discount(mut self, discount: f64) -> Self {
        self.discount = discount;
        self
    }

    pub fn map(&self) -> &RockSampleMap {
        &self.map
    }

    pub fn is_blocked(&self, x: u8, y: u8) -> bool {
        self.blocked.contains(&(x, y))
    }

    /// Probability the CHECK sensor reads the rock's true quality from the
    /// given rover position: (1 + 2^(-d / d0)) / 2.
    pub fn sensor_accuracy(&self, x: u8, y: u8, rock: usize) -> f64 {
        let (rock_x, rock_y) = self.map.rocks[rock];
        let dx = x as f64 - rock_x as f64;
        let dy = y as f64 - rock_y as f64;
        let distance = (dx * dx + dy * dy).sqrt();
        let efficiency = (-distance / self.half_efficiency_distance).exp2();
        (1.0 + efficiency) / 2.0
    }

    fn move_target(&self, state: &RockSampleState, action: RockSampleAction) -> Option<(u8, u8)> {
        let (x, y) = (state.x, state.y);
        match action {
            RockSampleAction::North => (y > 0).then(|| (x, y - 1)),
            RockSampleAction::South => (y + 1 < self.map.height).then(|| (x, y + 1)),
            RockSampleAction::West => (x > 0).then(|| (x - 1, y)),
            // East may leave the grid; the caller treats that as the exit.
            RockSampleAction::East => Some((x + 1, y)),
            _ => None,
        }
    }
}

impl PomdpModel for RockSampleModel {
    type State = RockSampleState;
    type Action = RockSampleAction;
    type Observation = RockObservation;
    type Change = RockSampleChange;

    fn sample_an_init_state(&self, rng: &mut ChaCha8Rng) -> RockSampleState {
        let rocks = (0..self.map.rock_count()).map(|_| rng.gen::<bool>()).collect();
        RockSampleState {
            x: self.map.start.0,
            y: self.map.start.1,
            rocks,
        }
    }

    fn sample_state_uniform(&self, rng: &mut ChaCha8Rng) -> RockSampleState {
        let rocks = (0..self.map.rock_count()).map(|_| rng.gen::<bool>()).collect();
        RockSampleState {
            x: rng.gen_range(0..self.map.width),
            y: rng.gen_range(0..self.map.height),
            rocks,
        }
    }

    fn is_terminal(&self, state: &RockSampleState) -> bool {
        state.x >= self.map.width
    }

    fn generate_step(
        &self,
        state: &RockSampleState,
        action: &RockSampleAction,
        rng: &mut ChaCha8Rng,
    ) -> StepResult<RockSampleState, RockObservation> {
        match *action {
            RockSampleAction::North
            | RockSampleAction::South
            | RockSampleAction::West
            | RockSampleAction::East => {
                let target = self.move_target(state, *action);
                match target {
                    Some((x, _)) if x >= self.map.width => {
                        // Off the east edge: the rover exits.
                        let mut next = state.clone();
                        next.x = self.map.width;
                        StepResult {
                            next_state: next,
                            observation: RockObservation::None,
                            reward: EXIT_REWARD,
                            is_legal: true,
                            is_terminal: true,
                        }
                    }
                    Some((x, y)) if !self.is_blocked(x, y) => {
                        let mut next = state.clone();
                        next.x = x;
                        next.y = y;
                        StepResult {
                            next_state: next,
                            observation: RockObservation::None,
                            reward: 0.0,
                            is_legal: true,
                            is_terminal: false,
                        }
                    }
                    _ => StepResult {
                        next_state: state.clone(),
                        observation: RockObservation::None,
                        reward: -ILLEGAL_MOVE_PENALTY,
                        is_legal: false,
                        is_terminal: false,
                    },
                }
            }
            RockSampleAction::Sample => match self.map.rock_at(state.x, state.y) {
                Some(rock) if state.rocks[rock] => {
                    let mut next = state.clone();
                    next.rocks[rock] = false;
                    StepResult {
                        next_state: next,
                        observation: RockObservation::None,
                        reward: GOOD_ROCK_REWARD,
                        is_legal: true,
                        is_terminal: false,
                    }
                }
                Some(_) => StepResult {
                    next_state: state.clone(),
                    observation: RockObservation::None,
                    reward: -BAD_ROCK_PENALTY,
                    is_legal: true,
                    is_terminal: false,
                },
                None => StepResult {
                    next_state: state.clone(),
                    observation: RockObservation::None,
                    reward: -BAD_ROCK_PENALTY,
                    is_legal: false,
                    is_terminal: false,
                },
            },
            RockSampleAction::Check(rock) => {
                let rock = rock as usize;
                let accuracy = self.sensor_accuracy(state.x, state.y, rock);
                let truthful = rng.gen::<f64>() < accuracy;
                let observation = match (state.rocks[rock], truthful) {
                    (true, true) | (false, false) => RockObservation::Good,
                    _ => RockObservation::Bad,
                };
                StepResult {
                    next_state: state.clone(),
                    observation,
                    reward: 0.0,
                    is_legal: true,
                    is_terminal: false,
                }
            }
        }
    }

    fn action_space(&self) -> Vec<RockSampleAction> {
        let mut actions = vec![
            RockSampleAction::North,
            RockSampleAction::East,
            RockSampleAction::South,
            RockSampleAction::West,
            RockSampleAction::Sample,
        ];
        actions.extend((0..self.map.rock_count()).map(|rock| RockSampleAction::Check(rock as u8)));
        actions
    }

    /// Optimistic potential: every still-good rock discounted by its
    /// straight-line distance, plus the discounted exit reward.
    fn heuristic_value(&self, state: &RockSampleState) -> f64 {
        if self.is_terminal(state) {
            return 0.0;
        }
        let mut value = 0.0;
        for (rock, good) in state.rocks.iter().enumerate() {
            if !good {
                continue;
            }
            let (rock_x, rock_y) = self.map.rocks[rock];
            let steps = (state.x as f64 - rock_x as f64).abs()
                + (state.y as f64 - rock_y as f64).abs()
                + 1.0;
            value += GOOD_ROCK_REWARD * self.discount.powf(steps);
        }
        let exit_steps = (self.map.width - state.x) as f64;
        value + EXIT_REWARD * self.discount.powf(exit_steps)
    }

    fn rollout_action(
        &self,
        state: &RockSampleState,
        _rng: &mut ChaCha8Rng,
    ) -> Option<RockSampleAction> {
        // Walk out east, pausing to collect a known-good rock underfoot.
        match self.map.rock_at(state.x, state.y) {
            Some(rock) if state.rocks[rock] => Some(RockSampleAction::Sample),
            _ => Some(RockSampleAction::East),
        }
    }

    fn observation_likelihood(
        &self,
        state: &RockSampleState,
        action: &RockSampleAction,
        observation: &RockObservation,
    ) -> f64 {
        match *action {
            RockSampleAction::Check(rock) => {
                let rock = rock as usize;
                let accuracy = self.sensor_accuracy(state.x, state.y, rock);
                let good_probability = if state.rocks[rock] {
                    accuracy
                } else {
                    1.0 - accuracy
                };
                match observation {
                    RockObservation::Good => good_probability,
                    RockObservation::Bad => 1.0 - good_probability,
                    RockObservation::None => 0.0,
                }
            }
            _ => {
                if *observation == RockObservation::None {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    fn num_state_variables(&self) -> usize {
        2 + self.map.rock_count()
    }

    fn discount_factor(&self) -> f64 {
        self.discount
    }

    fn min_value(&self) -> f64 {
        -(BAD_ROCK_PENALTY + ILLEGAL_MOVE_PENALTY)
    }

    fn max_value(&self) -> f64 {
        EXIT_REWARD + GOOD_ROCK_REWARD * self.map.rock_count() as f64
    }

    fn apply_change(&mut self, change: &RockSampleChange) {
        match *change {
            RockSampleChange::BlockCell { x, y } => {
                self.blocked.insert((x, y));
            }
            RockSampleChange::UnblockCell { x, y } => {
                self.blocked.remove(&(x, y));
            }
        }
    }

    /// Only steps taken next to the toggled cell can change outcome, so the
    /// affected region is the cell's immediate neighbourhood (any rocks).
    fn affected_region(&self, change: &RockSampleChange) -> Region {
        let (x, y) = match *change {
            RockSampleChange::BlockCell { x, y } => (x, y),
            RockSampleChange::UnblockCell { x, y } => (x, y),
        };
        let mut lows = vec![x as f64 - 1.0, y as f64 - 1.0];
        let mut highs = vec![x as f64 + 1.0, y as f64 + 1.0];
        lows.extend(std::iter::repeat(0.0).take(self.map.rock_count()));
        highs.extend(std::iter::repeat(1.0).take(self.map.rock_count()));
        Region::new(lows, highs)
    }
}
