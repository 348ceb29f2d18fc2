use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::solver::actions::ActionMapping;
use crate::solver::model::PomdpModel;
use crate::solver::options::HeuristicType;

/// One decision of a step generator while driving a simulation.
#[derive(Debug, Clone)]
pub enum StepChoice<A> {
    /// Simulate `action` next; `expansion` is true when it was untried.
    Act { action: A, expansion: bool },
    /// Stop the simulation and seed backpropagation with `value`.
    Terminate { value: f64 },
}

/// Everything a step generator may consult when choosing.
pub struct StepContext<'a, M: PomdpModel> {
    pub model: &'a M,
    pub mapping: &'a ActionMapping<M::Action, M::Observation>,
    pub state: &'a M::State,
    pub action_space: &'a [M::Action],
    /// Absolute depth of the current belief below the root.
    pub depth: u64,
    /// True when the previous step created a fresh belief (the expansion
    /// boundary of this simulation).
    pub at_new_belief: bool,
}

/// Chooses actions during selection and decides when a simulation ends.
/// A genuine plug-in point; UCB1 below is the default.
pub trait StepGenerator<M: PomdpModel> {
    fn choose(&self, ctx: &StepContext<'_, M>, rng: &mut ChaCha8Rng) -> StepChoice<M::Action>;
}

/// UCB1 step generation: expand an untried action when one exists, otherwise
/// follow the upper-confidence argmax; terminate at terminal states, at the
/// expansion boundary, and at the depth horizon, seeding backprop with the
/// configured heuristic.
#[derive(Debug, Clone)]
pub struct UcbStepGenerator {
    pub exploration_coefficient: f64,
    pub horizon: u64,
    pub heuristic: HeuristicType,
}

impl UcbStepGenerator {
    pub fn new(exploration_coefficient: f64, horizon: u64, heuristic: HeuristicType) -> Self {
        UcbStepGenerator {
            exploration_coefficient,
            horizon,
            heuristic,
        }
    }

    fn leaf_value<M: PomdpModel>(&self, ctx: &StepContext<'_, M>, rng: &mut ChaCha8Rng) -> f64 {
        let raw = match self.heuristic {
            HeuristicType::Zero => return 0.0,
            HeuristicType::Model => ctx.model.heuristic_value(ctx.state),
            HeuristicType::Rollout => rollout_value(
                ctx.model,
                ctx.action_space,
                ctx.state.clone(),
                self.horizon.saturating_sub(ctx.depth),
                rng,
            ),
        };
        raw.clamp(ctx.model.min_value(), ctx.model.max_value())
    }
}

impl<M: PomdpModel> StepGenerator<M> for UcbStepGenerator {
    fn choose(&self, ctx: &StepContext<'_, M>, rng: &mut ChaCha8Rng) -> StepChoice<M::Action> {
        if ctx.model.is_terminal(ctx.state) {
            return StepChoice::Terminate { value: 0.0 };
        }
        if ctx.at_new_belief || ctx.depth >= self.horizon {
            return StepChoice::Terminate {
                value: self.leaf_value(ctx, rng),
            };
        }
        if let Some(action) = ctx.mapping.next_untried_action(rng) {
            return StepChoice::Act {
                action,
                expansion: true,
            };
        }
        match ctx.mapping.ucb_action(self.exploration_coefficient) {
            Some(action) => StepChoice::Act {
                action: action.clone(),
                expansion: false,
            },
            // Nothing tried and nothing untried: the action space is empty.
            None => StepChoice::Terminate {
                value: self.leaf_value(ctx, rng),
            },
        }
    }
}

/// Discounted rollout from `state` using the model's rollout action when it
/// offers one, else a uniform draw from the action space.
fn rollout_value<M: PomdpModel>(
    model: &M,
    action_space: &[M::Action],
    mut state: M::State,
    remaining: u64,
    rng: &mut ChaCha8Rng,
) -> f64 {
    if action_space.is_empty() {
        return 0.0;
    }
    let discount = model.discount_factor();
    let mut total = 0.0;
    let mut scale = 1.0;
    for _ in 0..remaining {
        if model.is_terminal(&state) {
            break;
        }
        let action = match model.rollout_action(&state, rng) {
            Some(action) => action,
            None => action_space[rng.gen_range(0..action_space.len())].clone(),
        };
        let step = model.generate_step(&state, &action, rng);
        total += scale * step.reward;
        scale *= discount;
        state = step.next_state;
        if step.is_terminal {
            break;
        }
    }
    total
}
