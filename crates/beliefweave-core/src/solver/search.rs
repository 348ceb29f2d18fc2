use rand_chacha::ChaCha8Rng;

use crate::solver::belief::BeliefTree;
use crate::solver::error::SolverError;
use crate::solver::history::{HistoryEntry, HistoryStore};
use crate::solver::ids::{BeliefId, SequenceId};
use crate::solver::model::PomdpModel;
use crate::solver::pool::StatePool;
use crate::solver::stepper::{StepChoice, StepContext, StepGenerator};

/// Drives single simulations under a pluggable step generator.
pub struct BasicSearchStrategy<M: PomdpModel> {
    pub(crate) stepper: Box<dyn StepGenerator<M>>,
}

impl<M: PomdpModel> BasicSearchStrategy<M> {
    pub fn new(stepper: Box<dyn StepGenerator<M>>) -> Self {
        BasicSearchStrategy { stepper }
    }
}

/// Run one simulation from `start_belief`, producing a new history sequence:
/// stepper-driven descent through the tree, particle registration at each
/// belief reached, then discounted backpropagation from the leaf value.
pub(crate) fn extend_episode<M: PomdpModel>(
    model: &M,
    stepper: &dyn StepGenerator<M>,
    tree: &mut BeliefTree<M::Action, M::Observation>,
    pool: &mut StatePool<M::State>,
    history: &mut HistoryStore<M::Action, M::Observation>,
    action_space: &[M::Action],
    start_belief: BeliefId,
    start_state: M::State,
    rng: &mut ChaCha8Rng,
) -> Result<SequenceId, SolverError> {
    let discount = model.discount_factor();
    let sequence = history.create_sequence();

    let mut current_state = start_state;
    let mut belief = start_belief;
    let mut accumulated_discount = 1.0;

    let state_id = pool.get_or_canonicalize(current_state.clone());
    let mut entry = HistoryEntry::new(state_id, accumulated_discount);
    entry.belief = Some(belief);
    let mut last_ref = history
        .append(sequence, entry)
        .ok_or_else(|| SolverError::invariant("append to a missing sequence"))?;
    tree.register_particle(belief, last_ref)?;

    let mut at_new_belief = false;
    let leaf_value = loop {
        let choice = {
            let node = tree.node(belief)?;
            let ctx = StepContext {
                model,
                mapping: node.mapping(),
                state: &current_state,
                action_space,
                depth: node.depth(),
                at_new_belief,
            };
            stepper.choose(&ctx, rng)
        };

        match choice {
            StepChoice::Terminate { value } => break value,
            StepChoice::Act { action, .. } => {
                let step = model.generate_step(&current_state, &action, rng);
                if !step.reward.is_finite() {
                    return Err(SolverError::model_contract(
                        "generate_step returned a non-finite reward",
                    ));
                }

                {
                    let last = history
                        .entry_mut(last_ref)
                        .ok_or_else(|| SolverError::invariant("dangling entry ref"))?;
                    last.action = Some(action.clone());
                    last.observation = Some(step.observation.clone());
                    last.reward = step.reward;
                }

                let (child, created) =
                    tree.create_or_get_child(belief, &action, &step.observation, action_space)?;
                at_new_belief = created;

                accumulated_discount *= discount;
                let next_id = pool.get_or_canonicalize(step.next_state.clone());
                let mut next_entry = HistoryEntry::new(next_id, accumulated_discount);
                next_entry.belief = Some(child);
                last_ref = history
                    .append(sequence, next_entry)
                    .ok_or_else(|| SolverError::invariant("append to a missing sequence"))?;
                tree.register_particle(child, last_ref)?;

                current_state = step.next_state;
                belief = child;

                if step.is_terminal {
                    break 0.0;
                }
            }
        }
    };

    if let Some(owner) = history.sequence_mut(sequence) {
        owner.terminal_value = leaf_value;
    }
    backpropagate::<M>(tree, history, sequence, discount, 1)?;
    Ok(sequence)
}

/// Walk a sequence in reverse, folding rewards into discounted returns and
/// committing them to the action and observation statistics along the path.
/// `sign` of +1 applies the sequence; -1 undoes a previous application, used
/// when change propagation must replay a suffix.
pub(crate) fn backpropagate<M: PomdpModel>(
    tree: &mut BeliefTree<M::Action, M::Observation>,
    history: &HistoryStore<M::Action, M::Observation>,
    sequence: SequenceId,
    discount: f64,
    sign: i64,
) -> Result<(), SolverError> {
    let owner = history
        .sequence(sequence)
        .ok_or_else(|| SolverError::invariant("backpropagation over a missing sequence"))?;

    let mut steps = Vec::with_capacity(owner.entries.len());
    for entry in owner.entries.iter() {
        if let (Some(action), Some(observation)) = (&entry.action, &entry.observation) {
            steps.push((entry.belief, action.clone(), observation.clone(), entry.reward));
        }
    }

    let mut value = owner.terminal_value;
    for (belief, action, observation, reward) in steps.into_iter().rev() {
        value = reward + discount * value;
        // Prefix entries detached by an earlier re-rooting carry no belief;
        // their statistics left the tree with the pruned nodes.
        let Some(belief) = belief else {
            continue;
        };
        let node = tree.node_mut(belief)?;
        node.mapping_mut()
            .update_entry(&action, sign as f64 * value, sign);
        let entry = node
            .mapping_mut()
            .get_entry_mut(&action)
            .ok_or_else(|| SolverError::invariant("updated action entry vanished"))?;
        let child = entry
            .child_mut()
            .ok_or_else(|| SolverError::invariant("tried action without a child node"))?;
        child
            .mapping_mut()
            .update_visits(&observation, sign)
            .ok_or_else(|| {
                SolverError::invariant("observation entry missing during backpropagation")
            })?;
        node.mark_estimate_dirty();
    }
    Ok(())
}
