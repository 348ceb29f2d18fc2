use rand_chacha::ChaCha8Rng;

use crate::solver::belief::BeliefTree;
use crate::solver::error::SolverError;
use crate::solver::history::HistoryStore;
use crate::solver::ids::{EntryRef, SequenceId};
use crate::solver::model::PomdpModel;
use crate::solver::pool::StatePool;
use crate::solver::search::backpropagate;

/// Replays the affected suffixes of flagged history sequences after a model
/// change: undo the sequence's backpropagation, re-simulate each affected
/// step, re-register particles along the (possibly different) belief path,
/// truncate at newly terminal steps, then backpropagate again.
pub trait HistoryCorrector<M: PomdpModel> {
    #[allow(clippy::too_many_arguments)]
    fn correct(
        &self,
        model: &M,
        tree: &mut BeliefTree<M::Action, M::Observation>,
        pool: &mut StatePool<M::State>,
        history: &mut HistoryStore<M::Action, M::Observation>,
        action_space: &[M::Action],
        affected: &[SequenceId],
        rng: &mut ChaCha8Rng,
    ) -> Result<(), SolverError>;
}

/// Default corrector; problem-specific ones may exploit structure to avoid
/// re-simulating whole suffixes.
#[derive(Debug, Default)]
pub struct DefaultHistoryCorrector;

impl<M: PomdpModel> HistoryCorrector<M> for DefaultHistoryCorrector {
    fn correct(
        &self,
        model: &M,
        tree: &mut BeliefTree<M::Action, M::Observation>,
        pool: &mut StatePool<M::State>,
        history: &mut HistoryStore<M::Action, M::Observation>,
        action_space: &[M::Action],
        affected: &[SequenceId],
        rng: &mut ChaCha8Rng,
    ) -> Result<(), SolverError> {
        let discount = model.discount_factor();
        for sequence in affected {
            backpropagate::<M>(tree, history, *sequence, discount, -1)?;
            replay_suffix(model, tree, pool, history, action_space, *sequence, rng)?;
            backpropagate::<M>(tree, history, *sequence, discount, 1)?;
        }
        tracing::debug!(sequences = affected.len(), "replayed affected histories");
        Ok(())
    }
}

/// Re-simulate a sequence from its first affected entry onward. Earlier
/// entries are untouched; later ones get fresh rewards, observations, and
/// states, and are moved between beliefs as the observations dictate.
fn replay_suffix<M: PomdpModel>(
    model: &M,
    tree: &mut BeliefTree<M::Action, M::Observation>,
    pool: &mut StatePool<M::State>,
    history: &mut HistoryStore<M::Action, M::Observation>,
    action_space: &[M::Action],
    sequence: SequenceId,
    rng: &mut ChaCha8Rng,
) -> Result<(), SolverError> {
    // Replay begins at the first affected entry still attached to the tree;
    // entries detached by an earlier re-rooting no longer carry statistics.
    let first_affected = {
        let owner = history
            .sequence(sequence)
            .ok_or_else(|| SolverError::invariant("replay of a missing sequence"))?;
        match owner
            .entries()
            .iter()
            .position(|entry| entry.affected && entry.belief.is_some())
        {
            Some(index) => index,
            None => return Ok(()),
        }
    };

    let mut index = first_affected;
    let mut truncated = false;
    loop {
        // Snapshot what this step needs before mutating anything.
        let (state, action, current_belief) = {
            let owner = history
                .sequence(sequence)
                .ok_or_else(|| SolverError::invariant("replay of a missing sequence"))?;
            let entry = &owner.entries()[index];
            let action = match &entry.action {
                Some(action) => action.clone(),
                None => break,
            };
            let state = pool
                .state(entry.state)
                .ok_or_else(|| SolverError::invariant("entry state missing from pool"))?
                .clone();
            let belief = entry
                .belief
                .ok_or_else(|| SolverError::invariant("stepped entry without a belief"))?;
            (state, action, belief)
        };

        let step = model.generate_step(&state, &action, rng);
        if !step.reward.is_finite() {
            return Err(SolverError::model_contract(
                "generate_step returned a non-finite reward",
            ));
        }
        let (child, _) =
            tree.create_or_get_child(current_belief, &action, &step.observation, action_space)?;
        let next_state_id = pool.get_or_canonicalize(step.next_state);

        // Rewrite this step and move the successor entry to its new belief.
        let next_ref = EntryRef::new(sequence, index + 1);
        let old_belief = history.entry(next_ref).and_then(|entry| entry.belief);
        if let Some(old) = old_belief {
            if old != child {
                tree.deregister_particle(old, next_ref)?;
            }
        }
        {
            let owner = history
                .sequence_mut(sequence)
                .ok_or_else(|| SolverError::invariant("replay of a missing sequence"))?;
            let entry = &mut owner.entries[index];
            entry.observation = Some(step.observation.clone());
            entry.reward = step.reward;
            entry.affected = false;
            let next = &mut owner.entries[index + 1];
            next.state = next_state_id;
            next.belief = Some(child);
        }
        if old_belief != Some(child) {
            tree.register_particle(child, next_ref)?;
        }

        if step.is_terminal {
            truncate_after::<M>(tree, history, sequence, index + 1)?;
            truncated = true;
            break;
        }
        index += 1;
    }

    // Reseed the leaf value for the redo pass.
    let leaf_value = if truncated {
        0.0
    } else {
        let owner = history
            .sequence(sequence)
            .ok_or_else(|| SolverError::invariant("replay of a missing sequence"))?;
        let last = owner
            .entries()
            .last()
            .ok_or_else(|| SolverError::invariant("replayed sequence is empty"))?;
        let state = pool
            .state(last.state)
            .ok_or_else(|| SolverError::invariant("entry state missing from pool"))?;
        if model.is_terminal(state) {
            0.0
        } else {
            model
                .heuristic_value(state)
                .clamp(model.min_value(), model.max_value())
        }
    };
    let owner = history
        .sequence_mut(sequence)
        .ok_or_else(|| SolverError::invariant("replay of a missing sequence"))?;
    owner.terminal_value = leaf_value;
    for entry in owner.entries.iter_mut() {
        entry.affected = false;
    }
    Ok(())
}

/// Drop every entry after `last_index`, detaching their particles, and clear
/// the step recorded on the new final entry.
fn truncate_after<M: PomdpModel>(
    tree: &mut BeliefTree<M::Action, M::Observation>,
    history: &mut HistoryStore<M::Action, M::Observation>,
    sequence: SequenceId,
    last_index: usize,
) -> Result<(), SolverError> {
    let length = history
        .sequence(sequence)
        .ok_or_else(|| SolverError::invariant("truncate of a missing sequence"))?
        .len();
    for index in (last_index + 1)..length {
        let entry_ref = EntryRef::new(sequence, index);
        if let Some(belief) = history.entry(entry_ref).and_then(|entry| entry.belief) {
            tree.deregister_particle(belief, entry_ref)?;
        }
    }
    let owner = history
        .sequence_mut(sequence)
        .ok_or_else(|| SolverError::invariant("truncate of a missing sequence"))?;
    owner.entries.truncate(last_index + 1);
    let last = &mut owner.entries[last_index];
    last.action = None;
    last.observation = None;
    last.reward = 0.0;
    Ok(())
}
