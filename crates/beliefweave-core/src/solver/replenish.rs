use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::solver::belief::BeliefTree;
use crate::solver::error::SolverError;
use crate::solver::history::{HistoryEntry, HistoryStore};
use crate::solver::ids::BeliefId;
use crate::solver::model::PomdpModel;
use crate::solver::pool::StatePool;

/// Round a fractional expectation to an integer count, carrying the
/// remainder as a Bernoulli trial so totals are preserved in expectation.
pub(crate) fn stochastic_round(expected: f64, rng: &mut ChaCha8Rng) -> u64 {
    let floor = expected.floor();
    let mut count = floor as u64;
    if rng.gen::<f64>() < expected - floor {
        count += 1;
    }
    count
}

/// Top up a belief's particles to `target_count` given the parent belief's
/// particle states and the (action, observation) that led here.
///
/// Weighted resampling runs when the parent belief still carries likelihood
/// mass for the observation: each parent state contributes copies in
/// proportion to its observation likelihood, each copy stepped through the
/// model to yield a post-action particle. When the mass is zero the parent
/// belief is incompatible with the observation and bounded rejection
/// sampling from the uniform state prior takes over.
#[allow(clippy::too_many_arguments)]
pub(crate) fn replenish_particles<M: PomdpModel>(
    model: &M,
    tree: &mut BeliefTree<M::Action, M::Observation>,
    pool: &mut StatePool<M::State>,
    history: &mut HistoryStore<M::Action, M::Observation>,
    belief: BeliefId,
    parent_states: &[M::State],
    action: &M::Action,
    observation: &M::Observation,
    target_count: usize,
    max_attempts: u64,
    rng: &mut ChaCha8Rng,
) -> Result<usize, SolverError> {
    let current = tree.node(belief)?.particle_count();
    if current >= target_count {
        return Ok(0);
    }
    let deficit = target_count - current;

    let weights: Vec<f64> = parent_states
        .iter()
        .map(|state| model.observation_likelihood(state, action, observation))
        .collect();
    let mass: f64 = weights.iter().sum();

    let mut produced = 0;
    if mass > 0.0 {
        // Each round draws copies in proportion to the likelihood weights,
        // targeting the remaining deficit; stochastic rounding preserves the
        // target in expectation, so a few rounds close the gap.
        let mut rounds = 0;
        while produced < deficit && rounds < max_attempts {
            rounds += 1;
            let remaining = (deficit - produced) as f64;
            for (state, weight) in parent_states.iter().zip(&weights) {
                if *weight <= 0.0 {
                    continue;
                }
                let expected = weight * remaining / mass;
                for _ in 0..stochastic_round(expected, rng) {
                    let step = model.generate_step(state, action, rng);
                    add_replenished_particle::<M>(tree, pool, history, belief, step.next_state)?;
                    produced += 1;
                }
            }
        }
        tracing::debug!(
            belief = belief.index(),
            produced,
            deficit,
            rounds,
            "replenished by weighted resampling"
        );
    }

    if produced < deficit {
        // Parent belief incompatible with the observation (or out of
        // likelihood mass); fall back to black-box rejection sampling.
        let mut attempts = 0;
        while produced < deficit {
            if attempts >= max_attempts {
                tracing::warn!(
                    belief = belief.index(),
                    produced,
                    wanted = deficit,
                    "particle depletion during rejection sampling"
                );
                return Err(SolverError::ParticleDepletion {
                    belief,
                    produced,
                    wanted: deficit,
                });
            }
            attempts += 1;
            let state = model.sample_state_uniform(rng);
            let step = model.generate_step(&state, action, rng);
            if step.observation == *observation {
                add_replenished_particle::<M>(tree, pool, history, belief, step.next_state)?;
                produced += 1;
            }
        }
        tracing::debug!(
            belief = belief.index(),
            produced,
            attempts,
            "replenished by rejection sampling"
        );
    }

    Ok(produced)
}

/// Fill a belief with particles drawn directly from the uniform state prior.
/// This is the explicit fallback a caller may choose after a depletion fault.
pub(crate) fn refill_uniform<M: PomdpModel>(
    model: &M,
    tree: &mut BeliefTree<M::Action, M::Observation>,
    pool: &mut StatePool<M::State>,
    history: &mut HistoryStore<M::Action, M::Observation>,
    belief: BeliefId,
    target_count: usize,
    rng: &mut ChaCha8Rng,
) -> Result<usize, SolverError> {
    let current = tree.node(belief)?.particle_count();
    let mut produced = 0;
    for _ in current..target_count {
        let state = model.sample_state_uniform(rng);
        add_replenished_particle::<M>(tree, pool, history, belief, state)?;
        produced += 1;
    }
    Ok(produced)
}

/// Register a fresh state as a particle: a new single-entry history sequence
/// rooted at the belief.
pub(crate) fn add_replenished_particle<M: PomdpModel>(
    tree: &mut BeliefTree<M::Action, M::Observation>,
    pool: &mut StatePool<M::State>,
    history: &mut HistoryStore<M::Action, M::Observation>,
    belief: BeliefId,
    state: M::State,
) -> Result<(), SolverError> {
    let state_id = pool.get_or_canonicalize(state);
    let sequence = history.create_sequence();
    let mut entry = HistoryEntry::new(state_id, 1.0);
    entry.belief = Some(belief);
    let entry_ref = history
        .append(sequence, entry)
        .ok_or_else(|| SolverError::invariant("append to a missing sequence"))?;
    tree.register_particle(belief, entry_ref)?;
    Ok(())
}
