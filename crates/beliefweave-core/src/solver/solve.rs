use std::time::Instant;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::solver::belief::{BeliefNode, BeliefTree};
use crate::solver::corrector::{DefaultHistoryCorrector, HistoryCorrector};
use crate::solver::error::SolverError;
use crate::solver::estimators::EstimationKind;
use crate::solver::history::HistoryStore;
use crate::solver::ids::{BeliefId, SequenceId};
use crate::solver::model::{PomdpModel, PomdpState};
use crate::solver::options::SolverOptions;
use crate::solver::pool::StatePool;
use crate::solver::replenish::{add_replenished_particle, refill_uniform, replenish_particles};
use crate::solver::search::{extend_episode, BasicSearchStrategy};
use crate::solver::stepper::{StepGenerator, UcbStepGenerator};

/// Budget for one `improve` call. A limit of `None` leaves that dimension
/// unbounded; with neither limit set no work is performed.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchBudget {
    pub max_millis: Option<u64>,
    pub max_simulations: Option<u64>,
}

impl SearchBudget {
    /// The zero budget: `improve` returns without simulating.
    pub fn none() -> Self {
        SearchBudget::default()
    }

    pub fn simulations(count: u64) -> Self {
        SearchBudget {
            max_millis: None,
            max_simulations: Some(count),
        }
    }

    pub fn millis(millis: u64) -> Self {
        SearchBudget {
            max_millis: Some(millis),
            max_simulations: None,
        }
    }

    /// Budget described by the options record; 0 means unspecified.
    pub fn from_options(options: &SolverOptions) -> Self {
        SearchBudget {
            max_millis: (options.search_budget_ms > 0).then_some(options.search_budget_ms),
            max_simulations: (options.search_budget_iterations > 0)
                .then_some(options.search_budget_iterations),
        }
    }

    fn is_zero(&self) -> bool {
        self.max_millis.is_none() && self.max_simulations.is_none()
    }
}

/// The orchestrator: owns the belief tree, the state pool, the history
/// store, the model, the strategies, and the random source, and exposes the
/// improve / recommend / advance / apply-changes cycle.
pub struct Solver<M: PomdpModel> {
    pub(crate) model: M,
    pub(crate) options: SolverOptions,
    pub(crate) rng: ChaCha8Rng,
    pub(crate) pool: StatePool<M::State>,
    pub(crate) history: HistoryStore<M::Action, M::Observation>,
    pub(crate) tree: BeliefTree<M::Action, M::Observation>,
    pub(crate) action_space: Vec<M::Action>,
    pub(crate) search: BasicSearchStrategy<M>,
    pub(crate) estimation: EstimationKind,
    pub(crate) corrector: Box<dyn HistoryCorrector<M>>,
}

impl<M: PomdpModel> Solver<M> {
    /// Build a solver over `model`, seeding the root belief with
    /// `maxParticleCount` initial-state particles.
    pub fn new(model: M, options: SolverOptions) -> Result<Self, SolverError> {
        options.validate()?;

        let action_space = model.action_space();
        if action_space.is_empty() {
            return Err(SolverError::model_contract("the action space is empty"));
        }
        if !model.discount_factor().is_finite()
            || model.discount_factor() <= 0.0
            || model.discount_factor() > 1.0
        {
            return Err(SolverError::model_contract(
                "discount factor must be in (0, 1]",
            ));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(options.rng_seed);
        let probe = model.sample_an_init_state(&mut rng);
        if probe.to_vector().len() != model.num_state_variables() {
            return Err(SolverError::model_contract(
                "state vector length does not match num_state_variables",
            ));
        }

        let stepper = UcbStepGenerator::new(
            options.exploration_coefficient,
            options.horizon,
            options.heuristic_type,
        );
        let mut solver = Solver {
            model,
            options,
            rng,
            pool: StatePool::new(),
            history: HistoryStore::new(),
            tree: BeliefTree::new(action_space.clone()),
            action_space,
            search: BasicSearchStrategy::new(Box::new(stepper)),
            estimation: EstimationKind::default(),
            corrector: Box::new(DefaultHistoryCorrector),
        };

        let root = solver.tree.root_id();
        for _ in 0..solver.options.max_particle_count {
            let state = solver.model.sample_an_init_state(&mut solver.rng);
            add_replenished_particle::<M>(
                &mut solver.tree,
                &mut solver.pool,
                &mut solver.history,
                root,
                state,
            )?;
        }
        Ok(solver)
    }

    /// Swap in a different step-generation strategy.
    pub fn set_step_generator(&mut self, stepper: Box<dyn StepGenerator<M>>) {
        self.search = BasicSearchStrategy::new(stepper);
    }

    /// Swap in a different belief q-value estimation strategy.
    pub fn set_estimation(&mut self, kind: EstimationKind) {
        self.estimation = kind;
        for (_, node) in self.tree.iter_mut() {
            node.mark_estimate_dirty();
        }
    }

    /// Swap in a different history corrector.
    pub fn set_history_corrector(&mut self, corrector: Box<dyn HistoryCorrector<M>>) {
        self.corrector = corrector;
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn options(&self) -> &SolverOptions {
        &self.options
    }

    pub fn estimation(&self) -> EstimationKind {
        self.estimation
    }

    pub fn tree(&self) -> &BeliefTree<M::Action, M::Observation> {
        &self.tree
    }

    pub fn history(&self) -> &HistoryStore<M::Action, M::Observation> {
        &self.history
    }

    pub fn pool(&self) -> &StatePool<M::State> {
        &self.pool
    }

    pub fn root_id(&self) -> BeliefId {
        self.tree.root_id()
    }

    pub fn root(&self) -> Result<&BeliefNode<M::Action, M::Observation>, SolverError> {
        self.tree.node(self.tree.root_id())
    }

    /// Run simulations from the root until the budget is exhausted; the
    /// budget is checked between simulations only, so an in-flight
    /// simulation always completes. Returns the number actually run.
    pub fn improve(&mut self, budget: SearchBudget) -> Result<u64, SolverError> {
        if budget.is_zero() {
            return Ok(0);
        }
        let start = Instant::now();
        let mut simulations = 0_u64;
        loop {
            if let Some(limit) = budget.max_simulations {
                if simulations >= limit {
                    break;
                }
            }
            if let Some(limit) = budget.max_millis {
                if start.elapsed().as_millis() as u64 >= limit {
                    break;
                }
            }
            let state = self.sample_root_state()?;
            let root = self.tree.root_id();
            extend_episode(
                &self.model,
                self.search.stepper.as_ref(),
                &mut self.tree,
                &mut self.pool,
                &mut self.history,
                &self.action_space,
                root,
                state,
                &mut self.rng,
            )?;
            simulations += 1;
        }
        tracing::debug!(
            simulations,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "improve finished"
        );
        Ok(simulations)
    }

    /// Run simulations under the budget recorded in the options.
    pub fn improve_from_options(&mut self) -> Result<u64, SolverError> {
        let budget = SearchBudget::from_options(&self.options);
        self.improve(budget)
    }

    /// The action the root estimator currently recommends, falling back to a
    /// uniformly drawn untried action while nothing has been visited. Does
    /// not grow the tree.
    pub fn recommended_action(&mut self) -> Option<M::Action> {
        let kind = self.estimation;
        let root_id = self.tree.root_id();
        let node = self.tree.node_mut(root_id).ok()?;
        if let Some(action) = node.recommended_action(kind) {
            return Some(action);
        }
        node.mapping().next_untried_action(&mut self.rng)
    }

    /// The root estimator's current q-value.
    pub fn root_q_value(&mut self) -> Result<f64, SolverError> {
        let kind = self.estimation;
        let root_id = self.tree.root_id();
        Ok(self.tree.node_mut(root_id)?.q_value(kind))
    }

    /// Re-root the tree at the child reached by the executed action and the
    /// received observation: siblings and the old root are deleted (stable
    /// ids on the surviving subtree are preserved), and the new root is
    /// replenished when it holds fewer than `minParticleCount` particles.
    ///
    /// On a `ParticleDepletion` error the tree is already re-rooted; a
    /// caller that chooses to continue anyway may call
    /// `refill_root_uniform`.
    pub fn advance(
        &mut self,
        action: &M::Action,
        observation: &M::Observation,
    ) -> Result<(), SolverError> {
        let old_root = self.tree.root_id();
        let parent_states: Vec<M::State> = {
            let node = self.tree.node(old_root)?;
            node.particles()
                .iter()
                .filter_map(|particle| self.history.entry(*particle))
                .filter_map(|entry| self.pool.state(entry.state()).cloned())
                .collect()
        };

        let (child, created) =
            self.tree
                .create_or_get_child(old_root, action, observation, &self.action_space)?;
        let detached = self.tree.prune_for_advance(child)?;
        for entry_ref in detached {
            if let Some(entry) = self.history.entry_mut(entry_ref) {
                entry.belief = None;
            }
        }
        self.collect_dead_sequences();
        tracing::info!(
            new_root = child.index(),
            fresh = created,
            particles = self.tree.node(child)?.particle_count(),
            "advanced belief root"
        );

        let minimum = self.options.min_particle_count as usize;
        if self.tree.node(child)?.particle_count() < minimum {
            replenish_particles(
                &self.model,
                &mut self.tree,
                &mut self.pool,
                &mut self.history,
                child,
                &parent_states,
                action,
                observation,
                minimum,
                self.options.max_replenish_attempts,
                &mut self.rng,
            )?;
        }
        Ok(())
    }

    /// Deliberate fallback after a depletion fault: top the root up from the
    /// uniform state prior.
    pub fn refill_root_uniform(&mut self) -> Result<u64, SolverError> {
        let root = self.tree.root_id();
        let produced = refill_uniform(
            &self.model,
            &mut self.tree,
            &mut self.pool,
            &mut self.history,
            root,
            self.options.min_particle_count as usize,
            &mut self.rng,
        )?;
        tracing::warn!(produced, "root refilled from the uniform state prior");
        Ok(produced as u64)
    }

    /// Propagate world changes into the tree: apply them to the model, flag
    /// every history entry whose state or recorded step touches an affected
    /// state, replay the flagged suffixes through the corrector, and
    /// invalidate estimator caches.
    pub fn apply_changes(&mut self, changes: &[M::Change]) -> Result<(), SolverError> {
        let mut affected_sequences: Vec<SequenceId> = Vec::new();
        for change in changes {
            self.model.apply_change(change);
            let region = self.model.affected_region(change);
            let affected_states: std::collections::HashSet<_> =
                self.pool.states_within(&region).into_iter().collect();
            if affected_states.is_empty() {
                continue;
            }
            for (sequence_id, sequence) in self.history.iter() {
                let touched = sequence.entries().windows(2).any(|pair| {
                    pair[0].has_step()
                        && (affected_states.contains(&pair[0].state())
                            || affected_states.contains(&pair[1].state()))
                });
                if touched && !affected_sequences.contains(&sequence_id) {
                    affected_sequences.push(sequence_id);
                }
            }
        }
        if affected_sequences.is_empty() {
            return Ok(());
        }

        // Flag the individual entries so the corrector can find the first
        // affected step of each sequence.
        for change in changes {
            let region = self.model.affected_region(change);
            let affected_states: std::collections::HashSet<_> =
                self.pool.states_within(&region).into_iter().collect();
            for sequence_id in &affected_sequences {
                if let Some(sequence) = self.history.sequence_mut(*sequence_id) {
                    let states: Vec<_> =
                        sequence.entries.iter().map(|entry| entry.state).collect();
                    for (index, entry) in sequence.entries.iter_mut().enumerate() {
                        if !entry.has_step() {
                            continue;
                        }
                        let next_affected = states
                            .get(index + 1)
                            .is_some_and(|state| affected_states.contains(state));
                        if affected_states.contains(&entry.state) || next_affected {
                            entry.affected = true;
                        }
                    }
                }
            }
        }

        self.corrector.correct(
            &self.model,
            &mut self.tree,
            &mut self.pool,
            &mut self.history,
            &self.action_space,
            &affected_sequences,
            &mut self.rng,
        )?;

        for (_, node) in self.tree.iter_mut() {
            node.mark_estimate_dirty();
        }
        tracing::info!(
            changes = changes.len(),
            sequences = affected_sequences.len(),
            "applied model changes"
        );
        Ok(())
    }

    /// Verify the structural invariants of the tree and history.
    pub fn check_invariants(&self) -> Result<(), SolverError> {
        self.tree.check_invariants(&self.history)
    }

    /// Sample a particle from the root uniformly and resolve its state.
    fn sample_root_state(&mut self) -> Result<M::State, SolverError> {
        let root_id = self.tree.root_id();
        let node = self.tree.node(root_id)?;
        if node.particle_count() == 0 {
            return Err(SolverError::ParticleDepletion {
                belief: root_id,
                produced: 0,
                wanted: 1,
            });
        }
        let index = self.rng.gen_range(0..node.particle_count());
        let particle = node.particles()[index];
        let entry = self
            .history
            .entry(particle)
            .ok_or_else(|| SolverError::invariant("root holds a dangling particle"))?;
        self.pool
            .state(entry.state())
            .cloned()
            .ok_or_else(|| SolverError::invariant("particle state missing from pool"))
    }

    /// Delete sequences whose entries are all detached from the tree.
    fn collect_dead_sequences(&mut self) {
        let dead: Vec<SequenceId> = self
            .history
            .iter()
            .filter(|(_, sequence)| sequence.entries().iter().all(|entry| entry.belief().is_none()))
            .map(|(id, _)| id)
            .collect();
        for id in dead {
            self.history.delete_sequence(id);
        }
    }
}
