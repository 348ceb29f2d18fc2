use std::io::{Read, Write};

use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::solver::actions::{ActionEntry, ActionMapping, ActionStats, ActionStatus};
use crate::solver::arena::Arena;
use crate::solver::belief::{ActionNode, BeliefNode, BeliefTree, ParentLink};
use crate::solver::corrector::DefaultHistoryCorrector;
use crate::solver::error::SolverError;
use crate::solver::estimators::EstimationKind;
use crate::solver::history::{HistoryEntry, HistorySequence, HistoryStore};
use crate::solver::ids::{BeliefId, EntryRef, SequenceId, StateId};
use crate::solver::model::PomdpModel;
use crate::solver::options::SolverOptions;
use crate::solver::pool::StatePool;
use crate::solver::search::BasicSearchStrategy;
use crate::solver::solve::Solver;
use crate::solver::stepper::UcbStepGenerator;

pub(crate) const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// Whole-solver persistence record. Every object is written with its stable
/// id; cross references use those ids, and absent children are nulls.
/// `load(save(x))` reconstructs a solver observationally identical to `x`,
/// including the id counters and the rng state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverSnapshot<S, A, O> {
    pub schema_version: u32,
    pub options: SolverOptions,
    pub estimation: EstimationKind,
    pub rng: ChaCha8Rng,
    pub root: usize,
    pub belief_slot_count: usize,
    pub sequence_slot_count: usize,
    pub particle_ticks: u64,
    /// Canonicalized states; position is the state id.
    pub states: Vec<S>,
    pub sequences: Vec<SequenceSnapshot<A, O>>,
    pub beliefs: Vec<BeliefSnapshot<A, O>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceSnapshot<A, O> {
    pub sequence_id: usize,
    pub terminal_value: f64,
    pub entries: Vec<EntrySnapshot<A, O>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntrySnapshot<A, O> {
    pub state: usize,
    pub action: Option<A>,
    pub observation: Option<O>,
    pub reward: f64,
    pub discount: f64,
    pub belief: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeliefSnapshot<A, O> {
    pub belief_id: usize,
    pub depth: u64,
    pub parent: Option<ParentSnapshot<A, O>>,
    pub starting_sequence_count: u64,
    pub last_particle_tick: u64,
    /// Particle refs as (sequence id, entry index) pairs, in multiset order.
    pub particles: Vec<(usize, usize)>,
    pub untried: Vec<A>,
    pub entries: Vec<ActionEntrySnapshot<A, O>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParentSnapshot<A, O> {
    pub belief: usize,
    pub action: A,
    pub observation: O,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionEntrySnapshot<A, O> {
    pub action: A,
    pub visits: i64,
    pub total_q: f64,
    pub status: ActionStatus,
    /// Nothing when the action was tried but never expanded into a node.
    pub observations: Option<Vec<ObservationEntrySnapshot<O>>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservationEntrySnapshot<O> {
    pub observation: O,
    pub child: usize,
    pub visits: i64,
}

impl<M: PomdpModel> Solver<M> {
    /// Export the solver's full persistent state.
    pub fn snapshot(&self) -> SolverSnapshot<M::State, M::Action, M::Observation> {
        let states = self.pool.states().map(|(_, state)| state.clone()).collect();

        let sequences = self
            .history
            .iter()
            .map(|(id, sequence)| SequenceSnapshot {
                sequence_id: id.index(),
                terminal_value: sequence.terminal_value(),
                entries: sequence
                    .entries()
                    .iter()
                    .map(|entry| EntrySnapshot {
                        state: entry.state().index(),
                        action: entry.action().cloned(),
                        observation: entry.observation().cloned(),
                        reward: entry.reward(),
                        discount: entry.discount(),
                        belief: entry.belief().map(|belief| belief.index()),
                    })
                    .collect(),
            })
            .collect();

        let beliefs = self
            .tree
            .iter()
            .map(|(id, node)| BeliefSnapshot {
                belief_id: id.index(),
                depth: node.depth(),
                parent: node.parent().map(|link| ParentSnapshot {
                    belief: link.belief.index(),
                    action: link.action.clone(),
                    observation: link.observation.clone(),
                }),
                starting_sequence_count: node.starting_sequence_count(),
                last_particle_tick: node.last_particle_tick(),
                particles: node
                    .particles()
                    .iter()
                    .map(|particle| (particle.sequence.index(), particle.index))
                    .collect(),
                untried: node.mapping().untried_actions().to_vec(),
                entries: node
                    .mapping()
                    .entries()
                    .map(|entry| ActionEntrySnapshot {
                        action: entry.action().clone(),
                        visits: entry.stats().visits(),
                        total_q: entry.stats().total_q(),
                        status: entry.status(),
                        observations: entry.child().map(|child| {
                            child
                                .mapping()
                                .entries()
                                .map(|obs_entry| ObservationEntrySnapshot {
                                    observation: obs_entry.observation().clone(),
                                    child: obs_entry.child().index(),
                                    visits: obs_entry.visits(),
                                })
                                .collect()
                        }),
                    })
                    .collect(),
            })
            .collect();

        SolverSnapshot {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            options: self.options.clone(),
            estimation: self.estimation,
            rng: self.rng.clone(),
            root: self.tree.root_id().index(),
            belief_slot_count: self.tree.slot_count(),
            sequence_slot_count: self.history.slot_count(),
            particle_ticks: self.tree.particle_ticks(),
            states,
            sequences,
            beliefs,
        }
    }

    /// Write the solver as one YAML document.
    pub fn save<W: Write>(&self, writer: W) -> Result<(), SolverError> {
        serde_yaml::to_writer(writer, &self.snapshot()).map_err(|err| {
            SolverError::Serialization {
                message: err.to_string(),
            }
        })
    }

    /// Read a solver back from a YAML document, reattaching it to `model`.
    /// The stream never perturbs in-memory state on failure.
    pub fn load<R: Read>(model: M, reader: R) -> Result<Self, SolverError> {
        let snapshot: SolverSnapshot<M::State, M::Action, M::Observation> =
            serde_yaml::from_reader(reader).map_err(|err| SolverError::Serialization {
                message: err.to_string(),
            })?;
        Self::from_snapshot(model, snapshot)
    }

    /// Rebuild a solver from a snapshot record.
    pub fn from_snapshot(
        model: M,
        snapshot: SolverSnapshot<M::State, M::Action, M::Observation>,
    ) -> Result<Self, SolverError> {
        if snapshot.schema_version != SNAPSHOT_SCHEMA_VERSION {
            return Err(SolverError::Serialization {
                message: format!(
                    "unsupported snapshot schema version {}",
                    snapshot.schema_version
                ),
            });
        }
        snapshot.options.validate()?;

        let mut pool = StatePool::new();
        for state in snapshot.states {
            pool.get_or_canonicalize(state);
        }

        let sequence_records: Vec<(SequenceId, HistorySequence<M::Action, M::Observation>)> =
            snapshot
                .sequences
                .into_iter()
                .map(|sequence| {
                    let entries = sequence
                        .entries
                        .into_iter()
                        .map(|entry| HistoryEntry {
                            state: StateId::from(entry.state),
                            action: entry.action,
                            observation: entry.observation,
                            reward: entry.reward,
                            discount: entry.discount,
                            belief: entry.belief.map(BeliefId::from),
                            affected: false,
                        })
                        .collect();
                    (
                        SequenceId::from(sequence.sequence_id),
                        HistorySequence {
                            entries,
                            terminal_value: sequence.terminal_value,
                        },
                    )
                })
                .collect();
        let history = HistoryStore::rebuild(snapshot.sequence_slot_count, sequence_records);

        let belief_records: Vec<(BeliefId, BeliefNode<M::Action, M::Observation>)> = snapshot
            .beliefs
            .into_iter()
            .map(|belief| {
                let entries = belief
                    .entries
                    .into_iter()
                    .map(|entry| {
                        let child = entry.observations.map(|observations| {
                            let restored = observations
                                .into_iter()
                                .map(|obs_entry| {
                                    crate::solver::observations::ObservationEntry::restore(
                                        obs_entry.observation,
                                        BeliefId::from(obs_entry.child),
                                        obs_entry.visits,
                                    )
                                })
                                .collect();
                            ActionNode::restore(
                                crate::solver::observations::ObservationMapping::restore(restored),
                            )
                        });
                        ActionEntry::restore(
                            entry.action,
                            ActionStats::restore(entry.visits, entry.total_q),
                            entry.status,
                            child,
                        )
                    })
                    .collect();
                let id = BeliefId::from(belief.belief_id);
                let node = BeliefNode::restore(
                    id,
                    belief.depth,
                    belief.parent.map(|parent| ParentLink {
                        belief: BeliefId::from(parent.belief),
                        action: parent.action,
                        observation: parent.observation,
                    }),
                    ActionMapping::restore(entries, belief.untried),
                    belief
                        .particles
                        .into_iter()
                        .map(|(sequence, index)| EntryRef::new(SequenceId::from(sequence), index))
                        .collect(),
                    belief.starting_sequence_count,
                    belief.last_particle_tick,
                );
                (id, node)
            })
            .collect();
        let tree = BeliefTree::restore(
            Arena::from_records(snapshot.belief_slot_count, belief_records),
            BeliefId::from(snapshot.root),
            snapshot.particle_ticks,
        );

        tree.check_invariants(&history)
            .map_err(|err| SolverError::Serialization {
                message: format!("snapshot failed invariant checks: {err}"),
            })?;

        let stepper = UcbStepGenerator::new(
            snapshot.options.exploration_coefficient,
            snapshot.options.horizon,
            snapshot.options.heuristic_type,
        );
        let action_space = model.action_space();
        if action_space.is_empty() {
            return Err(SolverError::model_contract("the action space is empty"));
        }
        Ok(Solver {
            model,
            options: snapshot.options,
            rng: snapshot.rng,
            pool,
            history,
            tree,
            action_space,
            search: BasicSearchStrategy::new(Box::new(stepper)),
            estimation: snapshot.estimation,
            corrector: Box::new(DefaultHistoryCorrector),
        })
    }
}
