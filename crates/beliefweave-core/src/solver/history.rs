use crate::solver::arena::Arena;
use crate::solver::ids::{BeliefId, EntryRef, SequenceId, StateId};

/// Record of one simulated step: the state reached, plus the action,
/// observation, and reward recorded when the simulation stepped onward from
/// it. The final entry of a sequence carries no action.
#[derive(Debug, Clone)]
pub struct HistoryEntry<A, O> {
    pub(crate) state: StateId,
    pub(crate) action: Option<A>,
    pub(crate) observation: Option<O>,
    pub(crate) reward: f64,
    /// Discount accumulated from the start of the owning sequence.
    pub(crate) discount: f64,
    /// Back reference to the belief this entry is a particle of; cleared
    /// when that belief is pruned.
    pub(crate) belief: Option<BeliefId>,
    /// Set by change propagation when the entry's state or step is affected.
    pub(crate) affected: bool,
}

impl<A, O> HistoryEntry<A, O> {
    pub(crate) fn new(state: StateId, discount: f64) -> Self {
        HistoryEntry {
            state,
            action: None,
            observation: None,
            reward: 0.0,
            discount,
            belief: None,
            affected: false,
        }
    }

    pub fn state(&self) -> StateId {
        self.state
    }

    pub fn action(&self) -> Option<&A> {
        self.action.as_ref()
    }

    pub fn observation(&self) -> Option<&O> {
        self.observation.as_ref()
    }

    pub fn reward(&self) -> f64 {
        self.reward
    }

    pub fn discount(&self) -> f64 {
        self.discount
    }

    pub fn belief(&self) -> Option<BeliefId> {
        self.belief
    }

    /// Whether this entry recorded a step onward (non-final entries do).
    pub fn has_step(&self) -> bool {
        self.action.is_some()
    }
}

/// Ordered list of history entries generated by one simulation.
#[derive(Debug, Clone)]
pub struct HistorySequence<A, O> {
    pub(crate) entries: Vec<HistoryEntry<A, O>>,
    /// Leaf value that seeded the last backpropagation of this sequence.
    pub(crate) terminal_value: f64,
}

impl<A, O> HistorySequence<A, O> {
    fn new() -> Self {
        HistorySequence {
            entries: Vec::new(),
            terminal_value: 0.0,
        }
    }

    pub fn entries(&self) -> &[HistoryEntry<A, O>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn terminal_value(&self) -> f64 {
        self.terminal_value
    }
}

/// Owns all history entries and sequences. Every particle in every belief is
/// an `EntryRef` into this store; entries are appended in place and never
/// moved, so refs stay valid until their sequence is deleted.
#[derive(Debug, Clone)]
pub struct HistoryStore<A, O> {
    sequences: Arena<SequenceId, HistorySequence<A, O>>,
}

impl<A, O> HistoryStore<A, O> {
    pub fn new() -> Self {
        HistoryStore {
            sequences: Arena::new(),
        }
    }

    pub fn create_sequence(&mut self) -> SequenceId {
        self.sequences.allocate(HistorySequence::new())
    }

    /// Append an entry, returning its stable ref.
    pub fn append(&mut self, sequence: SequenceId, entry: HistoryEntry<A, O>) -> Option<EntryRef> {
        let owner = self.sequences.get_mut(sequence)?;
        let index = owner.entries.len();
        owner.entries.push(entry);
        Some(EntryRef::new(sequence, index))
    }

    pub fn sequence(&self, id: SequenceId) -> Option<&HistorySequence<A, O>> {
        self.sequences.get(id)
    }

    pub fn sequence_mut(&mut self, id: SequenceId) -> Option<&mut HistorySequence<A, O>> {
        self.sequences.get_mut(id)
    }

    pub fn entry(&self, entry_ref: EntryRef) -> Option<&HistoryEntry<A, O>> {
        self.sequences
            .get(entry_ref.sequence)?
            .entries
            .get(entry_ref.index)
    }

    pub fn entry_mut(&mut self, entry_ref: EntryRef) -> Option<&mut HistoryEntry<A, O>> {
        self.sequences
            .get_mut(entry_ref.sequence)?
            .entries
            .get_mut(entry_ref.index)
    }

    /// Delete a sequence. The caller is responsible for deregistering the
    /// sequence's entries from the beliefs that held them as particles; the
    /// solver mediates this during pruning.
    pub fn delete_sequence(&mut self, id: SequenceId) -> Option<HistorySequence<A, O>> {
        self.sequences.remove(id)
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    pub fn slot_count(&self) -> usize {
        self.sequences.slot_count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SequenceId, &HistorySequence<A, O>)> + '_ {
        self.sequences.iter()
    }

    pub(crate) fn rebuild(
        slot_count: usize,
        records: Vec<(SequenceId, HistorySequence<A, O>)>,
    ) -> Self {
        HistoryStore {
            sequences: Arena::from_records(slot_count, records),
        }
    }
}
