use serde::{Deserialize, Serialize};

/// A wrapper for an integer index used to address belief nodes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BeliefId(usize);

impl BeliefId {
    /// Get the value of the actual index without having to access and risk overriding the internal value
    pub fn index(&self) -> usize {
        self.0
    }
}

impl From<usize> for BeliefId {
    /// Allow for explicit conversion from usize to BeliefId
    fn from(value: usize) -> Self {
        BeliefId(value)
    }
}

/// A wrapper for an integer index used to address canonicalized states in the pool.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateId(usize);

impl StateId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl From<usize> for StateId {
    /// Allow for explicit conversion from usize to StateId
    fn from(value: usize) -> Self {
        StateId(value)
    }
}

/// A wrapper for an integer index used to address history sequences.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SequenceId(usize);

impl SequenceId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl From<usize> for SequenceId {
    /// Allow for explicit conversion from usize to SequenceId
    fn from(value: usize) -> Self {
        SequenceId(value)
    }
}

/// Stable reference to one history entry: the owning sequence plus the
/// entry's position inside it. Entries are never moved, so a ref stays
/// valid until its sequence is deleted.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryRef {
    pub sequence: SequenceId,
    pub index: usize,
}

impl EntryRef {
    pub fn new(sequence: SequenceId, index: usize) -> Self {
        EntryRef { sequence, index }
    }

    /// A particle whose index is 0 is the first entry of its sequence.
    pub fn is_sequence_start(&self) -> bool {
        self.index == 0
    }
}
