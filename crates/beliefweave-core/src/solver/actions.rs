use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::solver::belief::ActionNode;
use crate::solver::model::{PomdpAction, PomdpObservation};

/// Stores the numbers the search updates constantly for one tried action.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ActionStats {
    visits: i64,
    total_q: f64,
    mean_q: f64,
}

impl ActionStats {
    pub(crate) fn new() -> Self {
        ActionStats {
            visits: 0,
            total_q: 0.0,
            mean_q: 0.0,
        }
    }

    pub(crate) fn restore(visits: i64, total_q: f64) -> Self {
        let mut stats = ActionStats {
            visits,
            total_q,
            mean_q: 0.0,
        };
        stats.refresh_mean();
        stats
    }

    pub fn visits(&self) -> i64 {
        self.visits
    }

    pub fn total_q(&self) -> f64 {
        self.total_q
    }

    /// Mean q estimate; 0 while unvisited.
    pub fn mean_q(&self) -> f64 {
        self.mean_q
    }

    /// Add a (possibly negative) sample; backpropagation uses +1 visits,
    /// change correction undoes with -1.
    pub(crate) fn update(&mut self, delta_q: f64, delta_visits: i64) {
        self.visits += delta_visits;
        self.total_q += delta_q;
        self.refresh_mean();
    }

    fn refresh_mean(&mut self) {
        self.mean_q = if self.visits <= 0 {
            0.0
        } else {
            self.total_q / self.visits as f64
        };
    }
}

/// Lifecycle of an action inside a mapping. Untried actions are not entries
/// yet; they live in the mapping's untried pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Tried,
    Pruned,
}

/// One tried action with its statistics and (once expanded) its child node.
#[derive(Debug, Clone)]
pub struct ActionEntry<A, O> {
    action: A,
    stats: ActionStats,
    status: ActionStatus,
    child: Option<ActionNode<O>>,
}

impl<A: PomdpAction, O: PomdpObservation> ActionEntry<A, O> {
    fn new(action: A) -> Self {
        ActionEntry {
            action,
            stats: ActionStats::new(),
            status: ActionStatus::Tried,
            child: None,
        }
    }

    pub(crate) fn restore(
        action: A,
        stats: ActionStats,
        status: ActionStatus,
        child: Option<ActionNode<O>>,
    ) -> Self {
        ActionEntry {
            action,
            stats,
            status,
            child,
        }
    }

    pub fn action(&self) -> &A {
        &self.action
    }

    pub fn stats(&self) -> &ActionStats {
        &self.stats
    }

    pub fn status(&self) -> ActionStatus {
        self.status
    }

    pub fn child(&self) -> Option<&ActionNode<O>> {
        self.child.as_ref()
    }

    pub(crate) fn child_mut(&mut self) -> Option<&mut ActionNode<O>> {
        self.child.as_mut()
    }

    /// The child node, created on first use.
    pub(crate) fn child_or_create(&mut self) -> &mut ActionNode<O> {
        self.child.get_or_insert_with(ActionNode::new)
    }

    fn is_selectable(&self) -> bool {
        self.status == ActionStatus::Tried && self.stats.visits > 0
    }
}

/// Per-belief dictionary over the action space: tried actions with
/// visit/value statistics, untried actions awaiting expansion.
#[derive(Debug, Clone)]
pub struct ActionMapping<A, O> {
    entries: Vec<ActionEntry<A, O>>,
    untried: Vec<A>,
    total_visits: i64,
}

impl<A: PomdpAction, O: PomdpObservation> ActionMapping<A, O> {
    /// Create a mapping whose untried pool is the full action space.
    pub fn new(action_space: Vec<A>) -> Self {
        ActionMapping {
            entries: Vec::new(),
            untried: action_space,
            total_visits: 0,
        }
    }

    pub(crate) fn restore(
        entries: Vec<ActionEntry<A, O>>,
        untried: Vec<A>,
    ) -> Self {
        let total_visits = entries.iter().map(|entry| entry.stats.visits).sum();
        ActionMapping {
            entries,
            untried,
            total_visits,
        }
    }

    pub fn has_untried(&self) -> bool {
        !self.untried.is_empty()
    }

    pub fn untried_actions(&self) -> &[A] {
        &self.untried
    }

    /// Pick an untried action uniformly at random, or nothing when all have
    /// been tried. Deterministic given the rng state; the action only moves
    /// out of the untried pool once an entry is created for it.
    pub fn next_untried_action(&self, rng: &mut ChaCha8Rng) -> Option<A> {
        if self.untried.is_empty() {
            return None;
        }
        let index = rng.gen_range(0..self.untried.len());
        Some(self.untried[index].clone())
    }

    /// Entry for a tried action; actions outside the mapping's space that
    /// were never tried yield nothing.
    pub fn get_entry(&self, action: &A) -> Option<&ActionEntry<A, O>> {
        self.entries.iter().find(|entry| entry.action == *action)
    }

    pub(crate) fn get_entry_mut(&mut self, action: &A) -> Option<&mut ActionEntry<A, O>> {
        self.entries.iter_mut().find(|entry| entry.action == *action)
    }

    /// Entry for an action, created (and moved out of the untried pool) on
    /// first use.
    pub(crate) fn get_or_create_entry(&mut self, action: &A) -> &mut ActionEntry<A, O> {
        if let Some(index) = self.entries.iter().position(|entry| entry.action == *action) {
            return &mut self.entries[index];
        }
        self.untried.retain(|candidate| candidate != action);
        self.entries.push(ActionEntry::new(action.clone()));
        let index = self.entries.len() - 1;
        &mut self.entries[index]
    }

    /// Add a sample to an action's statistics.
    pub fn update_entry(&mut self, action: &A, delta_q: f64, delta_visits: i64) {
        let entry = self.get_or_create_entry(action);
        entry.stats.update(delta_q, delta_visits);
        self.total_visits += delta_visits;
    }

    /// Argmax of mean q over visited entries; ties break to the lowest bin.
    pub fn best_action(&self) -> Option<&A> {
        self.entries
            .iter()
            .filter(|entry| entry.is_selectable())
            .max_by(|a, b| {
                a.stats
                    .mean_q
                    .total_cmp(&b.stats.mean_q)
                    .then_with(|| b.action.bin_number().cmp(&a.action.bin_number()))
            })
            .map(|entry| &entry.action)
    }

    /// UCB1 selection over tried entries; nothing iff no tried entry exists.
    pub fn ucb_action(&self, exploration_coefficient: f64) -> Option<&A> {
        if self.total_visits <= 0 {
            return None;
        }
        let log_total = (self.total_visits as f64).ln();
        self.entries
            .iter()
            .filter(|entry| entry.is_selectable())
            .max_by(|a, b| {
                let score_a = ucb_score(&a.stats, exploration_coefficient, log_total);
                let score_b = ucb_score(&b.stats, exploration_coefficient, log_total);
                score_a
                    .total_cmp(&score_b)
                    .then_with(|| b.action.bin_number().cmp(&a.action.bin_number()))
            })
            .map(|entry| &entry.action)
    }

    /// Mark an action's entry as pruned, excluding it from selection.
    pub fn prune_entry(&mut self, action: &A) {
        if let Some(entry) = self.get_entry_mut(action) {
            entry.status = ActionStatus::Pruned;
        }
    }

    /// Sum of per-action visits; the N of the UCB formula.
    pub fn total_visits(&self) -> i64 {
        self.total_visits
    }

    pub fn entries(&self) -> impl Iterator<Item = &ActionEntry<A, O>> + '_ {
        self.entries.iter()
    }

    pub(crate) fn entries_mut(&mut self) -> impl Iterator<Item = &mut ActionEntry<A, O>> + '_ {
        self.entries.iter_mut()
    }

    pub fn tried_count(&self) -> usize {
        self.entries.len()
    }
}

fn ucb_score(stats: &ActionStats, exploration_coefficient: f64, log_total: f64) -> f64 {
    stats.mean_q() + exploration_coefficient * (log_total / stats.visits() as f64).sqrt()
}
