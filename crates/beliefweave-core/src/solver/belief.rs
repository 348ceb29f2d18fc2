use std::collections::{HashSet, VecDeque};

use crate::solver::actions::ActionMapping;
use crate::solver::arena::Arena;
use crate::solver::error::SolverError;
use crate::solver::estimators::{BeliefEstimate, EstimationKind};
use crate::solver::history::HistoryStore;
use crate::solver::ids::{BeliefId, EntryRef};
use crate::solver::model::{PomdpAction, PomdpObservation};
use crate::solver::observations::ObservationMapping;

/// Non-owning link from a belief back to the mapping entry that owns it.
#[derive(Debug, Clone)]
pub struct ParentLink<A, O> {
    pub belief: BeliefId,
    pub action: A,
    pub observation: O,
}

/// The tree node reached by taking an action: just an observation mapping
/// partitioning what the model emitted next. Visit counts and q statistics
/// live in the owning action-mapping entry.
#[derive(Debug, Clone)]
pub struct ActionNode<O> {
    mapping: ObservationMapping<O>,
}

impl<O: PomdpObservation> ActionNode<O> {
    pub(crate) fn new() -> Self {
        ActionNode {
            mapping: ObservationMapping::new(),
        }
    }

    pub(crate) fn restore(mapping: ObservationMapping<O>) -> Self {
        ActionNode { mapping }
    }

    pub fn mapping(&self) -> &ObservationMapping<O> {
        &self.mapping
    }

    pub(crate) fn mapping_mut(&mut self) -> &mut ObservationMapping<O> {
        &mut self.mapping
    }
}

/// A decision node of the belief tree: an action mapping, the particle
/// multiset representing the belief, and a cached q-value estimate.
#[derive(Debug, Clone)]
pub struct BeliefNode<A, O> {
    id: BeliefId,
    depth: u64,
    parent: Option<ParentLink<A, O>>,
    mapping: ActionMapping<A, O>,
    particles: Vec<EntryRef>,
    starting_sequence_count: u64,
    /// Monotonic tick of the most recent particle registration.
    last_particle_tick: u64,
    estimate: BeliefEstimate<A>,
}

impl<A: PomdpAction, O: PomdpObservation> BeliefNode<A, O> {
    fn new(
        id: BeliefId,
        depth: u64,
        parent: Option<ParentLink<A, O>>,
        mapping: ActionMapping<A, O>,
    ) -> Self {
        BeliefNode {
            id,
            depth,
            parent,
            mapping,
            particles: Vec::new(),
            starting_sequence_count: 0,
            last_particle_tick: 0,
            estimate: BeliefEstimate::new(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn restore(
        id: BeliefId,
        depth: u64,
        parent: Option<ParentLink<A, O>>,
        mapping: ActionMapping<A, O>,
        particles: Vec<EntryRef>,
        starting_sequence_count: u64,
        last_particle_tick: u64,
    ) -> Self {
        BeliefNode {
            id,
            depth,
            parent,
            mapping,
            particles,
            starting_sequence_count,
            last_particle_tick,
            estimate: BeliefEstimate::new(),
        }
    }

    pub fn id(&self) -> BeliefId {
        self.id
    }

    pub fn depth(&self) -> u64 {
        self.depth
    }

    pub fn parent(&self) -> Option<&ParentLink<A, O>> {
        self.parent.as_ref()
    }

    pub fn mapping(&self) -> &ActionMapping<A, O> {
        &self.mapping
    }

    pub(crate) fn mapping_mut(&mut self) -> &mut ActionMapping<A, O> {
        &mut self.mapping
    }

    /// Ordered multiset of history-entry references forming this belief.
    pub fn particles(&self) -> &[EntryRef] {
        &self.particles
    }

    pub fn particle_count(&self) -> usize {
        self.particles.len()
    }

    /// Number of particles that begin their history sequence here.
    pub fn starting_sequence_count(&self) -> u64 {
        self.starting_sequence_count
    }

    pub fn last_particle_tick(&self) -> u64 {
        self.last_particle_tick
    }

    /// Direct child lookup through action then observation.
    pub fn get_child(&self, action: &A, observation: &O) -> Option<BeliefId> {
        self.mapping
            .get_entry(action)?
            .child()?
            .mapping()
            .get_belief(observation)
    }

    pub(crate) fn mark_estimate_dirty(&mut self) {
        self.estimate.mark_dirty();
    }

    /// Cached belief q-value; recalculated on demand after invalidation.
    pub fn q_value(&mut self, kind: EstimationKind) -> f64 {
        self.estimate.refresh(kind, &self.mapping);
        self.estimate.q_value()
    }

    /// Cached recommended action; recalculated on demand after invalidation.
    /// Nothing while no action has been visited.
    pub fn recommended_action(&mut self, kind: EstimationKind) -> Option<A> {
        self.estimate.refresh(kind, &self.mapping);
        self.estimate.recommended().cloned()
    }
}

/// Owns the belief-node arena and mediates child allocation, particle
/// bookkeeping, and re-rooting.
#[derive(Debug, Clone)]
pub struct BeliefTree<A, O> {
    nodes: Arena<BeliefId, BeliefNode<A, O>>,
    root: BeliefId,
    particle_ticks: u64,
}

impl<A: PomdpAction, O: PomdpObservation> BeliefTree<A, O> {
    /// Create a tree with a single root belief at depth 0.
    pub fn new(action_space: Vec<A>) -> Self {
        let mut nodes = Arena::new();
        let root = nodes.next_id();
        nodes.allocate(BeliefNode::new(
            root,
            0,
            None,
            ActionMapping::new(action_space),
        ));
        BeliefTree {
            nodes,
            root,
            particle_ticks: 0,
        }
    }

    pub(crate) fn restore(
        nodes: Arena<BeliefId, BeliefNode<A, O>>,
        root: BeliefId,
        particle_ticks: u64,
    ) -> Self {
        BeliefTree {
            nodes,
            root,
            particle_ticks,
        }
    }

    pub fn root_id(&self) -> BeliefId {
        self.root
    }

    /// Number of live belief nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn slot_count(&self) -> usize {
        self.nodes.slot_count()
    }

    pub(crate) fn particle_ticks(&self) -> u64 {
        self.particle_ticks
    }

    pub fn node(&self, id: BeliefId) -> Result<&BeliefNode<A, O>, SolverError> {
        self.nodes.get(id).ok_or_else(|| SolverError::missing_belief(id))
    }

    pub fn node_mut(&mut self, id: BeliefId) -> Result<&mut BeliefNode<A, O>, SolverError> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| SolverError::missing_belief(id))
    }

    pub fn contains(&self, id: BeliefId) -> bool {
        self.nodes.contains(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (BeliefId, &BeliefNode<A, O>)> + '_ {
        self.nodes.iter()
    }

    pub(crate) fn iter_mut(
        &mut self,
    ) -> impl Iterator<Item = (BeliefId, &mut BeliefNode<A, O>)> + '_ {
        self.nodes.iter_mut()
    }

    /// Resolve or create the child belief reached by `action` then
    /// `observation`. The bool is true when the child was just created.
    pub fn create_or_get_child(
        &mut self,
        belief: BeliefId,
        action: &A,
        observation: &O,
        action_space: &[A],
    ) -> Result<(BeliefId, bool), SolverError> {
        let (existing, parent_depth) = {
            let node = self.node(belief)?;
            (node.get_child(action, observation), node.depth)
        };
        if let Some(child) = existing {
            return Ok((child, false));
        }

        let child_id = self.nodes.next_id();
        self.nodes.allocate(BeliefNode::new(
            child_id,
            parent_depth + 1,
            Some(ParentLink {
                belief,
                action: action.clone(),
                observation: observation.clone(),
            }),
            ActionMapping::new(action_space.to_vec()),
        ));

        let node = self.node_mut(belief)?;
        let entry = node.mapping.get_or_create_entry(action);
        entry
            .child_or_create()
            .mapping_mut()
            .insert_entry(observation.clone(), child_id);
        Ok((child_id, true))
    }

    /// Register a history entry as a particle of a belief.
    pub(crate) fn register_particle(
        &mut self,
        belief: BeliefId,
        entry_ref: EntryRef,
    ) -> Result<(), SolverError> {
        self.particle_ticks += 1;
        let tick = self.particle_ticks;
        let node = self.node_mut(belief)?;
        node.particles.push(entry_ref);
        node.last_particle_tick = tick;
        if entry_ref.is_sequence_start() {
            node.starting_sequence_count += 1;
        }
        Ok(())
    }

    /// Detach a history entry from a belief's particle multiset.
    pub(crate) fn deregister_particle(
        &mut self,
        belief: BeliefId,
        entry_ref: EntryRef,
    ) -> Result<(), SolverError> {
        let node = self.node_mut(belief)?;
        if let Some(position) = node.particles.iter().position(|p| *p == entry_ref) {
            node.particles.remove(position);
            if entry_ref.is_sequence_start() && node.starting_sequence_count > 0 {
                node.starting_sequence_count -= 1;
            }
        }
        Ok(())
    }

    /// All belief ids reachable from `from`, in breadth-first order.
    pub fn subtree_ids(&self, from: BeliefId) -> Vec<BeliefId> {
        let mut order = Vec::new();
        let mut queue = VecDeque::from([from]);
        let mut seen = HashSet::from([from]);
        while let Some(id) = queue.pop_front() {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            order.push(id);
            for entry in node.mapping.entries() {
                let Some(child_node) = entry.child() else {
                    continue;
                };
                for obs_entry in child_node.mapping().entries() {
                    if seen.insert(obs_entry.child()) {
                        queue.push_back(obs_entry.child());
                    }
                }
            }
        }
        order
    }

    /// Re-root the tree at `new_root`: delete every belief outside its
    /// subtree, clear its parent link, and rebase depths so the new root sits
    /// at 0. Stable ids on the surviving subtree are preserved. Returns the
    /// particle refs of all deleted beliefs so the caller can clear their
    /// history back references.
    pub(crate) fn prune_for_advance(
        &mut self,
        new_root: BeliefId,
    ) -> Result<Vec<EntryRef>, SolverError> {
        if !self.contains(new_root) {
            return Err(SolverError::missing_belief(new_root));
        }
        let surviving: HashSet<BeliefId> = self.subtree_ids(new_root).into_iter().collect();
        let doomed: Vec<BeliefId> = self
            .nodes
            .iter()
            .map(|(id, _)| id)
            .filter(|id| !surviving.contains(id))
            .collect();

        let mut detached = Vec::new();
        for id in doomed {
            if let Some(node) = self.nodes.remove(id) {
                detached.extend(node.particles);
            }
        }

        self.root = new_root;
        let root_node = self.node_mut(new_root)?;
        root_node.parent = None;

        // Rebase depths below the new root.
        let mut queue = VecDeque::from([(new_root, 0_u64)]);
        while let Some((id, depth)) = queue.pop_front() {
            let node = self.node_mut(id)?;
            node.depth = depth;
            let children: Vec<BeliefId> = node
                .mapping
                .entries()
                .filter_map(|entry| entry.child())
                .flat_map(|child| child.mapping().entries().map(|e| e.child()))
                .collect();
            for child in children {
                queue.push_back((child, depth + 1));
            }
        }
        Ok(detached)
    }

    /// Verify the structural invariants of the tree against the history
    /// store: particle-belief linkage, visit-count consistency between
    /// action entries and their observation mappings, outgoing-simulation
    /// accounting, and mean-q arithmetic.
    pub fn check_invariants(
        &self,
        history: &HistoryStore<A, O>,
    ) -> Result<(), SolverError> {
        for (id, node) in self.nodes.iter() {
            if node.id != id {
                return Err(SolverError::invariant(format!(
                    "belief {} stores id {}",
                    id.index(),
                    node.id.index()
                )));
            }
            match &node.parent {
                None => {
                    if id != self.root {
                        return Err(SolverError::invariant(format!(
                            "non-root belief {} has no parent",
                            id.index()
                        )));
                    }
                    if node.depth != 0 {
                        return Err(SolverError::invariant("root depth is not 0"));
                    }
                }
                Some(link) => {
                    let parent = self.node(link.belief)?;
                    if node.depth != parent.depth + 1 {
                        return Err(SolverError::invariant(format!(
                            "belief {} depth {} does not follow parent depth {}",
                            id.index(),
                            node.depth,
                            parent.depth
                        )));
                    }
                    if parent.get_child(&link.action, &link.observation) != Some(id) {
                        return Err(SolverError::invariant(format!(
                            "belief {} is not linked from its parent entry",
                            id.index()
                        )));
                    }
                }
            }

            let mut outgoing = 0_i64;
            let mut starts = 0_u64;
            for particle in &node.particles {
                let entry = history.entry(*particle).ok_or_else(|| {
                    SolverError::invariant(format!(
                        "belief {} holds a dangling particle",
                        id.index()
                    ))
                })?;
                if entry.belief() != Some(id) {
                    return Err(SolverError::invariant(format!(
                        "particle of belief {} points back to {:?}",
                        id.index(),
                        entry.belief()
                    )));
                }
                if entry.has_step() {
                    outgoing += 1;
                }
                if particle.is_sequence_start() {
                    starts += 1;
                }
            }
            if starts != node.starting_sequence_count {
                return Err(SolverError::invariant(format!(
                    "belief {} counts {} starting sequences but holds {}",
                    id.index(),
                    node.starting_sequence_count,
                    starts
                )));
            }
            if node.mapping.total_visits() != outgoing {
                return Err(SolverError::invariant(format!(
                    "belief {} records {} visits for {} outgoing simulations",
                    id.index(),
                    node.mapping.total_visits(),
                    outgoing
                )));
            }

            let mut entry_visit_sum = 0_i64;
            for entry in node.mapping.entries() {
                let stats = entry.stats();
                entry_visit_sum += stats.visits();
                if stats.visits() > 0 {
                    let expected = stats.total_q() / stats.visits() as f64;
                    if (stats.mean_q() - expected).abs() > 1e-9 {
                        return Err(SolverError::invariant(format!(
                            "belief {} action {:?} mean q drifted from total/visits",
                            id.index(),
                            entry.action()
                        )));
                    }
                }
                if let Some(child) = entry.child() {
                    if child.mapping().total_visits() != stats.visits() {
                        return Err(SolverError::invariant(format!(
                            "belief {} action {:?} visits {} != observation visits {}",
                            id.index(),
                            entry.action(),
                            stats.visits(),
                            child.mapping().total_visits()
                        )));
                    }
                }
            }
            if entry_visit_sum != node.mapping.total_visits() {
                return Err(SolverError::invariant(format!(
                    "belief {} mapping total {} != entry sum {}",
                    id.index(),
                    node.mapping.total_visits(),
                    entry_visit_sum
                )));
            }
        }
        Ok(())
    }
}
