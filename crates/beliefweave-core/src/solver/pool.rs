use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::solver::ids::StateId;
use crate::solver::model::PomdpState;

/// Fan-out of the spatial index before a node is split.
const NODE_CAPACITY: usize = 8;

/// Axis-aligned box in state-variable space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub lows: Vec<f64>,
    pub highs: Vec<f64>,
}

impl Region {
    pub fn new(lows: Vec<f64>, highs: Vec<f64>) -> Self {
        Region { lows, highs }
    }

    /// The unbounded region covering all of state-variable space.
    pub fn everything(dimensions: usize) -> Self {
        Region {
            lows: vec![f64::NEG_INFINITY; dimensions],
            highs: vec![f64::INFINITY; dimensions],
        }
    }

    /// A degenerate region covering exactly one point.
    pub fn point(point: &[f64]) -> Self {
        Region {
            lows: point.to_vec(),
            highs: point.to_vec(),
        }
    }

    pub fn contains(&self, point: &[f64]) -> bool {
        self.lows
            .iter()
            .zip(&self.highs)
            .zip(point)
            .all(|((low, high), value)| *low <= *value && *value <= *high)
    }

    pub fn intersects(&self, other: &Region) -> bool {
        self.lows
            .iter()
            .zip(&self.highs)
            .zip(other.lows.iter().zip(&other.highs))
            .all(|((low, high), (other_low, other_high))| *low <= *other_high && *other_low <= *high)
    }

    fn expand_to(&mut self, point: &[f64]) {
        for (index, value) in point.iter().enumerate() {
            if *value < self.lows[index] {
                self.lows[index] = *value;
            }
            if *value > self.highs[index] {
                self.highs[index] = *value;
            }
        }
    }

    fn merge(&mut self, other: &Region) {
        for index in 0..self.lows.len() {
            if other.lows[index] < self.lows[index] {
                self.lows[index] = other.lows[index];
            }
            if other.highs[index] > self.highs[index] {
                self.highs[index] = other.highs[index];
            }
        }
    }

    /// Growth in half-perimeter needed to absorb `point`.
    fn enlargement_for(&self, point: &[f64]) -> f64 {
        let mut enlargement = 0.0;
        for (index, value) in point.iter().enumerate() {
            if *value < self.lows[index] {
                enlargement += self.lows[index] - *value;
            }
            if *value > self.highs[index] {
                enlargement += *value - self.highs[index];
            }
        }
        enlargement
    }

    fn longest_axis(&self) -> usize {
        let mut axis = 0;
        let mut best = f64::NEG_INFINITY;
        for index in 0..self.lows.len() {
            let extent = self.highs[index] - self.lows[index];
            if extent > best {
                best = extent;
                axis = index;
            }
        }
        axis
    }

    fn center(&self, axis: usize) -> f64 {
        (self.lows[axis] + self.highs[axis]) / 2.0
    }
}

/// Bounding-volume index over canonicalized state vectors, supporting the
/// `states_within` query used by change propagation.
#[derive(Debug, Clone)]
struct RTree {
    root: Option<RTreeNode>,
}

#[derive(Debug, Clone)]
enum RTreeNode {
    Leaf {
        bounds: Region,
        entries: Vec<(StateId, Vec<f64>)>,
    },
    Branch {
        bounds: Region,
        children: Vec<RTreeNode>,
    },
}

impl RTree {
    fn new() -> Self {
        RTree { root: None }
    }

    fn insert(&mut self, id: StateId, point: &[f64]) {
        match self.root.take() {
            None => {
                self.root = Some(RTreeNode::Leaf {
                    bounds: Region::point(point),
                    entries: vec![(id, point.to_vec())],
                });
            }
            Some(mut node) => {
                if let Some(sibling) = node.insert(id, point) {
                    let mut bounds = node.bounds().clone();
                    bounds.merge(sibling.bounds());
                    node = RTreeNode::Branch {
                        bounds,
                        children: vec![node, sibling],
                    };
                }
                self.root = Some(node);
            }
        }
    }

    fn query(&self, region: &Region, hits: &mut Vec<StateId>) {
        if let Some(root) = &self.root {
            root.query(region, hits);
        }
    }
}

impl RTreeNode {
    fn bounds(&self) -> &Region {
        match self {
            RTreeNode::Leaf { bounds, .. } => bounds,
            RTreeNode::Branch { bounds, .. } => bounds,
        }
    }

    /// Insert a point; a `Some` return is the split-off sibling the caller
    /// must hang next to this node.
    fn insert(&mut self, id: StateId, point: &[f64]) -> Option<RTreeNode> {
        match self {
            RTreeNode::Leaf { bounds, entries } => {
                bounds.expand_to(point);
                entries.push((id, point.to_vec()));
                if entries.len() > NODE_CAPACITY {
                    Some(split_leaf(bounds, entries))
                } else {
                    None
                }
            }
            RTreeNode::Branch { bounds, children } => {
                bounds.expand_to(point);
                let mut chosen = 0;
                let mut best = f64::INFINITY;
                for (index, child) in children.iter().enumerate() {
                    let enlargement = child.bounds().enlargement_for(point);
                    if enlargement < best {
                        best = enlargement;
                        chosen = index;
                    }
                }
                if let Some(sibling) = children[chosen].insert(id, point) {
                    children.push(sibling);
                    if children.len() > NODE_CAPACITY {
                        return Some(split_branch(bounds, children));
                    }
                }
                None
            }
        }
    }

    fn query(&self, region: &Region, hits: &mut Vec<StateId>) {
        match self {
            RTreeNode::Leaf { bounds, entries } => {
                if !region.intersects(bounds) {
                    return;
                }
                for (id, point) in entries {
                    if region.contains(point) {
                        hits.push(*id);
                    }
                }
            }
            RTreeNode::Branch { bounds, children } => {
                if !region.intersects(bounds) {
                    return;
                }
                for child in children {
                    child.query(region, hits);
                }
            }
        }
    }
}

/// Split an overfull leaf on its longest axis; keeps the lower half in place
/// and returns the upper half.
fn split_leaf(bounds: &mut Region, entries: &mut Vec<(StateId, Vec<f64>)>) -> RTreeNode {
    let axis = bounds.longest_axis();
    entries.sort_by(|a, b| a.1[axis].total_cmp(&b.1[axis]));
    let upper = entries.split_off(entries.len() / 2);

    *bounds = Region::point(&entries[0].1);
    for (_, point) in entries.iter() {
        bounds.expand_to(point);
    }

    let mut upper_bounds = Region::point(&upper[0].1);
    for (_, point) in upper.iter() {
        upper_bounds.expand_to(point);
    }
    RTreeNode::Leaf {
        bounds: upper_bounds,
        entries: upper,
    }
}

fn split_branch(bounds: &mut Region, children: &mut Vec<RTreeNode>) -> RTreeNode {
    let axis = bounds.longest_axis();
    children.sort_by(|a, b| a.bounds().center(axis).total_cmp(&b.bounds().center(axis)));
    let upper = children.split_off(children.len() / 2);

    *bounds = children[0].bounds().clone();
    for child in children.iter() {
        bounds.merge(child.bounds());
    }

    let mut upper_bounds = upper[0].bounds().clone();
    for child in upper.iter() {
        upper_bounds.merge(child.bounds());
    }
    RTreeNode::Branch {
        bounds: upper_bounds,
        children: upper,
    }
}

/// Deduplicates states discovered during search, owns their storage, and
/// answers the spatial queries change propagation relies on.
#[derive(Debug, Clone)]
pub struct StatePool<S: PomdpState> {
    states: Vec<S>,
    vectors: Vec<Vec<f64>>,
    lookup: HashMap<S, StateId>,
    index: RTree,
}

impl<S: PomdpState> StatePool<S> {
    pub fn new() -> Self {
        StatePool {
            states: Vec::new(),
            vectors: Vec::new(),
            lookup: HashMap::new(),
            index: RTree::new(),
        }
    }

    /// Insert the state if needed and return its stable dense id.
    pub fn get_or_canonicalize(&mut self, state: S) -> StateId {
        if let Some(id) = self.lookup.get(&state) {
            return *id;
        }
        let vector = state.to_vector();
        let id = StateId::from(self.states.len());
        self.index.insert(id, &vector);
        self.lookup.insert(state.clone(), id);
        self.states.push(state);
        self.vectors.push(vector);
        id
    }

    pub fn state(&self, id: StateId) -> Option<&S> {
        self.states.get(id.index())
    }

    pub fn vector(&self, id: StateId) -> Option<&[f64]> {
        self.vectors.get(id.index()).map(|vector| vector.as_slice())
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Enumeration of all canonicalized states.
    pub fn states(&self) -> impl Iterator<Item = (StateId, &S)> + '_ {
        self.states
            .iter()
            .enumerate()
            .map(|(index, state)| (StateId::from(index), state))
    }

    /// Ids of all states whose variable vectors fall inside `region`.
    /// Queries never fail; an empty pool yields an empty result.
    pub fn states_within(&self, region: &Region) -> Vec<StateId> {
        let mut hits = Vec::new();
        self.index.query(region, &mut hits);
        hits
    }
}

impl<S: PomdpState> Default for StatePool<S> {
    fn default() -> Self {
        Self::new()
    }
}
