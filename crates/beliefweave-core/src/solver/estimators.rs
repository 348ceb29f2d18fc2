use serde::{Deserialize, Serialize};

use crate::solver::actions::{ActionMapping, ActionStatus};
use crate::solver::model::{PomdpAction, PomdpObservation};

/// Strategy for estimating a belief's q-value from its action mapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimationKind {
    /// The belief's value is the maximum child mean q; the recommendation is
    /// the action achieving it.
    #[default]
    MaxMeanQ,
    /// The belief's value is the visit-weighted average of child q-values;
    /// the recommendation is the most-visited action.
    Robust,
}

/// Cached belief q-value and recommended action. Invalidation is explicit;
/// recomputation happens lazily on the next read.
#[derive(Debug, Clone)]
pub struct BeliefEstimate<A> {
    q_value: f64,
    recommended: Option<A>,
    dirty: bool,
}

impl<A: PomdpAction> BeliefEstimate<A> {
    pub(crate) fn new() -> Self {
        BeliefEstimate {
            q_value: 0.0,
            recommended: None,
            dirty: true,
        }
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn refresh<O: PomdpObservation>(
        &mut self,
        kind: EstimationKind,
        mapping: &ActionMapping<A, O>,
    ) {
        if !self.dirty {
            return;
        }
        let (q_value, recommended) = recalculate(kind, mapping);
        self.q_value = q_value;
        self.recommended = recommended;
        self.dirty = false;
    }

    pub(crate) fn q_value(&self) -> f64 {
        self.q_value
    }

    pub(crate) fn recommended(&self) -> Option<&A> {
        self.recommended.as_ref()
    }
}

/// Recompute (q-value, recommended action) for a mapping under a strategy.
fn recalculate<A: PomdpAction, O: PomdpObservation>(
    kind: EstimationKind,
    mapping: &ActionMapping<A, O>,
) -> (f64, Option<A>) {
    match kind {
        EstimationKind::MaxMeanQ => {
            let best = mapping.best_action().cloned();
            let q_value = best
                .as_ref()
                .and_then(|action| mapping.get_entry(action))
                .map(|entry| entry.stats().mean_q())
                .unwrap_or(0.0);
            (q_value, best)
        }
        EstimationKind::Robust => {
            let mut total_q = 0.0;
            let mut total_visits = 0_i64;
            let mut robust: Option<(A, i64)> = None;
            for entry in mapping.entries() {
                if entry.status() != ActionStatus::Tried || entry.stats().visits() <= 0 {
                    continue;
                }
                total_q += entry.stats().total_q();
                total_visits += entry.stats().visits();
                let better = match &robust {
                    Some((incumbent, visits)) => {
                        entry.stats().visits() > *visits
                            || (entry.stats().visits() == *visits
                                && entry.action().bin_number() < incumbent.bin_number())
                    }
                    None => true,
                };
                if better {
                    robust = Some((entry.action().clone(), entry.stats().visits()));
                }
            }
            let q_value = if total_visits > 0 {
                total_q / total_visits as f64
            } else {
                0.0
            };
            (q_value, robust.map(|(action, _)| action))
        }
    }
}
