mod solver;

pub use solver::belief::{ActionNode, BeliefNode, BeliefTree, ParentLink};
pub use solver::corrector::{DefaultHistoryCorrector, HistoryCorrector};
pub use solver::error::SolverError;
pub use solver::estimators::EstimationKind;
pub use solver::history::{HistoryEntry, HistorySequence, HistoryStore};
pub use solver::ids::{BeliefId, EntryRef, SequenceId, StateId};
pub use solver::model::{PomdpAction, PomdpModel, PomdpObservation, PomdpState, StepResult};
pub use solver::observations::{ObservationEntry, ObservationMapping};
pub use solver::options::{HeuristicType, SolverOptions};
pub use solver::pool::{Region, StatePool};
pub use solver::snapshot::{
    ActionEntrySnapshot, BeliefSnapshot, EntrySnapshot, ObservationEntrySnapshot, ParentSnapshot,
    SequenceSnapshot, SolverSnapshot,
};
pub use solver::solve::{SearchBudget, Solver};
pub use solver::stepper::{StepChoice, StepContext, StepGenerator, UcbStepGenerator};
pub use solver::{ActionEntry, ActionMapping, ActionStats, ActionStatus};
