use std::fmt;

use crate::solver::ids::BeliefId;

/// Error type for solver construction, search, and persistence operations.
#[derive(Debug, Clone, PartialEq)]
pub enum SolverError {
    /// An option was missing, out of range, or otherwise unusable.
    Configuration { message: String },
    /// The model broke its contract: non-finite reward, state dimension
    /// mismatch, or an empty action space.
    ModelContract { message: String },
    /// Replenishment could not reach the requested particle count within
    /// the attempt budget.
    ParticleDepletion {
        belief: BeliefId,
        produced: usize,
        wanted: usize,
    },
    /// An internal bookkeeping check failed; this indicates a bug.
    Invariant { message: String },
    /// A snapshot stream was malformed or truncated.
    Serialization { message: String },
}

impl SolverError {
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        SolverError::Configuration {
            message: message.into(),
        }
    }

    pub(crate) fn model_contract(message: impl Into<String>) -> Self {
        SolverError::ModelContract {
            message: message.into(),
        }
    }

    pub(crate) fn invariant(message: impl Into<String>) -> Self {
        SolverError::Invariant {
            message: message.into(),
        }
    }

    pub(crate) fn missing_belief(belief: BeliefId) -> Self {
        SolverError::Invariant {
            message: format!("missing belief node with id {}", belief.index()),
        }
    }
}

impl fmt::Display for SolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverError::Configuration { message } => {
                write!(f, "invalid solver configuration: {message}")
            }
            SolverError::ModelContract { message } => {
                write!(f, "model contract violation: {message}")
            }
            SolverError::ParticleDepletion {
                belief,
                produced,
                wanted,
            } => write!(
                f,
                "particle depletion at belief {}: produced {produced} of {wanted}",
                belief.index()
            ),
            SolverError::Invariant { message } => {
                write!(f, "solver invariant violated: {message}")
            }
            SolverError::Serialization { message } => {
                write!(f, "snapshot serialization failed: {message}")
            }
        }
    }
}

impl std::error::Error for SolverError {}
