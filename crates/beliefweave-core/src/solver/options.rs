use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::solver::error::SolverError;

const DEFAULT_OPTIONS_YAML: &str = include_str!("../../config/solver.default.yaml");

/// How the value of a fresh leaf belief is seeded before backpropagation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeuristicType {
    /// Ask the model for a bootstrap value.
    #[default]
    Model,
    /// Estimate by a discounted rollout using the model's rollout action.
    Rollout,
    /// Seed with zero.
    Zero,
}

/// Solver configuration record. Unknown fields are rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct SolverOptions {
    pub discount_factor: f64,
    /// Beliefs below this particle count are replenished after re-rooting.
    pub min_particle_count: u64,
    /// Particle count the initial root belief is seeded with.
    pub max_particle_count: u64,
    /// Maximum belief depth a simulation may reach below the current root.
    pub horizon: u64,
    pub exploration_coefficient: f64,
    pub heuristic_type: HeuristicType,
    /// Wall-clock budget for `improve`, in milliseconds; 0 leaves time unlimited.
    pub search_budget_ms: u64,
    /// Simulation-count budget for `improve`; 0 leaves the count unlimited.
    pub search_budget_iterations: u64,
    pub rng_seed: u64,
    pub serializer_path: Option<String>,
    /// Attempt bound for rejection sampling during particle replenishment.
    pub max_replenish_attempts: u64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        SolverOptions {
            discount_factor: 0.95,
            min_particle_count: 100,
            max_particle_count: 200,
            horizon: 100,
            exploration_coefficient: 1.0,
            heuristic_type: HeuristicType::Model,
            search_budget_ms: 1000,
            search_budget_iterations: 0,
            rng_seed: 0,
            serializer_path: None,
            max_replenish_attempts: 1000,
        }
    }
}

impl SolverOptions {
    /// Parse options from YAML text.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, SolverError> {
        let options: SolverOptions = serde_yaml::from_str(yaml)
            .map_err(|err| SolverError::configuration(format!("failed to parse YAML: {err}")))?;
        options.validate()?;
        Ok(options)
    }

    /// Parse options from a YAML file path.
    pub fn from_yaml_path(path: impl AsRef<Path>) -> Result<Self, SolverError> {
        let yaml = fs::read_to_string(path)
            .map_err(|err| SolverError::configuration(format!("failed to read file: {err}")))?;
        Self::from_yaml_str(&yaml)
    }

    /// Return the default YAML config included with this crate.
    pub fn default_yaml() -> &'static str {
        DEFAULT_OPTIONS_YAML
    }

    /// Parse the default YAML config included with this crate.
    pub fn from_default_yaml() -> Result<Self, SolverError> {
        Self::from_yaml_str(Self::default_yaml())
    }

    pub fn validate(&self) -> Result<(), SolverError> {
        if !self.discount_factor.is_finite()
            || self.discount_factor <= 0.0
            || self.discount_factor > 1.0
        {
            return Err(SolverError::configuration(
                "discountFactor must be in (0, 1]",
            ));
        }
        if self.min_particle_count == 0 {
            return Err(SolverError::configuration(
                "minParticleCount must be greater than 0",
            ));
        }
        if self.max_particle_count < self.min_particle_count {
            return Err(SolverError::configuration(
                "maxParticleCount must be at least minParticleCount",
            ));
        }
        if self.horizon == 0 {
            return Err(SolverError::configuration("horizon must be greater than 0"));
        }
        if !self.exploration_coefficient.is_finite() || self.exploration_coefficient < 0.0 {
            return Err(SolverError::configuration(
                "explorationCoefficient must be finite and >= 0",
            ));
        }
        if self.max_replenish_attempts == 0 {
            return Err(SolverError::configuration(
                "maxReplenishAttempts must be greater than 0",
            ));
        }
        Ok(())
    }
}
