//! Aggregated optimizer configuration.

use serde::{Deserialize, Serialize};

use crate::conditions::EnrichmentConfig;
use crate::ensemble::EnsembleConfig;
use crate::error::Result;
use crate::history::LearningConfig;
use crate::monitor::MonitorConfig;
use crate::problem::ProblemConfig;
use crate::runners::{AnnealingConfig, AntColonyConfig, GeneticConfig, LearnedConfig, ParticleSwarmConfig};

/// Every tunable of the pipeline. Missing JSON fields keep their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Makes every stochastic runner reproducible.
    pub seed: Option<u64>,
    pub problem: ProblemConfig,
    pub genetic: GeneticConfig,
    pub ant_colony: AntColonyConfig,
    pub particle_swarm: ParticleSwarmConfig,
    pub annealing: AnnealingConfig,
    pub learned: LearnedConfig,
    pub ensemble: EnsembleConfig,
    pub enrichment: EnrichmentConfig,
    pub learning: LearningConfig,
    pub monitor: MonitorConfig,
}

impl OptimizerConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
