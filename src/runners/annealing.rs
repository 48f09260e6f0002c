//! Simulated annealing from the nearest-neighbour tour.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::construction::nearest_neighbor_order;
use crate::error::Result;
use crate::model::{Algorithm, AlgorithmRun};
use crate::objective::Evaluator;
use crate::problem::OptimizationProblem;
use crate::runners::{Cancellation, RouteStrategy, RunRecorder, rng_for, trivial_run};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnealingConfig {
    /// Costs are relative to the greedy baseline (≈1.0), so temperatures are small.
    pub initial_temperature: f64,
    /// Geometric factor applied after every iteration.
    pub cooling_rate: f64,
    pub min_temperature: f64,
    pub max_iterations: usize,
    /// Best cost is recorded in the history every this many iterations.
    pub history_interval: usize,
}

impl Default for AnnealingConfig {
    fn default() -> Self {
        Self {
            initial_temperature: 0.05,
            cooling_rate: 0.9985,
            min_temperature: 1e-5,
            max_iterations: 20_000,
            history_interval: 50,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AnnealingRunner {
    config: AnnealingConfig,
    seed: Option<u64>,
}

impl AnnealingRunner {
    pub fn new(config: AnnealingConfig, seed: Option<u64>) -> Self {
        Self { config, seed }
    }
}

impl RouteStrategy for AnnealingRunner {
    fn algorithm(&self) -> Algorithm {
        Algorithm::SimulatedAnnealing
    }

    fn run(&self, problem: &OptimizationProblem, cancel: &Cancellation) -> Result<AlgorithmRun> {
        let evaluator = Evaluator::new(problem);
        let n = problem.len();
        if n < 2 {
            return Ok(trivial_run(&evaluator, Algorithm::SimulatedAnnealing));
        }

        let config = &self.config;
        let history_interval = config.history_interval.max(1);
        let mut rng = rng_for(self.seed, Algorithm::SimulatedAnnealing);
        let mut recorder = RunRecorder::start(Algorithm::SimulatedAnnealing);

        let mut current = nearest_neighbor_order(&problem.distance_matrix);
        let mut current_cost = evaluator.cost(&current);
        let mut best = current.clone();
        let mut best_cost = current_cost;
        recorder.record(best_cost);

        let mut temperature = config.initial_temperature;
        let mut iteration = 0;
        while temperature > config.min_temperature && iteration < config.max_iterations {
            if iteration % history_interval == 0 {
                cancel.check()?;
            }
            iteration += 1;

            let i = rng.gen_range(0..n);
            let mut j = rng.gen_range(0..n - 1);
            if j >= i {
                j += 1;
            }
            current.swap(i, j);
            let neighbor_cost = evaluator.cost(&current);

            // Strict improvements are always taken; worse moves by the Metropolis rule.
            let accept = neighbor_cost < current_cost
                || (temperature > 0.0
                    && rng.gen_range(0.0..1.0) < ((current_cost - neighbor_cost) / temperature).exp());

            if accept {
                current_cost = neighbor_cost;
                if current_cost < best_cost {
                    best_cost = current_cost;
                    best.clone_from(&current);
                }
            } else {
                current.swap(i, j);
            }

            if iteration % history_interval == 0 {
                recorder.record(best_cost);
            }
            temperature *= config.cooling_rate;
        }
        recorder.record(best_cost);

        debug!(iteration, temperature, cost = best_cost, "annealing finished");
        Ok(recorder.finish(&evaluator, best, iteration))
    }
}
