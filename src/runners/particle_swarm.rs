//! Particle swarm optimization with random-key encoding.
//!
//! Each particle holds one key in [0, 1] per stop; sorting stops by key
//! yields the tour, so every position decodes to a valid permutation.
//! Velocities follow the standard update
//! `v = w·v + c1·r1·(personal_best − x) + c2·r2·(global_best − x)`.

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
pub struct ParticleSwarmConfig {
    pub particles: usize,
    pub max_iterations: usize,
    pub inertia: f64,
    pub cognitive: f64,
    pub social: f64,
    pub max_velocity: f64,
    /// Trailing window for the convergence check.
    pub convergence_window: usize,
    /// Minimum best-cost improvement over the window to keep going.
    pub convergence_threshold: f64,
}

impl Default for ParticleSwarmConfig {
    fn default() -> Self {
        Self {
            particles: 30,
            max_iterations: 250,
            inertia: 0.729,
            cognitive: 1.49445,
            social: 1.49445,
            max_velocity: 0.5,
            convergence_window: 25,
            convergence_threshold: 1e-6,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParticleSwarmRunner {
    config: ParticleSwarmConfig,
    seed: Option<u64>,
}

impl ParticleSwarmRunner {
    pub fn new(config: ParticleSwarmConfig, seed: Option<u64>) -> Self {
        Self { config, seed }
    }
}

struct Particle {
    position: Vec<f64>,
    velocity: Vec<f64>,
    best_position: Vec<f64>,
    best_cost: f64,
}

impl RouteStrategy for ParticleSwarmRunner {
    fn algorithm(&self) -> Algorithm {
        Algorithm::ParticleSwarm
    }

    fn run(&self, problem: &OptimizationProblem, cancel: &Cancellation) -> Result<AlgorithmRun> {
        let evaluator = Evaluator::new(problem);
        let n = problem.len();
        if n < 2 {
            return Ok(trivial_run(&evaluator, Algorithm::ParticleSwarm));
        }

        let config = &self.config;
        let max_velocity = config.max_velocity.abs();
        let mut rng = rng_for(self.seed, Algorithm::ParticleSwarm);
        let mut recorder = RunRecorder::start(Algorithm::ParticleSwarm);

        let mut swarm = Vec::with_capacity(config.particles.max(1));
        swarm.push(encode(&nearest_neighbor_order(&problem.distance_matrix)));
        while swarm.len() < config.particles.max(1) {
            swarm.push((0..n).map(|_| rng.gen_range(0.0..1.0)).collect());
        }

        let mut particles: Vec<Particle> = swarm
            .into_iter()
            .map(|position| {
                let cost = evaluator.cost(&decode(&position));
                let velocity = (0..n)
                    .map(|_| rng.gen_range(-max_velocity..=max_velocity))
                    .collect();
                Particle {
                    best_position: position.clone(),
                    position,
                    velocity,
                    best_cost: cost,
                }
            })
            .collect();

        let mut global_best = particles
            .iter()
            .min_by(|a, b| a.best_cost.total_cmp(&b.best_cost))
            .map(|p| (p.best_position.clone(), p.best_cost))
            .unwrap_or_else(|| (vec![0.0; n], f64::INFINITY));
        recorder.record(global_best.1);

        let mut iteration = 0;
        while iteration < config.max_iterations {
            cancel.check()?;
            iteration += 1;

            for particle in particles.iter_mut() {
                for d in 0..n {
                    let r1: f64 = rng.gen_range(0.0..1.0);
                    let r2: f64 = rng.gen_range(0.0..1.0);
                    let velocity = config.inertia * particle.velocity[d]
                        + config.cognitive * r1 * (particle.best_position[d] - particle.position[d])
                        + config.social * r2 * (global_best.0[d] - particle.position[d]);
                    particle.velocity[d] = velocity.clamp(-max_velocity, max_velocity);
                    particle.position[d] = (particle.position[d] + particle.velocity[d]).clamp(0.0, 1.0);
                }

                let cost = evaluator.cost(&decode(&particle.position));
                if cost < particle.best_cost {
                    particle.best_cost = cost;
                    particle.best_position = particle.position.clone();
                }
                if cost < global_best.1 {
                    global_best = (particle.position.clone(), cost);
                }
            }

            recorder.record(global_best.1);
            if let Some(improvement) = recorder.recent_improvement(config.convergence_window) {
                if improvement < config.convergence_threshold {
                    break;
                }
            }
        }

        debug!(iteration, cost = global_best.1, "particle swarm search finished");
        Ok(recorder.finish(&evaluator, decode(&global_best.0), iteration))
    }
}

/// Stops sorted by ascending key; ties keep index order.
fn decode(keys: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..keys.len()).collect();
    order.sort_by(|a, b| keys[*a].total_cmp(&keys[*b]));
    order
}

/// Keys that decode back to `order`.
fn encode(order: &[usize]) -> Vec<f64> {
    let n = order.len();
    let mut keys = vec![0.0; n];
    for (rank, &stop) in order.iter().enumerate() {
        keys[stop] = (rank as f64 + 0.5) / n as f64;
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::is_valid_permutation;

    #[test]
    fn test_encode_decode_inverse() {
        let order = vec![3, 0, 4, 1, 2];
        assert_eq!(decode(&encode(&order)), order);
    }

    #[test]
    fn test_decode_ties_are_stable() {
        let keys = vec![0.5, 0.5, 0.1];
        assert_eq!(decode(&keys), vec![2, 0, 1]);
        assert!(is_valid_permutation(&decode(&keys), 3));
    }
}
