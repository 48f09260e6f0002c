//! Ant colony optimization.
//!
//! Ants start at the origin and pick the next stop with probability
//! proportional to `pheromone^alpha * (1 / distance)^beta`. After each
//! iteration pheromone evaporates and every ant deposits `deposit / cost` on
//! the edges it used, so cheaper tours reinforce their edges more.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::model::{Algorithm, AlgorithmRun};
use crate::objective::Evaluator;
use crate::problem::OptimizationProblem;
use crate::runners::{Cancellation, RouteStrategy, RunRecorder, rng_for, trivial_run};

/// Distances below this are treated as this, keeping the heuristic finite.
const MIN_DISTANCE_KM: f64 = 1e-3;
const MIN_PHEROMONE: f64 = 1e-12;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AntColonyConfig {
    pub ants: usize,
    pub max_iterations: usize,
    /// Pheromone importance.
    pub alpha: f64,
    /// Heuristic (inverse distance) importance.
    pub beta: f64,
    pub evaporation_rate: f64,
    pub deposit: f64,
    /// Stop after this many iterations without a better tour.
    pub stagnation_iterations: usize,
}

impl Default for AntColonyConfig {
    fn default() -> Self {
        Self {
            ants: 20,
            max_iterations: 150,
            alpha: 1.0,
            beta: 2.5,
            evaporation_rate: 0.1,
            deposit: 1.0,
            stagnation_iterations: 30,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AntColonyRunner {
    config: AntColonyConfig,
    seed: Option<u64>,
}

impl AntColonyRunner {
    pub fn new(config: AntColonyConfig, seed: Option<u64>) -> Self {
        Self { config, seed }
    }
}

impl RouteStrategy for AntColonyRunner {
    fn algorithm(&self) -> Algorithm {
        Algorithm::AntColony
    }

    fn run(&self, problem: &OptimizationProblem, cancel: &Cancellation) -> Result<AlgorithmRun> {
        let evaluator = Evaluator::new(problem);
        let n = problem.len();
        if n < 2 {
            return Ok(trivial_run(&evaluator, Algorithm::AntColony));
        }

        let config = &self.config;
        let size = n + 1;
        let mut rng = rng_for(self.seed, Algorithm::AntColony);
        let mut recorder = RunRecorder::start(Algorithm::AntColony);

        let mut pheromone = vec![vec![1.0 / size as f64; size]; size];
        let heuristic: Vec<Vec<f64>> = problem
            .distance_matrix
            .iter()
            .map(|row| {
                row.iter()
                    .map(|km| (1.0 / km.max(MIN_DISTANCE_KM)).powf(config.beta))
                    .collect()
            })
            .collect();

        let mut best_order: Vec<usize> = Vec::new();
        let mut best_cost = f64::INFINITY;
        let mut stagnant = 0;
        let mut iteration = 0;

        while iteration < config.max_iterations {
            cancel.check()?;
            iteration += 1;

            let mut tours = Vec::with_capacity(config.ants.max(1));
            for _ in 0..config.ants.max(1) {
                let order = construct_tour(&pheromone, &heuristic, config.alpha, &mut rng);
                let cost = evaluator.cost(&order);
                tours.push((order, cost));
            }

            let mut improved = false;
            for (order, cost) in &tours {
                if *cost < best_cost - 1e-12 {
                    best_cost = *cost;
                    best_order = order.clone();
                    improved = true;
                }
            }
            recorder.record(best_cost);

            for row in pheromone.iter_mut() {
                for value in row.iter_mut() {
                    *value = (*value * (1.0 - config.evaporation_rate)).max(MIN_PHEROMONE);
                }
            }
            for (order, cost) in &tours {
                let amount = config.deposit / cost.max(f64::EPSILON);
                let mut previous = 0;
                for &stop in order {
                    reinforce(&mut pheromone, previous, stop + 1, amount);
                    previous = stop + 1;
                }
                reinforce(&mut pheromone, previous, 0, amount);
            }

            if improved {
                stagnant = 0;
            } else {
                stagnant += 1;
                if stagnant >= config.stagnation_iterations {
                    break;
                }
            }
        }

        debug!(iteration, cost = best_cost, "ant colony search finished");
        Ok(recorder.finish(&evaluator, best_order, iteration))
    }
}

fn reinforce(pheromone: &mut [Vec<f64>], from: usize, to: usize, amount: f64) {
    pheromone[from][to] += amount;
    pheromone[to][from] += amount;
}

/// One ant's walk from the origin over every stop, never revisiting.
fn construct_tour<R: Rng>(
    pheromone: &[Vec<f64>],
    heuristic: &[Vec<f64>],
    alpha: f64,
    rng: &mut R,
) -> Vec<usize> {
    let count = pheromone.len() - 1;
    let mut visited = vec![false; count];
    let mut order = Vec::with_capacity(count);
    let mut current = 0;
    let mut weights = vec![0.0; count];

    for _ in 0..count {
        let mut total = 0.0;
        for stop in 0..count {
            weights[stop] = if visited[stop] {
                0.0
            } else {
                pheromone[current][stop + 1].powf(alpha) * heuristic[current][stop + 1]
            };
            total += weights[stop];
        }

        let next = if total > 0.0 && total.is_finite() {
            let mut target = rng.gen_range(0.0..total);
            let mut chosen = None;
            for stop in 0..count {
                if visited[stop] {
                    continue;
                }
                if target < weights[stop] {
                    chosen = Some(stop);
                    break;
                }
                target -= weights[stop];
                chosen = Some(stop);
            }
            chosen
        } else {
            (0..count).find(|stop| !visited[*stop])
        };

        if let Some(stop) = next {
            visited[stop] = true;
            order.push(stop);
            current = stop + 1;
        }
    }

    order
}
