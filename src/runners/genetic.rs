//! Genetic algorithm over stop permutations.
//!
//! Tournament selection, order crossover (OX), pairwise swap mutation and
//! elitism. The nearest-neighbour tour seeds the initial population, so the
//! result is never worse than the greedy baseline.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::construction::{nearest_neighbor_order, random_order};
use crate::error::Result;
use crate::model::{Algorithm, AlgorithmRun};
use crate::objective::Evaluator;
use crate::problem::OptimizationProblem;
use crate::runners::{Cancellation, RouteStrategy, RunRecorder, rng_for, trivial_run};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneticConfig {
    pub population_size: usize,
    pub max_generations: usize,
    /// Stop after this many generations without improvement of the best tour.
    pub stagnation_generations: usize,
    pub tournament_size: usize,
    pub crossover_rate: f64,
    /// Probability that a child gets one random pairwise swap.
    pub mutation_rate: f64,
    /// Share of the population copied unmodified into the next generation.
    pub elite_fraction: f64,
}

impl Default for GeneticConfig {
    fn default() -> Self {
        Self {
            population_size: 200,
            max_generations: 400,
            stagnation_generations: 60,
            tournament_size: 3,
            crossover_rate: 0.9,
            mutation_rate: 0.2,
            elite_fraction: 0.1,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GeneticRunner {
    config: GeneticConfig,
    seed: Option<u64>,
}

#[derive(Debug, Clone)]
struct Individual {
    order: Vec<usize>,
    cost: f64,
}

impl Individual {
    fn new(order: Vec<usize>, evaluator: &Evaluator<'_>) -> Self {
        let cost = evaluator.cost(&order);
        Self { order, cost }
    }

    /// Weighted inverse of the objective cost.
    fn fitness(&self) -> f64 {
        1.0 / (self.cost + f64::EPSILON)
    }
}

impl GeneticRunner {
    pub fn new(config: GeneticConfig, seed: Option<u64>) -> Self {
        Self { config, seed }
    }
}

impl RouteStrategy for GeneticRunner {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Genetic
    }

    fn run(&self, problem: &OptimizationProblem, cancel: &Cancellation) -> Result<AlgorithmRun> {
        let evaluator = Evaluator::new(problem);
        let n = problem.len();
        if n < 2 {
            return Ok(trivial_run(&evaluator, Algorithm::Genetic));
        }

        let config = &self.config;
        let population_size = config.population_size.max(2);
        let elite_count = ((population_size as f64 * config.elite_fraction).ceil() as usize)
            .clamp(1, population_size);
        let mut rng = rng_for(self.seed, Algorithm::Genetic);
        let mut recorder = RunRecorder::start(Algorithm::Genetic);

        let mut population = Vec::with_capacity(population_size);
        population.push(Individual::new(nearest_neighbor_order(&problem.distance_matrix), &evaluator));
        while population.len() < population_size {
            population.push(Individual::new(random_order(n, &mut rng), &evaluator));
        }
        sort_by_cost(&mut population);
        recorder.record(population[0].cost);

        let mut stagnant = 0;
        let mut generation = 0;
        while generation < config.max_generations {
            cancel.check()?;
            generation += 1;

            let mut next: Vec<Individual> = population[..elite_count].to_vec();
            while next.len() < population_size {
                let first = tournament(&population, config.tournament_size, &mut rng);
                let second = tournament(&population, config.tournament_size, &mut rng);

                let mut child = if rng.gen_bool(config.crossover_rate.clamp(0.0, 1.0)) {
                    order_crossover(&population[first].order, &population[second].order, &mut rng)
                } else {
                    population[first].order.clone()
                };
                if rng.gen_bool(config.mutation_rate.clamp(0.0, 1.0)) {
                    swap_mutation(&mut child, &mut rng);
                }
                next.push(Individual::new(child, &evaluator));
            }

            population = next;
            sort_by_cost(&mut population);
            let previous_best = recorder.best().unwrap_or(f64::INFINITY);
            recorder.record(population[0].cost);

            if population[0].cost < previous_best - 1e-12 {
                stagnant = 0;
            } else {
                stagnant += 1;
                if stagnant >= config.stagnation_generations {
                    break;
                }
            }
        }

        debug!(generation, cost = population[0].cost, "genetic search finished");
        let best = population.swap_remove(0);
        Ok(recorder.finish(&evaluator, best.order, generation))
    }
}

fn sort_by_cost(population: &mut [Individual]) {
    population.sort_by(|a, b| a.cost.total_cmp(&b.cost));
}

/// Tournament selection: pick `k` individuals at random, return the fittest.
fn tournament<R: Rng>(population: &[Individual], k: usize, rng: &mut R) -> usize {
    let mut best = rng.gen_range(0..population.len());
    for _ in 1..k.max(1) {
        let candidate = rng.gen_range(0..population.len());
        if population[candidate].fitness() > population[best].fitness() {
            best = candidate;
        }
    }
    best
}

/// Order crossover: keep a random segment of `template`, fill the remaining
/// positions with the missing stops in the order they appear in `donor`.
fn order_crossover<R: Rng>(template: &[usize], donor: &[usize], rng: &mut R) -> Vec<usize> {
    let n = template.len();
    let mut start = rng.gen_range(0..n);
    let mut end = rng.gen_range(0..n);
    if start > end {
        std::mem::swap(&mut start, &mut end);
    }

    let mut child = vec![usize::MAX; n];
    let mut in_segment = vec![false; n];
    for i in start..=end {
        child[i] = template[i];
        in_segment[template[i]] = true;
    }

    let mut position = (end + 1) % n;
    for offset in 0..n {
        let stop = donor[(end + 1 + offset) % n];
        if !in_segment[stop] {
            child[position] = stop;
            position = (position + 1) % n;
        }
    }

    child
}

fn swap_mutation<R: Rng>(order: &mut [usize], rng: &mut R) {
    let i = rng.gen_range(0..order.len());
    let j = rng.gen_range(0..order.len());
    order.swap(i, j);
}
