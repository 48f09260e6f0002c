//! Greedy tour construction.
//!
//! Nearest neighbour is the baseline every search cost is measured against,
//! the seed for annealing and the genetic population, the untrained fallback
//! for the learned runners, and the last resort when every runner fails.

use rand::Rng;
use rand::seq::SliceRandom;
use tracing::warn;

use crate::model::{Algorithm, RouteSolution};
use crate::objective::Evaluator;
use crate::problem::OptimizationProblem;

/// Builds a tour by always moving to the closest unvisited stop.
///
/// `distance_matrix` has the origin at index 0; the returned order contains
/// destination indices (matrix index minus one). Ties go to the lower index.
pub fn nearest_neighbor_order(distance_matrix: &[Vec<f64>]) -> Vec<usize> {
    let count = distance_matrix.len().saturating_sub(1);
    let mut visited = vec![false; count];
    let mut order = Vec::with_capacity(count);
    let mut current = 0;

    for _ in 0..count {
        let mut best: Option<(usize, f64)> = None;
        for candidate in 0..count {
            if visited[candidate] {
                continue;
            }
            let distance = distance_matrix[current][candidate + 1];
            if best.is_none_or(|(_, best_distance)| distance < best_distance) {
                best = Some((candidate, distance));
            }
        }

        if let Some((next, _)) = best {
            visited[next] = true;
            order.push(next);
            current = next + 1;
        }
    }

    order
}

/// Degraded result used when no runner produced a valid tour.
pub fn nearest_neighbor(problem: &OptimizationProblem) -> RouteSolution {
    warn!(stops = problem.len(), "falling back to nearest-neighbour construction");

    let evaluator = Evaluator::new(problem);
    let order = nearest_neighbor_order(&problem.distance_matrix);
    let mut solution = evaluator.solution(order, Algorithm::NearestNeighbor);
    solution.quality_score = 1.0 / evaluator.cost_of(&solution.metrics).max(f64::EPSILON);
    solution.fallback = true;
    solution
}

/// Uniformly shuffled permutation of `0..count`.
pub fn random_order<R: Rng>(count: usize, rng: &mut R) -> Vec<usize> {
    let mut order: Vec<usize> = (0..count).collect();
    order.shuffle(rng);
    order
}
