//! Hybrid ensemble: recombines the strongest runs and polishes the result.
//!
//! The hybrid starts from the cheapest input tour and only ever accepts
//! cheaper tours, so it is never worse than its best input.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::local_search::{self, LocalSearchConfig};
use crate::model::{Algorithm, AlgorithmRun};
use crate::objective::Evaluator;
use crate::problem::OptimizationProblem;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    /// How many of the cheapest runs donate segments.
    pub top_runs: usize,
    /// Longest donated segment, as a share of the tour.
    pub max_segment_fraction: f64,
    pub local_search: LocalSearchConfig,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            top_runs: 3,
            max_segment_fraction: 0.5,
            local_search: LocalSearchConfig::default(),
        }
    }
}

/// Builds the `hybrid_ensemble` run from the surviving runner outputs.
///
/// Returns `None` when there is nothing to combine.
pub fn combine(
    problem: &OptimizationProblem,
    runs: &[AlgorithmRun],
    config: &EnsembleConfig,
) -> Option<AlgorithmRun> {
    let started = Instant::now();
    let evaluator = Evaluator::new(problem);

    let mut ranked: Vec<(&AlgorithmRun, f64)> = runs
        .iter()
        .map(|run| (run, evaluator.cost(&run.solution.order)))
        .collect();
    ranked.sort_by(|a, b| {
        a.1.total_cmp(&b.1)
            .then(a.0.algorithm.priority().cmp(&b.0.algorithm.priority()))
    });

    let (best_run, best_cost) = ranked.first().copied()?;
    let mut order = best_run.solution.order.clone();
    let mut cost = best_cost;
    let mut history = vec![cost];
    let mut steps = 0;

    let n = order.len();
    let max_segment = ((n as f64 * config.max_segment_fraction).floor() as usize).max(2);
    for (donor, _) in ranked.iter().skip(1).take(config.top_runs.saturating_sub(1)) {
        if n < 3 {
            break;
        }
        if let Some(segment) = strongest_segment(problem, &donor.solution.order, max_segment) {
            steps += 1;
            let candidate = splice(problem, &order, &segment);
            let candidate_cost = evaluator.cost(&candidate);
            if candidate_cost < cost {
                debug!(donor = %donor.algorithm, len = segment.len(), "spliced donor segment");
                order = candidate;
                cost = candidate_cost;
            }
            history.push(cost);
        }
    }

    let polished = local_search::improve(&mut order, &evaluator, &config.local_search);
    if polished < cost {
        cost = polished;
    }
    history.push(cost);

    Some(AlgorithmRun {
        algorithm: Algorithm::HybridEnsemble,
        solution: evaluator.solution(order, Algorithm::HybridEnsemble),
        convergence_history: history,
        iterations_used: steps + 1,
        wall_clock_ms: started.elapsed().as_millis() as u64,
        heuristic_fallback: false,
    })
}

/// The contiguous sub-tour with the shortest mean edge length, of length
/// between 2 and `max_len`.
fn strongest_segment(problem: &OptimizationProblem, order: &[usize], max_len: usize) -> Option<Vec<usize>> {
    let n = order.len();
    let max_len = max_len.min(n.saturating_sub(1));
    let mut best: Option<(usize, usize, f64)> = None;

    for len in 2..=max_len {
        for start in 0..=(n - len) {
            let span: f64 = order[start..start + len]
                .windows(2)
                .map(|pair| problem.distance_matrix[pair[0] + 1][pair[1] + 1])
                .sum();
            let mean = span / (len - 1) as f64;
            // Prefer longer segments when they are just as tight.
            let better = match best {
                None => true,
                Some((_, best_len, best_mean)) => {
                    mean < best_mean - 1e-12 || (mean <= best_mean + 1e-12 && len > best_len)
                }
            };
            if better {
                best = Some((start, len, mean));
            }
        }
    }

    best.map(|(start, len, _)| order[start..start + len].to_vec())
}

/// Removes the segment's stops from `base` and reinserts the segment, in
/// donor order, at its cheapest insertion point.
fn splice(problem: &OptimizationProblem, base: &[usize], segment: &[usize]) -> Vec<usize> {
    let mut in_segment = vec![false; base.len()];
    for &stop in segment {
        in_segment[stop] = true;
    }
    let rest: Vec<usize> = base.iter().copied().filter(|stop| !in_segment[*stop]).collect();

    let (Some(&first), Some(&last)) = (segment.first(), segment.last()) else {
        return base.to_vec();
    };
    let distance = |a: usize, b: usize| problem.distance_matrix[a][b];

    let mut best_position = 0;
    let mut best_delta = f64::INFINITY;
    for position in 0..=rest.len() {
        let before = if position == 0 { 0 } else { rest[position - 1] + 1 };
        let after = if position == rest.len() { 0 } else { rest[position] + 1 };
        let delta = distance(before, first + 1) + distance(last + 1, after) - distance(before, after);
        if delta < best_delta {
            best_delta = delta;
            best_position = position;
        }
    }

    let mut spliced = Vec::with_capacity(base.len());
    spliced.extend_from_slice(&rest[..best_position]);
    spliced.extend_from_slice(segment);
    spliced.extend_from_slice(&rest[best_position..]);
    spliced
}
