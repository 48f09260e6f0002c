//! Local search operators on a single tour.

use serde::{Deserialize, Serialize};

use crate::objective::Evaluator;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalSearchConfig {
    /// Maximum improvement rounds (each round tries 2-opt, then relocate).
    pub max_iterations: usize,
}

impl Default for LocalSearchConfig {
    fn default() -> Self {
        Self { max_iterations: 100 }
    }
}

/// 2-opt: Reverse a segment of the tour to reduce its cost.
/// Returns true if an improvement was made.
fn two_opt_improve(order: &mut Vec<usize>, cost: &mut f64, evaluator: &Evaluator<'_>) -> bool {
    let n = order.len();
    if n < 3 {
        return false;
    }

    for i in 0..n - 1 {
        for j in i + 1..n {
            // Reverse segment [i..=j]
            let mut candidate = order.clone();
            candidate[i..=j].reverse();

            let candidate_cost = evaluator.cost(&candidate);
            if candidate_cost < *cost - 1e-12 {
                *order = candidate;
                *cost = candidate_cost;
                return true;
            }
        }
    }

    false
}

/// Relocate: Move a stop to another position in the tour.
/// Returns true if an improvement was made.
fn relocate_improve(order: &mut Vec<usize>, cost: &mut f64, evaluator: &Evaluator<'_>) -> bool {
    let n = order.len();
    if n < 3 {
        return false;
    }

    for from in 0..n {
        for to in 0..n {
            // Skip same or adjacent position (no change / same as a swap 2-opt finds)
            if to == from || to + 1 == from {
                continue;
            }

            let mut candidate = order.clone();
            let stop = candidate.remove(from);
            let insert_at = if to > from { to } else { to + 1 };
            candidate.insert(insert_at.min(candidate.len()), stop);

            let candidate_cost = evaluator.cost(&candidate);
            if candidate_cost < *cost - 1e-12 {
                *order = candidate;
                *cost = candidate_cost;
                return true;
            }
        }
    }

    false
}

/// Run local search improvement until no more improvements or max iterations reached.
///
/// Returns the final cost; `order` is modified in place and never gets worse.
pub fn improve(order: &mut Vec<usize>, evaluator: &Evaluator<'_>, config: &LocalSearchConfig) -> f64 {
    let mut cost = evaluator.cost(order);

    for _ in 0..config.max_iterations {
        let mut improved = two_opt_improve(order, &mut cost, evaluator);

        if relocate_improve(order, &mut cost, evaluator) {
            improved = true;
        }

        if !improved {
            break;
        }
    }

    cost
}
