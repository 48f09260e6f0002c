//! Scores candidate runs and picks the winner.
//!
//! Each objective is normalized against the best value any candidate reached
//! in the same call, so the best candidate on an objective scores 1.0 there.
//! The weighted sum is then scaled by the algorithm's adaptive weight.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::history::AlgorithmWeights;
use crate::model::{Algorithm, AlgorithmRun, RouteMetrics, RouteSolution};
use crate::objective::{Objective, ObjectiveWeights};

const EPSILON: f64 = 1e-9;

/// Number of runner-up solutions kept next to the winner.
pub const ALTERNATIVES: usize = 3;

/// One candidate after scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredRun {
    pub algorithm: Algorithm,
    /// Weighted normalized objective score in [0, 1].
    pub score: f64,
    /// `score` multiplied by the algorithm's adaptive weight.
    pub adjusted_score: f64,
    pub solution: RouteSolution,
}

/// Outcome of one selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Selection {
    pub best: RouteSolution,
    pub alternatives: Vec<RouteSolution>,
    /// All candidates, best first.
    pub ranking: Vec<ScoredRun>,
}

impl Selection {
    pub fn winner(&self) -> Algorithm {
        self.best.algorithm_source
    }

    /// Relative lead of the winner's objective score over its best rival.
    /// Zero without competition, on a tie, or when the winner only leads
    /// through its adaptive weight.
    ///
    /// The hybrid is assembled from the runners' tours, so it is never a
    /// rival of the runner it copied.
    pub fn margin(&self) -> f64 {
        let Some((first, rest)) = self.ranking.split_first() else {
            return 0.0;
        };
        let runner_up = rest
            .iter()
            .filter(|scored| scored.algorithm != Algorithm::HybridEnsemble)
            .map(|scored| scored.score)
            .fold(f64::NEG_INFINITY, f64::max);
        if first.score <= EPSILON || !runner_up.is_finite() {
            return 0.0;
        }
        ((first.score - runner_up) / first.score).max(0.0)
    }

    pub fn candidates(&self) -> Vec<Algorithm> {
        self.ranking.iter().map(|scored| scored.algorithm).collect()
    }
}

/// Ranks `runs` and returns the winner plus the top alternatives.
///
/// Returns `None` for an empty candidate set.
pub fn select(
    runs: &[AlgorithmRun],
    objective_weights: &ObjectiveWeights,
    algorithm_weights: &AlgorithmWeights,
) -> Option<Selection> {
    if runs.is_empty() {
        return None;
    }

    let metrics: Vec<&RouteMetrics> = runs.iter().map(|run| &run.solution.metrics).collect();
    let mut ranking: Vec<ScoredRun> = runs
        .iter()
        .map(|run| {
            let score = weighted_score(&run.solution.metrics, &metrics, objective_weights);
            let mut solution = run.solution.clone();
            solution.quality_score = score;
            ScoredRun {
                algorithm: run.algorithm,
                score,
                adjusted_score: score * algorithm_weights.get(run.algorithm),
                solution,
            }
        })
        .collect();
    ranking.sort_by(compare);

    let best = ranking.first()?.solution.clone();
    let alternatives = ranking
        .iter()
        .skip(1)
        .take(ALTERNATIVES)
        .map(|scored| scored.solution.clone())
        .collect();

    Some(Selection {
        best,
        alternatives,
        ranking,
    })
}

/// Σ weight × normalized value over every objective.
pub fn weighted_score(candidate: &RouteMetrics, field: &[&RouteMetrics], weights: &ObjectiveWeights) -> f64 {
    weights
        .iter()
        .map(|(objective, weight)| weight * normalized(objective, candidate, field))
        .sum()
}

fn normalized(objective: Objective, candidate: &RouteMetrics, field: &[&RouteMetrics]) -> f64 {
    let value = objective.value(candidate);
    let values = field.iter().map(|metrics| objective.value(metrics));

    if objective.is_maximized() {
        let best = values.fold(f64::NEG_INFINITY, f64::max);
        if best <= EPSILON { 1.0 } else { (value / best).clamp(0.0, 1.0) }
    } else {
        let best = values.fold(f64::INFINITY, f64::min);
        if value <= EPSILON { 1.0 } else { (best / value).clamp(0.0, 1.0) }
    }
}

/// Highest adjusted score first, then shortest distance, then algorithm priority.
///
/// Scores and distances are compared at a fixed precision so float noise
/// between identical tours falls through to the next key, and the order stays
/// transitive.
fn compare(a: &ScoredRun, b: &ScoredRun) -> Ordering {
    quantize(b.adjusted_score)
        .total_cmp(&quantize(a.adjusted_score))
        .then_with(|| quantize(a.solution.total_distance).total_cmp(&quantize(b.solution.total_distance)))
        .then_with(|| a.algorithm.priority().cmp(&b.algorithm.priority()))
}

fn quantize(value: f64) -> f64 {
    (value / EPSILON).round()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::history::LearningConfig;

    fn run(algorithm: Algorithm, distance: f64, time: f64) -> AlgorithmRun {
        let metrics = RouteMetrics {
            distance_km: distance,
            time_minutes: time,
            fuel_litres: distance * 0.35,
            emissions_kg: distance * 0.35 * 2.68,
            efficiency: 10.0 / distance,
            service_level: 0.5,
        };
        AlgorithmRun {
            algorithm,
            solution: RouteSolution {
                order: vec![0, 1],
                total_distance: distance,
                total_time: time,
                estimated_fuel: metrics.fuel_litres,
                estimated_emissions: metrics.emissions_kg,
                algorithm_source: algorithm,
                quality_score: 0.0,
                metrics,
                feasible: true,
                fallback: false,
                enriched: false,
            },
            convergence_history: vec![],
            iterations_used: 1,
            wall_clock_ms: 0,
            heuristic_fallback: false,
        }
    }

    #[test]
    fn test_dominant_candidate_scores_one() {
        let runs = vec![
            run(Algorithm::SimulatedAnnealing, 10.0, 20.0),
            run(Algorithm::Genetic, 12.0, 24.0),
        ];
        let selection = select(&runs, &ObjectiveWeights::default(), &AlgorithmWeights::default()).unwrap();

        assert_eq!(selection.winner(), Algorithm::SimulatedAnnealing);
        assert!((selection.best.quality_score - 1.0).abs() < 1e-9);
        assert!(selection.ranking[1].score < 1.0);
        assert!(selection.margin() > 0.0);
    }

    #[test]
    fn test_ties_break_on_priority() {
        let runs = vec![
            run(Algorithm::Reinforcement, 10.0, 20.0),
            run(Algorithm::HybridEnsemble, 10.0, 20.0),
            run(Algorithm::AntColony, 10.0, 20.0),
        ];
        let selection = select(&runs, &ObjectiveWeights::default(), &AlgorithmWeights::default()).unwrap();
        assert_eq!(selection.winner(), Algorithm::AntColony);
        assert_eq!(selection.alternatives[0].algorithm_source, Algorithm::Reinforcement);
        assert_eq!(selection.margin(), 0.0);
    }

    #[test]
    fn test_adaptive_weight_can_flip_winner() {
        let runs = vec![run(Algorithm::Genetic, 10.0, 20.0), run(Algorithm::Neural, 10.5, 21.0)];
        let weights = AlgorithmWeights::from_map(HashMap::from([
            (Algorithm::Genetic, 0.9),
            (Algorithm::Neural, 1.1),
        ]));
        let selection = select(&runs, &ObjectiveWeights::default(), &weights).unwrap();
        assert_eq!(selection.winner(), Algorithm::Neural);
        // the lead came from the weight alone, so it is not a decisive win
        assert_eq!(selection.margin(), 0.0);
    }

    #[test]
    fn test_weight_bounds_cannot_lift_dominated_run() {
        let bounds = LearningConfig::default();
        let runs = vec![run(Algorithm::Genetic, 25.0, 50.0), run(Algorithm::HybridEnsemble, 10.0, 20.0)];
        let weights = AlgorithmWeights::from_map(HashMap::from([
            (Algorithm::Genetic, bounds.max_weight),
            (Algorithm::HybridEnsemble, bounds.min_weight),
        ]));
        let selection = select(&runs, &ObjectiveWeights::default(), &weights).unwrap();

        assert_eq!(selection.winner(), Algorithm::HybridEnsemble);
        assert!(selection.margin() > 0.5);
    }

    #[test]
    fn test_copied_hybrid_does_not_erase_margin() {
        let runs = vec![
            run(Algorithm::AntColony, 10.0, 20.0),
            run(Algorithm::HybridEnsemble, 10.0, 20.0),
            run(Algorithm::Genetic, 12.5, 25.0),
        ];
        let selection = select(&runs, &ObjectiveWeights::default(), &AlgorithmWeights::default()).unwrap();

        assert_eq!(selection.winner(), Algorithm::AntColony);
        assert!(selection.margin() > 0.1);
    }

    #[test]
    fn test_near_ties_order_independent_of_input() {
        let scored = |algorithm, adjusted_score, distance| ScoredRun {
            algorithm,
            score: adjusted_score,
            adjusted_score,
            solution: run(algorithm, distance, 20.0).solution,
        };
        let a = scored(Algorithm::Genetic, 1.0, 12.0);
        let b = scored(Algorithm::AntColony, 1.0 - 6e-10, 11.0);
        let c = scored(Algorithm::Neural, 1.0 - 1.2e-9, 10.0);

        let orders = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];
        let mut winners = Vec::new();
        for order in orders {
            let pool = [&a, &b, &c];
            let mut ranking: Vec<ScoredRun> = order.iter().map(|i| pool[*i].clone()).collect();
            ranking.sort_by(compare);
            winners.push(ranking.iter().map(|s| s.algorithm).collect::<Vec<_>>());
        }
        assert!(winners.windows(2).all(|w| w[0] == w[1]), "{:?}", winners);
    }

    #[test]
    fn test_alternatives_capped_at_three() {
        let runs: Vec<AlgorithmRun> = Algorithm::RUNNERS
            .iter()
            .enumerate()
            .map(|(i, algorithm)| run(*algorithm, 10.0 + i as f64, 20.0 + i as f64))
            .collect();
        let selection = select(&runs, &ObjectiveWeights::default(), &AlgorithmWeights::default()).unwrap();

        assert_eq!(selection.alternatives.len(), ALTERNATIVES);
        assert_eq!(selection.ranking.len(), 6);
        let scores: Vec<f64> = selection.ranking.iter().map(|s| s.adjusted_score).collect();
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_empty_candidates() {
        assert!(select(&[], &ObjectiveWeights::default(), &AlgorithmWeights::default()).is_none());
    }
}
