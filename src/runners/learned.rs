//! Learned next-stop heuristics.
//!
//! Both runners are driven by a [`RoutePolicy`] that scores a candidate next
//! stop given the current partial tour. Without a policy they are explicitly
//! untrained: they build the nearest-neighbour tour and flag the run with
//! `heuristic_fallback`.

use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::construction::nearest_neighbor_order;
use crate::error::{OptimizerError, Result};
use crate::model::{Algorithm, AlgorithmRun};
use crate::objective::Evaluator;
use crate::problem::OptimizationProblem;
use crate::runners::{Cancellation, RouteStrategy, RunRecorder, rng_for};

/// State/action features for choosing the next stop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StopFeatures {
    /// From the current position to the candidate.
    pub distance_km: f64,
    pub travel_minutes: f64,
    /// Candidate fill level as a fraction.
    pub fill_level: f64,
    pub priority: f64,
    /// From the candidate back to the origin.
    pub return_km: f64,
    /// Share of stops still unvisited, including the candidate.
    pub remaining_fraction: f64,
}

/// Scores a candidate next stop; higher is better.
pub trait RoutePolicy: Send + Sync {
    fn score(&self, features: &StopFeatures) -> f64;
}

/// A linear scorer whose weights come from offline training.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearPolicy {
    pub bias: f64,
    pub distance_km: f64,
    pub travel_minutes: f64,
    pub fill_level: f64,
    pub priority: f64,
    pub return_km: f64,
    pub remaining_fraction: f64,
}

impl LinearPolicy {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl RoutePolicy for LinearPolicy {
    fn score(&self, f: &StopFeatures) -> f64 {
        self.bias
            + self.distance_km * f.distance_km
            + self.travel_minutes * f.travel_minutes
            + self.fill_level * f.fill_level
            + self.priority * f.priority
            + self.return_km * f.return_km
            + self.remaining_fraction * f.remaining_fraction
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnedConfig {
    /// Episodes rolled out by the reinforcement runner.
    pub episodes: usize,
    /// Probability of a random action in each step of an episode.
    pub exploration: f64,
}

impl Default for LearnedConfig {
    fn default() -> Self {
        Self {
            episodes: 64,
            exploration: 0.1,
        }
    }
}

/// Pointer-style decoder: repeatedly emits the highest-scoring unvisited stop.
#[derive(Clone, Default)]
pub struct NeuralRunner {
    policy: Option<Arc<dyn RoutePolicy>>,
}

impl NeuralRunner {
    pub fn untrained() -> Self {
        Self { policy: None }
    }

    pub fn with_policy(policy: Arc<dyn RoutePolicy>) -> Self {
        Self { policy: Some(policy) }
    }

    pub fn is_trained(&self) -> bool {
        self.policy.is_some()
    }
}

impl RouteStrategy for NeuralRunner {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Neural
    }

    fn run(&self, problem: &OptimizationProblem, cancel: &Cancellation) -> Result<AlgorithmRun> {
        let evaluator = Evaluator::new(problem);
        let Some(policy) = &self.policy else {
            return Ok(untrained_run(&evaluator, Algorithm::Neural));
        };

        cancel.check()?;
        let mut recorder = RunRecorder::start(Algorithm::Neural);
        let order = rollout(problem, policy.as_ref(), Algorithm::Neural, |_| None)?;
        recorder.record(evaluator.cost(&order));
        Ok(recorder.finish(&evaluator, order, 1))
    }
}

/// Episodic policy rollouts with ε-greedy exploration.
///
/// Each step earns the negative incremental search cost as reward, so the
/// episode with the highest return is the cheapest tour; that one is kept.
#[derive(Clone, Default)]
pub struct ReinforcementRunner {
    policy: Option<Arc<dyn RoutePolicy>>,
    config: LearnedConfig,
    seed: Option<u64>,
}

impl ReinforcementRunner {
    pub fn untrained() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: Arc<dyn RoutePolicy>, config: LearnedConfig, seed: Option<u64>) -> Self {
        Self {
            policy: Some(policy),
            config,
            seed,
        }
    }

    pub fn is_trained(&self) -> bool {
        self.policy.is_some()
    }
}

impl RouteStrategy for ReinforcementRunner {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Reinforcement
    }

    fn run(&self, problem: &OptimizationProblem, cancel: &Cancellation) -> Result<AlgorithmRun> {
        let evaluator = Evaluator::new(problem);
        let Some(policy) = &self.policy else {
            return Ok(untrained_run(&evaluator, Algorithm::Reinforcement));
        };

        let mut rng = rng_for(self.seed, Algorithm::Reinforcement);
        let mut recorder = RunRecorder::start(Algorithm::Reinforcement);
        let exploration = self.config.exploration.clamp(0.0, 1.0);

        // Episode 0 is purely greedy.
        let mut best = rollout(problem, policy.as_ref(), Algorithm::Reinforcement, |_| None)?;
        let mut best_return = -evaluator.cost(&best);
        recorder.record(-best_return);

        let mut episode = 1;
        while episode < self.config.episodes.max(1) {
            cancel.check()?;
            episode += 1;

            let order = rollout(problem, policy.as_ref(), Algorithm::Reinforcement, |candidates| {
                rng.gen_bool(exploration).then(|| rng.gen_range(0..candidates))
            })?;
            let episode_return = -evaluator.cost(&order);
            if episode_return > best_return {
                best_return = episode_return;
                best = order;
            }
            recorder.record(-best_return);
        }

        debug!(episode, cost = -best_return, "reinforcement rollouts finished");
        Ok(recorder.finish(&evaluator, best, episode))
    }
}

fn untrained_run(evaluator: &Evaluator<'_>, algorithm: Algorithm) -> AlgorithmRun {
    info!(%algorithm, "no trained policy, building nearest-neighbour tour");
    let problem = evaluator.problem();
    let mut recorder = RunRecorder::start(algorithm);
    let order = nearest_neighbor_order(&problem.distance_matrix);
    recorder.record(evaluator.cost(&order));
    let mut run = recorder.finish(evaluator, order, 0);
    run.heuristic_fallback = true;
    run
}

/// Builds a tour step by step. `explore(candidates)` may return the index of
/// an exploratory pick among the unvisited stops instead of the best-scoring one.
fn rollout<F>(
    problem: &OptimizationProblem,
    policy: &dyn RoutePolicy,
    algorithm: Algorithm,
    mut explore: F,
) -> Result<Vec<usize>>
where
    F: FnMut(usize) -> Option<usize>,
{
    let n = problem.len();
    let mut visited = vec![false; n];
    let mut order = Vec::with_capacity(n);
    let mut current = 0;

    for _ in 0..n {
        let candidates: Vec<usize> = (0..n).filter(|stop| !visited[*stop]).collect();
        let remaining_fraction = candidates.len() as f64 / n as f64;

        let mut best: Option<(usize, f64)> = None;
        for &stop in &candidates {
            let node = &problem.destinations[stop];
            let features = StopFeatures {
                distance_km: problem.distance_matrix[current][stop + 1],
                travel_minutes: problem.time_matrix[current][stop + 1],
                fill_level: node.demand() / 100.0,
                priority: f64::from(node.priority.unwrap_or(1)),
                return_km: problem.distance_matrix[stop + 1][0],
                remaining_fraction,
            };
            let score = policy.score(&features);
            if !score.is_finite() {
                return Err(OptimizerError::RunnerFailure {
                    algorithm,
                    reason: format!("policy produced a non-finite score for stop {}", stop),
                });
            }
            if best.is_none_or(|(_, best_score)| score > best_score) {
                best = Some((stop, score));
            }
        }

        let exploratory = if candidates.len() > 1 {
            explore(candidates.len()).and_then(|pick| candidates.get(pick).copied())
        } else {
            None
        };
        let chosen = exploratory.or(best.map(|(stop, _)| stop));

        if let Some(stop) = chosen {
            visited[stop] = true;
            order.push(stop);
            current = stop + 1;
        }
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Constraints, NodeRecord, is_valid_permutation};
    use crate::problem::{Preferences, ProblemBuilder, ProblemConfig};

    fn problem() -> OptimizationProblem {
        let origin = NodeRecord::new("depot", 25.2854, 51.5310);
        let destinations = vec![
            NodeRecord::new("far", 25.40, 51.53),
            NodeRecord::new("near", 25.29, 51.53).with_fill_level(10.0),
            NodeRecord::new("full", 25.33, 51.53).with_fill_level(95.0).with_priority(3),
        ];
        ProblemBuilder::new(ProblemConfig::default())
            .build(&origin, &destinations, Constraints::default(), Preferences::default())
            .unwrap()
    }

    #[test]
    fn test_untrained_runners_fall_back() {
        let problem = problem();
        for strategy in [
            Box::new(NeuralRunner::untrained()) as Box<dyn RouteStrategy>,
            Box::new(ReinforcementRunner::untrained()),
        ] {
            let run = strategy.run(&problem, &Cancellation::new()).unwrap();
            assert!(run.heuristic_fallback);
            assert_eq!(run.solution.order, nearest_neighbor_order(&problem.distance_matrix));
        }
    }

    #[test]
    fn test_policy_drives_neural_decoding() {
        // Prefers full bins regardless of distance.
        let policy = LinearPolicy {
            fill_level: 10.0,
            distance_km: -0.01,
            ..LinearPolicy::default()
        };
        let run = NeuralRunner::with_policy(Arc::new(policy))
            .run(&problem(), &Cancellation::new())
            .unwrap();
        assert!(!run.heuristic_fallback);
        assert_eq!(run.solution.order[0], 2);
        assert!(is_valid_permutation(&run.solution.order, 3));
    }

    #[test]
    fn test_reinforcement_never_worse_than_greedy_episode() {
        let policy: Arc<dyn RoutePolicy> = Arc::new(LinearPolicy {
            distance_km: -1.0,
            ..LinearPolicy::default()
        });
        let problem = problem();
        let greedy = NeuralRunner::with_policy(policy.clone())
            .run(&problem, &Cancellation::new())
            .unwrap();
        let config = LearnedConfig {
            episodes: 20,
            exploration: 0.5,
        };
        let run = ReinforcementRunner::with_policy(policy, config, Some(3))
            .run(&problem, &Cancellation::new())
            .unwrap();

        let greedy_cost = greedy.convergence_history[0];
        assert!(run.convergence_history.last().copied().unwrap() <= greedy_cost + 1e-12);
        assert_eq!(run.iterations_used, 20);
    }

    struct BrokenPolicy;

    impl RoutePolicy for BrokenPolicy {
        fn score(&self, _features: &StopFeatures) -> f64 {
            f64::NAN
        }
    }

    #[test]
    fn test_non_finite_policy_is_runner_failure() {
        let result = NeuralRunner::with_policy(Arc::new(BrokenPolicy)).run(&problem(), &Cancellation::new());
        assert!(matches!(result, Err(OptimizerError::RunnerFailure { .. })));
    }

    #[test]
    fn test_policy_loads_from_json() {
        let policy = LinearPolicy::from_json(r#"{"distance_km": -1.5, "fill_level": 2.0}"#).unwrap();
        assert_eq!(policy.distance_km, -1.5);
        assert_eq!(policy.bias, 0.0);
    }
}
