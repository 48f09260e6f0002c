//! The optimization pipeline.
//!
//! build problem → enrich → run strategies in parallel → hybrid ensemble →
//! select → record outcome.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use chrono::Utc;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::conditions::enrich;
use crate::config::OptimizerConfig;
use crate::construction::nearest_neighbor;
use crate::ensemble;
use crate::error::{OptimizerError, Result};
use crate::history::{HistoryStore, OptimizerStatus};
use crate::model::{Algorithm, AlgorithmRun, Constraints, NodeRecord, RouteSolution, is_valid_permutation};
use crate::objective::Evaluator;
use crate::problem::{OptimizationProblem, Preferences, ProblemBuilder};
use crate::runners::{
    AnnealingRunner, AntColonyRunner, Cancellation, GeneticRunner, NeuralRunner, ParticleSwarmRunner,
    ReinforcementRunner, RoutePolicy, RouteStrategy,
};
use crate::selector::{self, Selection};
use crate::traits::ConditionsFeed;

/// Structured form of an optimization call, e.g. decoded from a dispatch payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRequest {
    pub origin: NodeRecord,
    pub destinations: Vec<NodeRecord>,
    #[serde(default)]
    pub constraints: Option<Constraints>,
    #[serde(default)]
    pub preferences: Option<Preferences>,
}

impl RouteRequest {
    /// Any decoding failure is reported as `InvalidInput`.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|err| OptimizerError::InvalidInput(format!("malformed route request: {}", err)))
    }
}

pub struct RouteOptimizer {
    config: OptimizerConfig,
    builder: ProblemBuilder,
    strategies: Vec<Box<dyn RouteStrategy>>,
    conditions: Option<Arc<dyn ConditionsFeed>>,
    history: Arc<HistoryStore>,
    alternatives: RwLock<Vec<RouteSolution>>,
}

impl Default for RouteOptimizer {
    fn default() -> Self {
        Self::new(OptimizerConfig::default())
    }
}

impl RouteOptimizer {
    /// Optimizer with all six strategies; the learned ones start untrained.
    pub fn new(config: OptimizerConfig) -> Self {
        let strategies: Vec<Box<dyn RouteStrategy>> = vec![
            Box::new(GeneticRunner::new(config.genetic.clone(), config.seed)),
            Box::new(AntColonyRunner::new(config.ant_colony.clone(), config.seed)),
            Box::new(ParticleSwarmRunner::new(config.particle_swarm.clone(), config.seed)),
            Box::new(AnnealingRunner::new(config.annealing.clone(), config.seed)),
            Box::new(NeuralRunner::untrained()),
            Box::new(ReinforcementRunner::untrained()),
        ];

        Self {
            builder: ProblemBuilder::new(config.problem.clone()),
            history: Arc::new(HistoryStore::new(config.learning.clone())),
            strategies,
            conditions: None,
            alternatives: RwLock::new(Vec::new()),
            config,
        }
    }

    pub fn with_conditions_feed(mut self, feed: Arc<dyn ConditionsFeed>) -> Self {
        self.conditions = Some(feed);
        self
    }

    /// Shares a history store, e.g. one backed by a log file.
    pub fn with_history(mut self, history: Arc<HistoryStore>) -> Self {
        self.history = history;
        self
    }

    /// Replaces the whole strategy set.
    pub fn with_strategies(mut self, strategies: Vec<Box<dyn RouteStrategy>>) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn with_neural_policy(self, policy: Arc<dyn RoutePolicy>) -> Self {
        self.replace_strategy(Box::new(NeuralRunner::with_policy(policy)))
    }

    pub fn with_reinforcement_policy(self, policy: Arc<dyn RoutePolicy>) -> Self {
        let runner = ReinforcementRunner::with_policy(policy, self.config.learned.clone(), self.config.seed);
        self.replace_strategy(Box::new(runner))
    }

    fn replace_strategy(mut self, strategy: Box<dyn RouteStrategy>) -> Self {
        let algorithm = strategy.algorithm();
        self.strategies.retain(|existing| existing.algorithm() != algorithm);
        self.strategies.push(strategy);
        self
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    pub fn optimize_route(
        &self,
        origin: &NodeRecord,
        destinations: &[NodeRecord],
        constraints: Option<Constraints>,
        preferences: Option<Preferences>,
    ) -> Result<RouteSolution> {
        self.optimize_route_with_cancel(origin, destinations, constraints, preferences, &Cancellation::new())
    }

    pub fn optimize_request(&self, request: &RouteRequest) -> Result<RouteSolution> {
        self.optimize_route(
            &request.origin,
            &request.destinations,
            request.constraints.clone(),
            request.preferences.clone(),
        )
    }

    /// Like [`optimize_route`](Self::optimize_route), but aborts with
    /// [`OptimizerError::Cancelled`] once `cancel` is set. A cancelled call
    /// records nothing and leaves the previous alternatives in place.
    pub fn optimize_route_with_cancel(
        &self,
        origin: &NodeRecord,
        destinations: &[NodeRecord],
        constraints: Option<Constraints>,
        preferences: Option<Preferences>,
        cancel: &Cancellation,
    ) -> Result<RouteSolution> {
        cancel.check()?;
        let problem = self.builder.build(
            origin,
            destinations,
            constraints.unwrap_or_default(),
            preferences.unwrap_or_default(),
        )?;

        if problem.is_empty() {
            debug!("no destinations, returning empty tour");
            let mut solution = Evaluator::new(&problem).solution(Vec::new(), Algorithm::NearestNeighbor);
            solution.quality_score = 1.0;
            self.set_alternatives(Vec::new());
            return Ok(solution);
        }

        let problem = enrich(problem, self.conditions.clone(), &self.config.enrichment, Utc::now());
        cancel.check()?;
        info!(stops = problem.len(), enriched = problem.enriched, "optimizing route");

        let mut runs = self.run_strategies(&problem, cancel)?;
        if runs.is_empty() {
            warn!(error = %OptimizerError::AllRunnersFailed, "degrading to nearest neighbour");
            let solution = nearest_neighbor(&problem);
            self.set_alternatives(Vec::new());
            return Ok(solution);
        }

        if let Some(hybrid) = ensemble::combine(&problem, &runs, &self.config.ensemble) {
            runs.push(hybrid);
        }
        cancel.check()?;

        let weights = self.history.snapshot();
        let selection = selector::select(&runs, &problem.objective_weights, &weights)
            .ok_or(OptimizerError::AllRunnersFailed)?;
        cancel.check()?;

        self.record(&problem, &selection);
        info!(
            winner = %selection.winner(),
            distance_km = selection.best.total_distance,
            score = selection.best.quality_score,
            "route optimized"
        );
        self.set_alternatives(selection.alternatives.clone());
        Ok(selection.best)
    }

    /// Runner-up solutions of the most recent successful call.
    pub fn alternatives(&self) -> Vec<RouteSolution> {
        match self.alternatives.read() {
            Ok(alternatives) => alternatives.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn status(&self) -> OptimizerStatus {
        self.history.status()
    }

    /// Runs every strategy in parallel and keeps the valid runs.
    ///
    /// A failing, panicking or invalid runner is dropped; cancellation of
    /// any runner aborts the whole call.
    fn run_strategies(&self, problem: &OptimizationProblem, cancel: &Cancellation) -> Result<Vec<AlgorithmRun>> {
        let outcomes: Vec<(Algorithm, Result<AlgorithmRun>)> = self
            .strategies
            .par_iter()
            .map(|strategy| {
                let algorithm = strategy.algorithm();
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| strategy.run(problem, cancel)))
                    .unwrap_or_else(|_| {
                        Err(OptimizerError::RunnerFailure {
                            algorithm,
                            reason: "runner panicked".to_string(),
                        })
                    })
                    .and_then(|run| validate_run(problem, algorithm, run));
                (algorithm, outcome)
            })
            .collect();

        if cancel.is_cancelled() {
            return Err(OptimizerError::Cancelled);
        }

        let mut runs = Vec::with_capacity(outcomes.len());
        for (algorithm, outcome) in outcomes {
            match outcome {
                Ok(run) => {
                    debug!(
                        %algorithm,
                        distance_km = run.solution.total_distance,
                        iterations = run.iterations_used,
                        wall_clock_ms = run.wall_clock_ms,
                        heuristic_fallback = run.heuristic_fallback,
                        "runner finished"
                    );
                    runs.push(run);
                }
                Err(OptimizerError::Cancelled) => return Err(OptimizerError::Cancelled),
                Err(err) => warn!(%algorithm, error = %err, "runner excluded"),
            }
        }
        Ok(runs)
    }

    fn record(&self, problem: &OptimizationProblem, selection: &Selection) {
        if let Err(err) = self.history.record_outcome(problem, selection) {
            warn!(error = %err, "failed to record optimization outcome");
        }
    }

    fn set_alternatives(&self, alternatives: Vec<RouteSolution>) {
        match self.alternatives.write() {
            Ok(mut current) => *current = alternatives,
            Err(poisoned) => *poisoned.into_inner() = alternatives,
        }
    }
}

fn validate_run(problem: &OptimizationProblem, algorithm: Algorithm, run: AlgorithmRun) -> Result<AlgorithmRun> {
    if !is_valid_permutation(&run.solution.order, problem.len()) {
        return Err(OptimizerError::RunnerFailure {
            algorithm,
            reason: "result is not a permutation of the destinations".to_string(),
        });
    }
    if !run.solution.total_distance.is_finite() || run.solution.total_distance < 0.0 {
        return Err(OptimizerError::RunnerFailure {
            algorithm,
            reason: format!("invalid total distance {}", run.solution.total_distance),
        });
    }
    Ok(run)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_rejects_non_sequence_destinations() {
        let err = RouteRequest::from_json(r#"{"origin": {"id": "o", "lat": 25.0, "lng": 51.0}, "destinations": "bins"}"#)
            .unwrap_err();
        assert!(matches!(err, OptimizerError::InvalidInput(_)));
    }

    #[test]
    fn test_policy_replaces_untrained_runner() {
        use crate::runners::LinearPolicy;

        let optimizer = RouteOptimizer::default().with_neural_policy(Arc::new(LinearPolicy::default()));
        let neural = optimizer
            .strategies
            .iter()
            .filter(|strategy| strategy.algorithm() == Algorithm::Neural)
            .count();
        assert_eq!(neural, 1);
        assert_eq!(optimizer.strategies.len(), 6);
    }
}
