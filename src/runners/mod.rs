//! Interchangeable route search strategies.
//!
//! Every runner consumes the same [`OptimizationProblem`] and produces an
//! [`AlgorithmRun`]; the optimizer runs them side by side without knowing
//! their internals.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::error::{OptimizerError, Result};
use crate::model::{Algorithm, AlgorithmRun};
use crate::objective::Evaluator;
use crate::problem::OptimizationProblem;

pub mod annealing;
pub mod ant_colony;
pub mod genetic;
pub mod learned;
pub mod particle_swarm;

pub use annealing::{AnnealingConfig, AnnealingRunner};
pub use ant_colony::{AntColonyConfig, AntColonyRunner};
pub use genetic::{GeneticConfig, GeneticRunner};
pub use learned::{LearnedConfig, LinearPolicy, NeuralRunner, ReinforcementRunner, RoutePolicy, StopFeatures};
pub use particle_swarm::{ParticleSwarmConfig, ParticleSwarmRunner};

/// A route search strategy.
pub trait RouteStrategy: Send + Sync {
    fn algorithm(&self) -> Algorithm;

    /// Searches for a tour. Must poll `cancel` regularly and return
    /// [`OptimizerError::Cancelled`] once it is set.
    fn run(&self, problem: &OptimizationProblem, cancel: &Cancellation) -> Result<AlgorithmRun>;
}

/// Cooperative cancellation flag shared between a caller and its runners.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(OptimizerError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Deterministic per-runner RNG when a seed is configured.
pub(crate) fn rng_for(seed: Option<u64>, algorithm: Algorithm) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(u64::from(algorithm.priority()) * 7919)),
        None => StdRng::from_entropy(),
    }
}

/// Bookkeeping shared by the runners: wall clock and best-so-far history.
pub(crate) struct RunRecorder {
    algorithm: Algorithm,
    started: Instant,
    history: Vec<f64>,
}

impl RunRecorder {
    pub(crate) fn start(algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            started: Instant::now(),
            history: Vec::new(),
        }
    }

    /// Records the best cost seen so far; the history never increases.
    pub(crate) fn record(&mut self, cost: f64) {
        let best = match self.history.last() {
            Some(&last) if last <= cost => last,
            _ => cost,
        };
        self.history.push(best);
    }

    pub(crate) fn best(&self) -> Option<f64> {
        self.history.last().copied()
    }

    /// Improvement of the best cost over the trailing `window` records.
    pub(crate) fn recent_improvement(&self, window: usize) -> Option<f64> {
        let len = self.history.len();
        if window == 0 || len <= window {
            return None;
        }
        Some(self.history[len - 1 - window] - self.history[len - 1])
    }

    pub(crate) fn finish(
        self,
        evaluator: &Evaluator<'_>,
        order: Vec<usize>,
        iterations: usize,
    ) -> AlgorithmRun {
        let wall_clock_ms = self.started.elapsed().as_millis() as u64;
        AlgorithmRun {
            algorithm: self.algorithm,
            solution: evaluator.solution(order, self.algorithm),
            convergence_history: self.history,
            iterations_used: iterations,
            wall_clock_ms,
            heuristic_fallback: false,
        }
    }
}

/// Result for problems with fewer than two stops, where there is nothing to search.
pub(crate) fn trivial_run(evaluator: &Evaluator<'_>, algorithm: Algorithm) -> AlgorithmRun {
    let order: Vec<usize> = (0..evaluator.problem().len()).collect();
    let mut recorder = RunRecorder::start(algorithm);
    recorder.record(evaluator.cost(&order));
    recorder.finish(evaluator, order, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_shared_between_clones() {
        let cancel = Cancellation::new();
        let clone = cancel.clone();
        assert!(clone.check().is_ok());
        cancel.cancel();
        assert!(clone.is_cancelled());
        assert!(matches!(clone.check(), Err(OptimizerError::Cancelled)));
    }

    #[test]
    fn test_recorder_history_never_increases() {
        let mut recorder = RunRecorder::start(Algorithm::Genetic);
        for cost in [5.0, 4.0, 6.0, 3.0, 3.5] {
            recorder.record(cost);
        }
        assert_eq!(recorder.history, vec![5.0, 4.0, 4.0, 3.0, 3.0]);
        assert_eq!(recorder.best(), Some(3.0));
        assert_eq!(recorder.recent_improvement(2), Some(1.0));
        assert_eq!(recorder.recent_improvement(10), None);
    }

    #[test]
    fn test_seeded_rng_is_reproducible() {
        use rand::Rng;
        let mut a = rng_for(Some(11), Algorithm::AntColony);
        let mut b = rng_for(Some(11), Algorithm::AntColony);
        assert_eq!(a.r#gen::<u64>(), b.r#gen::<u64>());
    }
}
