//! Outcome history and adaptive per-algorithm weights.
//!
//! Outcomes are appended on every successful optimization; weights are only
//! recomputed when the host asks for it (normally from a [`Scheduler`] task).
//! Readers get an `Arc` snapshot of the weight table, so a recompute never
//! exposes a half-written table.
//!
//! [`Scheduler`]: crate::scheduler::Scheduler

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::construction::nearest_neighbor_order;
use crate::error::Result;
use crate::model::Algorithm;
use crate::objective::Evaluator;
use crate::problem::OptimizationProblem;
use crate::scheduler::Scheduler;
use crate::selector::Selection;

/// Winning margins at or below this are ties.
pub const TIE_MARGIN: f64 = 1e-6;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    /// Age at which an outcome counts half as much as a fresh one.
    pub half_life_hours: f64,
    /// How often the host should recompute weights.
    pub recompute_interval_secs: u64,
    /// Bounds on the adaptive weight. A candidate whose score trails by more
    /// than `1 - min_weight / max_weight` can never be lifted past the leader.
    pub min_weight: f64,
    pub max_weight: f64,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            half_life_hours: 168.0,
            recompute_interval_secs: 3600,
            min_weight: 0.9,
            max_weight: 1.1,
        }
    }
}

/// Problem features kept with each outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemFeatures {
    pub stops: usize,
    pub total_demand: f64,
    pub has_duration_limit: bool,
    pub has_capacity_limit: bool,
    pub enriched: bool,
}

impl ProblemFeatures {
    pub fn of(problem: &OptimizationProblem) -> Self {
        Self {
            stops: problem.len(),
            total_demand: problem.total_demand(),
            has_duration_limit: problem.constraints.max_duration_minutes.is_some(),
            has_capacity_limit: problem.constraints.vehicle_capacity.is_some(),
            enriched: problem.enriched,
        }
    }
}

/// One line of the history log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub timestamp: DateTime<Utc>,
    pub features: ProblemFeatures,
    pub winner: Algorithm,
    /// Relative lead of the winner over the runner-up.
    pub margin: f64,
    /// Relative search-cost gain of the winner over the nearest-neighbour tour.
    pub improvement: f64,
    pub candidates: Vec<Algorithm>,
}

/// Adaptive weight per algorithm; unknown algorithms weigh 1.0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmWeights {
    weights: HashMap<Algorithm, f64>,
}

impl AlgorithmWeights {
    pub fn from_map(weights: HashMap<Algorithm, f64>) -> Self {
        Self { weights }
    }

    pub fn get(&self, algorithm: Algorithm) -> f64 {
        self.weights.get(&algorithm).copied().unwrap_or(1.0)
    }

    pub fn as_map(&self) -> &HashMap<Algorithm, f64> {
        &self.weights
    }
}

/// Answer to a status query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizerStatus {
    pub algorithm_weights: HashMap<Algorithm, f64>,
    pub history_size: usize,
    pub average_improvement: f64,
}

pub struct HistoryStore {
    config: LearningConfig,
    log: Mutex<Vec<OutcomeRecord>>,
    weights: RwLock<Arc<AlgorithmWeights>>,
    writer: Option<Mutex<BufWriter<File>>>,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(LearningConfig::default())
    }
}

impl HistoryStore {
    /// In-memory store.
    pub fn new(config: LearningConfig) -> Self {
        Self {
            config,
            log: Mutex::new(Vec::new()),
            weights: RwLock::new(Arc::new(AlgorithmWeights::default())),
            writer: None,
        }
    }

    /// Store backed by a JSON-lines file.
    ///
    /// Existing lines are replayed and weights recomputed from them; new
    /// outcomes are appended. Unparseable lines are skipped with a warning.
    pub fn with_log(config: LearningConfig, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut records = Vec::new();
        if path.exists() {
            let reader = BufReader::new(File::open(path)?);
            for (number, line) in reader.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<OutcomeRecord>(&line) {
                    Ok(record) => records.push(record),
                    Err(err) => warn!(line = number + 1, error = %err, "skipping malformed history line"),
                }
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let store = Self {
            config,
            log: Mutex::new(records),
            weights: RwLock::new(Arc::new(AlgorithmWeights::default())),
            writer: Some(Mutex::new(BufWriter::new(file))),
        };
        store.recompute_weights();
        info!(path = %path.display(), records = store.len(), "history log opened");
        Ok(store)
    }

    pub fn config(&self) -> &LearningConfig {
        &self.config
    }

    /// Registers the batched weight recompute on a host-owned scheduler.
    pub fn schedule(self: &Arc<Self>, scheduler: &mut Scheduler) -> Result<()> {
        let store = Arc::clone(self);
        let interval = Duration::from_secs(self.config.recompute_interval_secs.max(1));
        scheduler.every("weight-recompute", interval, move || store.recompute_weights())
    }

    /// Appends the outcome of one optimization call.
    pub fn record_outcome(&self, problem: &OptimizationProblem, selection: &Selection) -> Result<()> {
        let evaluator = Evaluator::new(problem);
        let baseline = evaluator.cost(&nearest_neighbor_order(&problem.distance_matrix));
        let winner_cost = evaluator.cost(&selection.best.order);
        let improvement = if baseline > 0.0 {
            (baseline - winner_cost) / baseline
        } else {
            0.0
        };

        self.append(OutcomeRecord {
            timestamp: Utc::now(),
            features: ProblemFeatures::of(problem),
            winner: selection.winner(),
            margin: selection.margin(),
            improvement,
            candidates: selection.candidates(),
        })
    }

    /// Appends a prepared record.
    pub fn append(&self, record: OutcomeRecord) -> Result<()> {
        if let Some(writer) = &self.writer {
            let mut writer = lock(writer);
            serde_json::to_writer(&mut *writer, &record)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }
        debug!(winner = %record.winner, margin = record.margin, "recorded optimization outcome");
        lock(&self.log).push(record);
        Ok(())
    }

    pub fn weight(&self, algorithm: Algorithm) -> f64 {
        self.snapshot().get(algorithm)
    }

    /// The current weight table. Later recomputes do not affect it.
    pub fn snapshot(&self) -> Arc<AlgorithmWeights> {
        match self.weights.read() {
            Ok(weights) => Arc::clone(&weights),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn recompute_weights(&self) {
        self.recompute_weights_at(Utc::now());
    }

    /// Rebuilds the weight table from the log with exponential age decay.
    ///
    /// Only decisive outcomes count: a call whose winner led by no more than
    /// [`TIE_MARGIN`] says nothing about which algorithm is better. Over the
    /// decisive outcomes an algorithm took part in, its performance is its
    /// decayed wins above an even share plus its summed winning margins, per
    /// appearance. The weight is `1 + performance`, clamped to the configured
    /// range.
    pub fn recompute_weights_at(&self, now: DateTime<Utc>) {
        #[derive(Default)]
        struct Tally {
            appearances: f64,
            expected: f64,
            wins: f64,
            margin: f64,
        }

        let half_life = self.config.half_life_hours.max(f64::EPSILON);
        let mut tallies: HashMap<Algorithm, Tally> = HashMap::new();
        let (records, decisive) = {
            let log = lock(&self.log);
            let mut decisive = 0_usize;
            for record in log.iter().filter(|record| record.margin > TIE_MARGIN) {
                decisive += 1;
                let age_hours = (now - record.timestamp).num_seconds().max(0) as f64 / 3600.0;
                let decay = 0.5_f64.powf(age_hours / half_life);
                let share = 1.0 / record.candidates.len().max(1) as f64;

                for algorithm in &record.candidates {
                    let tally = tallies.entry(*algorithm).or_default();
                    tally.appearances += decay;
                    tally.expected += decay * share;
                }
                let winner = tallies.entry(record.winner).or_default();
                winner.wins += decay;
                winner.margin += decay * record.margin;
            }
            (log.len(), decisive)
        };

        let weights: HashMap<Algorithm, f64> = tallies
            .into_iter()
            .map(|(algorithm, tally)| {
                // One virtual appearance keeps sparse histories near 1.0.
                let performance = (tally.wins - tally.expected + tally.margin) / (tally.appearances + 1.0);
                let weight = (1.0 + performance).clamp(self.config.min_weight, self.config.max_weight);
                (algorithm, weight)
            })
            .collect();

        info!(records, decisive, algorithms = weights.len(), "recomputed algorithm weights");
        let table = Arc::new(AlgorithmWeights::from_map(weights));
        match self.weights.write() {
            Ok(mut current) => *current = table,
            Err(poisoned) => *poisoned.into_inner() = table,
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.log).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn records(&self) -> Vec<OutcomeRecord> {
        lock(&self.log).clone()
    }

    pub fn status(&self) -> OptimizerStatus {
        let weights = self.snapshot();
        let algorithm_weights = Algorithm::RUNNERS
            .iter()
            .chain(std::iter::once(&Algorithm::HybridEnsemble))
            .map(|algorithm| (*algorithm, weights.get(*algorithm)))
            .collect();

        let log = lock(&self.log);
        let average_improvement = if log.is_empty() {
            0.0
        } else {
            log.iter().map(|record| record.improvement).sum::<f64>() / log.len() as f64
        };

        OptimizerStatus {
            algorithm_weights,
            history_size: log.len(),
            average_improvement,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
