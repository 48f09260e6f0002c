//! Value types flowing through the optimization pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{OptimizerError, Result};

/// WGS84 position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// (lat, lng) tuple, the shape matrix providers consume.
    pub fn as_tuple(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }
}

/// A bin or depot record as supplied by the fleet data store.
///
/// Coordinates are optional here because collaborator payloads are not trusted;
/// [`Node::from_record`] rejects records without usable coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    pub id: String,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    #[serde(default)]
    pub fill_level: Option<f64>,
    #[serde(default)]
    pub priority: Option<u8>,
}

impl NodeRecord {
    pub fn new(id: impl Into<String>, lat: f64, lng: f64) -> Self {
        Self {
            id: id.into(),
            lat: Some(lat),
            lng: Some(lng),
            fill_level: None,
            priority: None,
        }
    }

    pub fn with_fill_level(mut self, fill_level: f64) -> Self {
        self.fill_level = Some(fill_level);
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// A validated stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub coordinate: Coordinate,
    pub priority: Option<u8>,
    /// Fill level in percent points; doubles as the stop's demand.
    pub fill_level: Option<f64>,
}

impl Node {
    pub fn from_record(record: &NodeRecord) -> Result<Self> {
        let (lat, lng) = match (record.lat, record.lng) {
            (Some(lat), Some(lng)) => (lat, lng),
            _ => {
                return Err(OptimizerError::InvalidInput(format!(
                    "node '{}' is missing latitude or longitude",
                    record.id
                )));
            }
        };

        if !lat.is_finite() || !lng.is_finite() || lat.abs() > 90.0 || lng.abs() > 180.0 {
            return Err(OptimizerError::InvalidInput(format!(
                "node '{}' has invalid coordinates ({}, {})",
                record.id, lat, lng
            )));
        }

        if let Some(fill) = record.fill_level {
            if !fill.is_finite() || fill < 0.0 {
                return Err(OptimizerError::InvalidInput(format!(
                    "node '{}' has invalid fill level {}",
                    record.id, fill
                )));
            }
        }

        Ok(Self {
            id: record.id.clone(),
            coordinate: Coordinate::new(lat, lng),
            priority: record.priority,
            fill_level: record.fill_level,
        })
    }

    pub fn demand(&self) -> f64 {
        self.fill_level.unwrap_or(0.0)
    }

    /// How much it matters to visit this stop early.
    pub fn service_weight(&self) -> f64 {
        let priority = f64::from(self.priority.unwrap_or(1).max(1));
        priority * (1.0 + self.demand() / 100.0)
    }
}

/// Source of a route solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    Genetic,
    AntColony,
    ParticleSwarm,
    SimulatedAnnealing,
    Neural,
    Reinforcement,
    HybridEnsemble,
    NearestNeighbor,
}

impl Algorithm {
    /// The six interchangeable runners.
    pub const RUNNERS: [Algorithm; 6] = [
        Algorithm::Genetic,
        Algorithm::AntColony,
        Algorithm::ParticleSwarm,
        Algorithm::SimulatedAnnealing,
        Algorithm::Neural,
        Algorithm::Reinforcement,
    ];

    /// Tie-break rank; lower wins.
    pub fn priority(&self) -> u8 {
        match self {
            Algorithm::Genetic => 0,
            Algorithm::AntColony => 1,
            Algorithm::ParticleSwarm => 2,
            Algorithm::SimulatedAnnealing => 3,
            Algorithm::Neural => 4,
            Algorithm::Reinforcement => 5,
            Algorithm::HybridEnsemble => 6,
            Algorithm::NearestNeighbor => 7,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::Genetic => "genetic",
            Algorithm::AntColony => "ant_colony",
            Algorithm::ParticleSwarm => "particle_swarm",
            Algorithm::SimulatedAnnealing => "simulated_annealing",
            Algorithm::Neural => "neural",
            Algorithm::Reinforcement => "reinforcement",
            Algorithm::HybridEnsemble => "hybrid_ensemble",
            Algorithm::NearestNeighbor => "nearest_neighbor",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Hard limits supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Constraints {
    pub max_duration_minutes: Option<f64>,
    pub max_stops: Option<usize>,
    /// Capacity in the same units as node fill levels.
    pub vehicle_capacity: Option<f64>,
}

/// Raw objective values of one tour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteMetrics {
    pub distance_km: f64,
    pub time_minutes: f64,
    pub fuel_litres: f64,
    pub emissions_kg: f64,
    /// Served demand per km; higher is better.
    pub efficiency: f64,
    /// Position-discounted service weight in [0, 1]; higher is better.
    pub service_level: f64,
}

/// A complete tour: origin, every destination once, back to origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSolution {
    /// Permutation of destination indices; the origin is implicit at both ends.
    pub order: Vec<usize>,
    pub total_distance: f64,
    pub total_time: f64,
    pub estimated_fuel: f64,
    pub estimated_emissions: f64,
    pub algorithm_source: Algorithm,
    pub quality_score: f64,
    pub metrics: RouteMetrics,
    pub feasible: bool,
    pub fallback: bool,
    pub enriched: bool,
}

impl RouteSolution {
    /// Stop ids in visiting order.
    pub fn stop_ids<'a>(&self, destinations: &'a [Node]) -> Vec<&'a str> {
        self.order
            .iter()
            .filter_map(|&index| destinations.get(index))
            .map(|node| node.id.as_str())
            .collect()
    }
}

/// Output of a single runner invocation.
#[derive(Debug, Clone)]
pub struct AlgorithmRun {
    pub algorithm: Algorithm,
    pub solution: RouteSolution,
    /// Best search cost so far, one entry per recorded step.
    pub convergence_history: Vec<f64>,
    pub iterations_used: usize,
    pub wall_clock_ms: u64,
    /// The runner had no trained model and built the tour with nearest neighbour.
    pub heuristic_fallback: bool,
}

/// Checks that `order` visits each of `0..count` exactly once.
pub fn is_valid_permutation(order: &[usize], count: usize) -> bool {
    if order.len() != count {
        return false;
    }
    let mut seen = vec![false; count];
    for &index in order {
        if index >= count || seen[index] {
            return false;
        }
        seen[index] = true;
    }
    true
}
