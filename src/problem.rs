//! Problem builder: validated nodes plus distance and time matrices.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::conditions::{BoundingBox, Conditions};
use crate::error::{OptimizerError, Result};
use crate::haversine::HaversineMatrix;
use crate::model::{Constraints, Coordinate, Node, NodeRecord};
use crate::objective::{FuelModel, Objective, ObjectiveWeights};
use crate::traits::DistanceMatrixProvider;

/// Average driving speed assumption for time estimation.
const DEFAULT_SPEED_KMH: f64 = 40.0;

/// Per-call tuning supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Preferences {
    pub objective_weights: Option<HashMap<Objective, f64>>,
    pub average_speed_kmh: Option<f64>,
    pub service_minutes_per_stop: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProblemConfig {
    /// Assumed average driving speed in km/h.
    pub average_speed_kmh: f64,
    /// Time spent emptying one bin.
    pub service_minutes_per_stop: f64,
    pub fuel: FuelModel,
}

impl Default for ProblemConfig {
    fn default() -> Self {
        Self {
            average_speed_kmh: DEFAULT_SPEED_KMH,
            service_minutes_per_stop: 2.0,
            fuel: FuelModel::default(),
        }
    }
}

/// A normalized single-vehicle routing problem.
///
/// Matrix index 0 is the origin; destination `i` sits at matrix index `i + 1`.
#[derive(Debug, Clone)]
pub struct OptimizationProblem {
    pub origin: Node,
    pub destinations: Vec<Node>,
    /// Kilometres.
    pub distance_matrix: Vec<Vec<f64>>,
    /// Minutes.
    pub time_matrix: Vec<Vec<f64>>,
    pub constraints: Constraints,
    pub objective_weights: ObjectiveWeights,
    pub service_minutes_per_stop: f64,
    pub fuel_model: FuelModel,
    /// Whether live conditions were applied to the time matrix.
    pub enriched: bool,
    pub conditions: Option<Conditions>,
}

impl OptimizationProblem {
    /// Number of destinations.
    pub fn len(&self) -> usize {
        self.destinations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty()
    }

    pub fn total_demand(&self) -> f64 {
        self.destinations.iter().map(Node::demand).sum()
    }

    pub fn coordinates(&self) -> Vec<Coordinate> {
        std::iter::once(self.origin.coordinate)
            .chain(self.destinations.iter().map(|node| node.coordinate))
            .collect()
    }

    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::around(&self.coordinates())
    }
}

/// Turns raw collaborator records into an [`OptimizationProblem`].
///
/// Pure: identical inputs always produce identical matrices.
#[derive(Debug, Clone)]
pub struct ProblemBuilder<M = HaversineMatrix> {
    config: ProblemConfig,
    matrix_provider: M,
}

impl ProblemBuilder<HaversineMatrix> {
    pub fn new(config: ProblemConfig) -> Self {
        Self {
            config,
            matrix_provider: HaversineMatrix,
        }
    }
}

impl<M: DistanceMatrixProvider> ProblemBuilder<M> {
    pub fn with_matrix_provider<P: DistanceMatrixProvider>(self, matrix_provider: P) -> ProblemBuilder<P> {
        ProblemBuilder {
            config: self.config,
            matrix_provider,
        }
    }

    pub fn build(
        &self,
        origin: &NodeRecord,
        destinations: &[NodeRecord],
        constraints: Constraints,
        preferences: Preferences,
    ) -> Result<OptimizationProblem> {
        let origin = Node::from_record(origin)?;
        let destinations = destinations
            .iter()
            .map(Node::from_record)
            .collect::<Result<Vec<_>>>()?;

        if let Some(max_stops) = constraints.max_stops {
            if destinations.len() > max_stops {
                return Err(OptimizerError::InvalidInput(format!(
                    "{} destinations exceed the limit of {} stops",
                    destinations.len(),
                    max_stops
                )));
            }
        }

        let objective_weights = match &preferences.objective_weights {
            Some(raw) => ObjectiveWeights::normalized(raw)?,
            None => ObjectiveWeights::default(),
        };

        let speed_kmh = preferences.average_speed_kmh.unwrap_or(self.config.average_speed_kmh);
        if !speed_kmh.is_finite() || speed_kmh <= 0.0 {
            return Err(OptimizerError::InvalidInput(format!(
                "average speed must be positive, got {}",
                speed_kmh
            )));
        }

        let service_minutes = preferences
            .service_minutes_per_stop
            .unwrap_or(self.config.service_minutes_per_stop)
            .max(0.0);

        let locations: Vec<Coordinate> = std::iter::once(origin.coordinate)
            .chain(destinations.iter().map(|node| node.coordinate))
            .collect();
        let distance_matrix = self.matrix_provider.distance_matrix(&locations);
        validate_matrix(&distance_matrix, locations.len())?;

        let time_matrix = distance_matrix
            .iter()
            .map(|row| row.iter().map(|km| km / speed_kmh * 60.0).collect())
            .collect();

        Ok(OptimizationProblem {
            origin,
            destinations,
            distance_matrix,
            time_matrix,
            constraints,
            objective_weights,
            service_minutes_per_stop: service_minutes,
            fuel_model: self.config.fuel.clone(),
            enriched: false,
            conditions: None,
        })
    }
}

fn validate_matrix(matrix: &[Vec<f64>], size: usize) -> Result<()> {
    if matrix.len() != size || matrix.iter().any(|row| row.len() != size) {
        return Err(OptimizerError::InvalidInput(format!(
            "distance matrix must be {}x{}",
            size, size
        )));
    }

    for (i, row) in matrix.iter().enumerate() {
        for (j, value) in row.iter().enumerate() {
            if !value.is_finite() || *value < 0.0 || (i == j && *value != 0.0) {
                return Err(OptimizerError::InvalidInput(format!(
                    "distance matrix entry ({}, {}) is invalid: {}",
                    i, j, value
                )));
            }
        }
    }

    Ok(())
}
