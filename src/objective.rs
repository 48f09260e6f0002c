//! Objectives, weights and the tour evaluator every runner shares.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::construction::nearest_neighbor_order;
use crate::error::{OptimizerError, Result};
use crate::model::{Algorithm, RouteMetrics, RouteSolution};
use crate::problem::OptimizationProblem;

const EPSILON: f64 = 1e-9;

/// Search cost added per unit of relative overshoot of the duration limit.
const DURATION_PENALTY: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    MinimizeDistance,
    MinimizeTime,
    MinimizeFuel,
    MaximizeEfficiency,
    MinimizeEmissions,
    MaximizeServiceLevel,
}

impl Objective {
    pub const ALL: [Objective; 6] = [
        Objective::MinimizeDistance,
        Objective::MinimizeTime,
        Objective::MinimizeFuel,
        Objective::MaximizeEfficiency,
        Objective::MinimizeEmissions,
        Objective::MaximizeServiceLevel,
    ];

    pub fn is_maximized(&self) -> bool {
        matches!(self, Objective::MaximizeEfficiency | Objective::MaximizeServiceLevel)
    }

    pub fn value(&self, metrics: &RouteMetrics) -> f64 {
        match self {
            Objective::MinimizeDistance => metrics.distance_km,
            Objective::MinimizeTime => metrics.time_minutes,
            Objective::MinimizeFuel => metrics.fuel_litres,
            Objective::MaximizeEfficiency => metrics.efficiency,
            Objective::MinimizeEmissions => metrics.emissions_kg,
            Objective::MaximizeServiceLevel => metrics.service_level,
        }
    }
}

/// Relative importance of each objective; always sums to 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveWeights {
    weights: HashMap<Objective, f64>,
}

impl Default for ObjectiveWeights {
    fn default() -> Self {
        let weights = HashMap::from([
            (Objective::MinimizeDistance, 0.25),
            (Objective::MinimizeTime, 0.25),
            (Objective::MinimizeFuel, 0.20),
            (Objective::MaximizeEfficiency, 0.15),
            (Objective::MinimizeEmissions, 0.10),
            (Objective::MaximizeServiceLevel, 0.05),
        ]);
        Self { weights }
    }
}

impl ObjectiveWeights {
    /// Normalizes caller-supplied weights so they sum to 1.
    ///
    /// Objectives missing from `raw` get weight 0.
    pub fn normalized(raw: &HashMap<Objective, f64>) -> Result<Self> {
        if raw.values().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(OptimizerError::InvalidInput(
                "objective weights must be finite and non-negative".to_string(),
            ));
        }

        let total: f64 = raw.values().sum();
        if total <= EPSILON {
            return Err(OptimizerError::InvalidInput(
                "objective weights must not all be zero".to_string(),
            ));
        }

        let weights = Objective::ALL
            .iter()
            .map(|objective| (*objective, raw.get(objective).copied().unwrap_or(0.0) / total))
            .collect();
        Ok(Self { weights })
    }

    pub fn get(&self, objective: Objective) -> f64 {
        self.weights.get(&objective).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Objective, f64)> + '_ {
        Objective::ALL.iter().map(|objective| (*objective, self.get(*objective)))
    }
}

/// Diesel refuse-truck consumption model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FuelModel {
    pub litres_per_km: f64,
    /// Extra consumption at full load, as a fraction of the empty rate.
    pub load_factor: f64,
    pub co2_kg_per_litre: f64,
}

impl Default for FuelModel {
    fn default() -> Self {
        Self {
            litres_per_km: 0.35,
            load_factor: 0.3,
            co2_kg_per_litre: 2.68,
        }
    }
}

/// Scores tours of one problem.
///
/// Search cost is relative to the nearest-neighbour tour of the same problem,
/// so a cost of 1.0 means "as good as the greedy baseline".
#[derive(Debug, Clone)]
pub struct Evaluator<'a> {
    problem: &'a OptimizationProblem,
    reference: RouteMetrics,
}

impl<'a> Evaluator<'a> {
    pub fn new(problem: &'a OptimizationProblem) -> Self {
        let mut evaluator = Self {
            problem,
            reference: RouteMetrics::default(),
        };
        evaluator.reference = evaluator.metrics(&nearest_neighbor_order(&problem.distance_matrix));
        evaluator
    }

    pub fn problem(&self) -> &'a OptimizationProblem {
        self.problem
    }

    pub fn reference(&self) -> &RouteMetrics {
        &self.reference
    }

    pub fn metrics(&self, order: &[usize]) -> RouteMetrics {
        let problem = self.problem;
        let fuel = &problem.fuel_model;
        let capacity = problem.constraints.vehicle_capacity.filter(|c| *c > EPSILON);
        let n = order.len();

        let mut metrics = RouteMetrics::default();
        let mut load = 0.0;
        let mut weighted_service = 0.0;
        let mut total_weight = 0.0;
        let mut previous = 0;

        let drive = |metrics: &mut RouteMetrics, from: usize, to: usize, load: f64| {
            let leg = problem.distance_matrix[from][to];
            let load_fraction = capacity.map(|c| (load / c).clamp(0.0, 1.0)).unwrap_or(0.0);
            metrics.distance_km += leg;
            metrics.time_minutes += problem.time_matrix[from][to];
            metrics.fuel_litres += leg * fuel.litres_per_km * (1.0 + fuel.load_factor * load_fraction);
        };

        for (position, &destination) in order.iter().enumerate() {
            let node = &problem.destinations[destination];
            let index = destination + 1;
            drive(&mut metrics, previous, index, load);
            metrics.time_minutes += problem.service_minutes_per_stop;
            load += node.demand();

            let weight = node.service_weight();
            weighted_service += weight * (n - position) as f64 / n as f64;
            total_weight += weight;
            previous = index;
        }
        if n > 0 {
            drive(&mut metrics, previous, 0, load);
        }

        metrics.emissions_kg = metrics.fuel_litres * fuel.co2_kg_per_litre;
        let served = if load > EPSILON { load } else { n as f64 };
        metrics.efficiency = if metrics.distance_km > EPSILON {
            served / metrics.distance_km
        } else {
            0.0
        };
        metrics.service_level = if total_weight > EPSILON {
            weighted_service / total_weight
        } else {
            1.0
        };
        metrics
    }

    pub fn cost(&self, order: &[usize]) -> f64 {
        self.cost_of(&self.metrics(order))
    }

    pub fn cost_of(&self, metrics: &RouteMetrics) -> f64 {
        let weighted: f64 = self
            .problem
            .objective_weights
            .iter()
            .map(|(objective, weight)| {
                let value = objective.value(metrics);
                let reference = objective.value(&self.reference);
                let ratio = if objective.is_maximized() {
                    (reference + EPSILON) / (value + EPSILON)
                } else {
                    (value + EPSILON) / (reference + EPSILON)
                };
                weight * ratio
            })
            .sum();

        weighted + self.duration_overshoot(metrics) * DURATION_PENALTY
    }

    pub fn is_feasible(&self, metrics: &RouteMetrics) -> bool {
        let constraints = &self.problem.constraints;
        let within_capacity = match constraints.vehicle_capacity {
            Some(capacity) => self.problem.total_demand() <= capacity + EPSILON,
            None => true,
        };
        within_capacity && self.duration_overshoot(metrics) <= 0.0
    }

    pub fn solution(&self, order: Vec<usize>, algorithm: Algorithm) -> RouteSolution {
        let metrics = self.metrics(&order);
        RouteSolution {
            order,
            total_distance: metrics.distance_km,
            total_time: metrics.time_minutes,
            estimated_fuel: metrics.fuel_litres,
            estimated_emissions: metrics.emissions_kg,
            algorithm_source: algorithm,
            quality_score: 0.0,
            feasible: self.is_feasible(&metrics),
            metrics,
            fallback: false,
            enriched: self.problem.enriched,
        }
    }

    fn duration_overshoot(&self, metrics: &RouteMetrics) -> f64 {
        match self.problem.constraints.max_duration_minutes {
            Some(limit) if limit > EPSILON && metrics.time_minutes > limit => {
                (metrics.time_minutes - limit) / limit
            }
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Constraints, NodeRecord};
    use crate::problem::{Preferences, ProblemBuilder, ProblemConfig};

    fn problem(constraints: Constraints) -> OptimizationProblem {
        let origin = NodeRecord::new("depot", 25.2854, 51.5310);
        let destinations = vec![
            NodeRecord::new("a", 25.30, 51.53).with_fill_level(60.0),
            NodeRecord::new("b", 25.28, 51.55).with_fill_level(20.0),
            NodeRecord::new("c", 25.29, 51.52).with_fill_level(90.0).with_priority(3),
        ];
        ProblemBuilder::new(ProblemConfig::default())
            .build(&origin, &destinations, constraints, Preferences::default())
            .unwrap()
    }

    #[test]
    fn test_default_weights_sum_to_one() {
        let total: f64 = ObjectiveWeights::default().iter().map(|(_, w)| w).sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_normalized_weights() {
        let raw = HashMap::from([(Objective::MinimizeDistance, 3.0), (Objective::MinimizeTime, 1.0)]);
        let weights = ObjectiveWeights::normalized(&raw).unwrap();
        assert!((weights.get(Objective::MinimizeDistance) - 0.75).abs() < 1e-12);
        assert_eq!(weights.get(Objective::MinimizeFuel), 0.0);
    }

    #[test]
    fn test_zero_weights_rejected() {
        let raw = HashMap::from([(Objective::MinimizeDistance, 0.0)]);
        assert!(ObjectiveWeights::normalized(&raw).is_err());
    }

    #[test]
    fn test_nearest_neighbour_costs_one() {
        let problem = problem(Constraints::default());
        let evaluator = Evaluator::new(&problem);
        let order = nearest_neighbor_order(&problem.distance_matrix);
        assert!((evaluator.cost(&order) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_distance_reproducible_from_matrix() {
        let problem = problem(Constraints::default());
        let evaluator = Evaluator::new(&problem);
        let order = vec![2, 0, 1];
        let m = &problem.distance_matrix;
        let expected = m[0][3] + m[3][1] + m[1][2] + m[2][0];
        assert!((evaluator.metrics(&order).distance_km - expected).abs() < 1e-9);
    }

    #[test]
    fn test_service_level_prefers_urgent_first() {
        let problem = problem(Constraints::default());
        let evaluator = Evaluator::new(&problem);
        let urgent_first = evaluator.metrics(&[2, 0, 1]).service_level;
        let urgent_last = evaluator.metrics(&[1, 0, 2]).service_level;
        assert!(urgent_first > urgent_last);
    }

    #[test]
    fn test_capacity_marks_infeasible() {
        let problem = problem(Constraints {
            vehicle_capacity: Some(100.0),
            ..Constraints::default()
        });
        let evaluator = Evaluator::new(&problem);
        let solution = evaluator.solution(vec![0, 1, 2], Algorithm::Genetic);
        assert!(!solution.feasible);
    }

    #[test]
    fn test_duration_limit_penalized() {
        let relaxed = problem(Constraints::default());
        let tight = problem(Constraints {
            max_duration_minutes: Some(1.0),
            ..Constraints::default()
        });
        let order = [0, 1, 2];
        let relaxed_cost = Evaluator::new(&relaxed).cost(&order);
        let tight_cost = Evaluator::new(&tight).cost(&order);
        assert!(tight_cost > relaxed_cost);
    }

    #[test]
    fn test_empty_tour_is_zero() {
        let origin = NodeRecord::new("depot", 25.2854, 51.5310);
        let problem = ProblemBuilder::new(ProblemConfig::default())
            .build(&origin, &[], Constraints::default(), Preferences::default())
            .unwrap();
        let metrics = Evaluator::new(&problem).metrics(&[]);
        assert_eq!(metrics.distance_km, 0.0);
        assert_eq!(metrics.time_minutes, 0.0);
    }
}
