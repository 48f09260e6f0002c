//! Collaborator seams of the optimizer.
//!
//! The optimizer core never talks to a data store, a traffic service or a
//! dispatch system directly. Hosts implement these traits for their own
//! infrastructure and inject them at construction time.

use chrono::{DateTime, Utc};

use crate::conditions::{BoundingBox, Conditions};
use crate::error::Result;
use crate::model::Coordinate;
use crate::monitor::{MonitoredRoute, ReoptimizationSuggestion};

/// Provides a distance matrix (kilometres) for a set of locations.
///
/// The matrix is indexed by the provided location order.
pub trait DistanceMatrixProvider {
    fn distance_matrix(&self, locations: &[Coordinate]) -> Vec<Vec<f64>>;
}

/// Live traffic and weather indicators for a region.
pub trait ConditionsFeed: Send + Sync {
    fn conditions(&self, area: &BoundingBox, at: DateTime<Utc>) -> Result<Conditions>;
}

/// The dispatch system: owner of the active routes.
pub trait ActiveRouteSource: Send + Sync {
    fn active_routes(&self) -> Result<Vec<MonitoredRoute>>;

    /// Offers a re-optimization; the dispatcher decides whether to apply it.
    fn suggest_reoptimization(&self, suggestion: ReoptimizationSuggestion);
}
