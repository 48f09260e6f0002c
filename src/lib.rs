//! route-optimizer core
//!
//! Multi-strategy route optimization for waste-collection fleets: builds a
//! routing problem from bin records, runs several search strategies side by
//! side, blends their results and learns which strategies win over time.
//! In-flight routes are watched by a separate monitor.

pub mod conditions;
pub mod config;
pub mod construction;
pub mod ensemble;
pub mod error;
pub mod haversine;
pub mod history;
pub mod local_search;
pub mod model;
pub mod monitor;
pub mod objective;
pub mod optimizer;
pub mod problem;
pub mod runners;
pub mod scheduler;
pub mod selector;
pub mod traits;

pub use config::OptimizerConfig;
pub use error::{OptimizerError, Result};
pub use model::{Algorithm, AlgorithmRun, Constraints, Coordinate, Node, NodeRecord, RouteSolution};
pub use optimizer::{RouteOptimizer, RouteRequest};
pub use problem::{OptimizationProblem, Preferences, ProblemBuilder};
pub use runners::{Cancellation, RouteStrategy};
