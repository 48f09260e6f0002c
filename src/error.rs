//! Error type shared by the optimization pipeline and the route monitor.

use std::fmt;
use std::io;

use crate::model::Algorithm;

pub type Result<T> = std::result::Result<T, OptimizerError>;

#[derive(Debug)]
pub enum OptimizerError {
    /// Malformed origin or destinations. Fatal: no runner is started.
    InvalidInput(String),
    /// A single runner failed or produced an invalid permutation.
    RunnerFailure { algorithm: Algorithm, reason: String },
    /// Every runner failed; the optimizer degrades to nearest-neighbour construction.
    AllRunnersFailed,
    /// The conditions feed did not answer within the enrichment timeout.
    EnrichmentTimeout,
    /// The conditions feed answered with an error.
    ConditionsUnavailable(String),
    /// The dispatch collaborator could not list active routes.
    MonitoringDataUnavailable(String),
    /// The caller cancelled an in-flight optimization.
    Cancelled,
    Http(reqwest::Error),
    Io(io::Error),
    Json(serde_json::Error),
}

impl fmt::Display for OptimizerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizerError::InvalidInput(message) => write!(f, "invalid input: {}", message),
            OptimizerError::RunnerFailure { algorithm, reason } => {
                write!(f, "{} runner failed: {}", algorithm, reason)
            }
            OptimizerError::AllRunnersFailed => write!(f, "all optimization runners failed"),
            OptimizerError::EnrichmentTimeout => write!(f, "real-time conditions timed out"),
            OptimizerError::ConditionsUnavailable(message) => {
                write!(f, "real-time conditions unavailable: {}", message)
            }
            OptimizerError::MonitoringDataUnavailable(message) => {
                write!(f, "active route data unavailable: {}", message)
            }
            OptimizerError::Cancelled => write!(f, "optimization cancelled"),
            OptimizerError::Http(err) => write!(f, "http error: {}", err),
            OptimizerError::Io(err) => write!(f, "io error: {}", err),
            OptimizerError::Json(err) => write!(f, "json error: {}", err),
        }
    }
}

impl std::error::Error for OptimizerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OptimizerError::Http(err) => Some(err),
            OptimizerError::Io(err) => Some(err),
            OptimizerError::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for OptimizerError {
    fn from(err: io::Error) -> Self {
        OptimizerError::Io(err)
    }
}

impl From<reqwest::Error> for OptimizerError {
    fn from(err: reqwest::Error) -> Self {
        OptimizerError::Http(err)
    }
}

impl From<serde_json::Error> for OptimizerError {
    fn from(err: serde_json::Error) -> Self {
        OptimizerError::Json(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_algorithm() {
        let err = OptimizerError::RunnerFailure {
            algorithm: Algorithm::AntColony,
            reason: "duplicate stop".to_string(),
        };
        assert_eq!(err.to_string(), "ant_colony runner failed: duplicate stop");
    }

    #[test]
    fn test_json_error_converts() {
        let parse = serde_json::from_str::<u32>("not json").unwrap_err();
        let err: OptimizerError = parse.into();
        assert!(matches!(err, OptimizerError::Json(_)));
        assert!(std::error::Error::source(&err).is_some());
    }
}
