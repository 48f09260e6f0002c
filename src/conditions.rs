//! Live traffic/weather conditions and problem enrichment.

use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{OptimizerError, Result};
use crate::model::Coordinate;
use crate::problem::OptimizationProblem;
use crate::traits::ConditionsFeed;

/// Region covered by a problem's nodes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lng: f64,
    pub max_lat: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    pub fn around(points: &[Coordinate]) -> Self {
        let mut area = BoundingBox {
            min_lat: f64::INFINITY,
            min_lng: f64::INFINITY,
            max_lat: f64::NEG_INFINITY,
            max_lng: f64::NEG_INFINITY,
        };
        for point in points {
            area.min_lat = area.min_lat.min(point.latitude);
            area.min_lng = area.min_lng.min(point.longitude);
            area.max_lat = area.max_lat.max(point.latitude);
            area.max_lng = area.max_lng.max(point.longitude);
        }
        area
    }

    /// Smallest box covering both.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min_lat: self.min_lat.min(other.min_lat),
            min_lng: self.min_lng.min(other.min_lng),
            max_lat: self.max_lat.max(other.max_lat),
            max_lng: self.max_lng.max(other.max_lng),
        }
    }

    pub fn contains(&self, point: Coordinate) -> bool {
        point.latitude >= self.min_lat
            && point.latitude <= self.max_lat
            && point.longitude >= self.min_lng
            && point.longitude <= self.max_lng
    }
}

/// Impact scalars in [0, 1]; 0 means no slowdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conditions {
    pub traffic_impact: f64,
    pub weather_impact: f64,
}

impl Conditions {
    pub fn new(traffic_impact: f64, weather_impact: f64) -> Self {
        Self {
            traffic_impact,
            weather_impact,
        }
        .clamped()
    }

    pub fn clamped(self) -> Self {
        let clamp = |value: f64| if value.is_finite() { value.clamp(0.0, 1.0) } else { 0.0 };
        Self {
            traffic_impact: clamp(self.traffic_impact),
            weather_impact: clamp(self.weather_impact),
        }
    }

    /// Multiplier applied to travel times; never below 1.
    pub fn time_factor(&self) -> f64 {
        (1.0 + self.traffic_impact + self.weather_impact).max(1.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionsFeedConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for ConditionsFeedConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout_secs: 4,
        }
    }
}

/// HTTP adapter for a traffic/weather service.
///
/// Issues `GET {base_url}/conditions?minLat=..&minLng=..&maxLat=..&maxLng=..&at=..`
/// and expects `{"trafficImpact": f64, "weatherImpact": f64}`.
#[derive(Debug, Clone)]
pub struct HttpConditionsFeed {
    config: ConditionsFeedConfig,
    client: reqwest::blocking::Client,
}

impl HttpConditionsFeed {
    pub fn new(config: ConditionsFeedConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }
}

impl ConditionsFeed for HttpConditionsFeed {
    fn conditions(&self, area: &BoundingBox, at: DateTime<Utc>) -> Result<Conditions> {
        let url = format!(
            "{}/conditions?minLat={:.6}&minLng={:.6}&maxLat={:.6}&maxLng={:.6}&at={}",
            self.config.base_url.trim_end_matches('/'),
            area.min_lat,
            area.min_lng,
            area.max_lat,
            area.max_lng,
            at.to_rfc3339_opts(SecondsFormat::Secs, true)
        );

        let body = self
            .client
            .get(url)
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.json::<ConditionsResponse>())?;

        Ok(Conditions::new(body.traffic_impact, body.weather_impact))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConditionsResponse {
    #[serde(default)]
    traffic_impact: f64,
    #[serde(default)]
    weather_impact: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// Upper bound on how long optimization waits for live conditions.
    pub timeout_ms: u64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self { timeout_ms: 4000 }
    }
}

/// Queries `feed` on a worker thread and waits at most `timeout`.
///
/// A feed that hangs is abandoned; its thread finishes on its own.
pub fn fetch_with_timeout(
    feed: Arc<dyn ConditionsFeed>,
    area: BoundingBox,
    at: DateTime<Utc>,
    timeout: Duration,
) -> Result<Conditions> {
    let (sender, receiver) = mpsc::channel();
    thread::Builder::new()
        .name("conditions-feed".to_string())
        .spawn(move || {
            let _ = sender.send(feed.conditions(&area, at));
        })?;

    match receiver.recv_timeout(timeout) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(OptimizerError::EnrichmentTimeout),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(OptimizerError::ConditionsUnavailable(
            "conditions worker exited without answering".to_string(),
        )),
    }
}

/// Applies live conditions to the time matrix.
///
/// Failure is never fatal: the problem comes back unmodified with
/// `enriched == false`.
pub fn enrich(
    mut problem: OptimizationProblem,
    feed: Option<Arc<dyn ConditionsFeed>>,
    config: &EnrichmentConfig,
    at: DateTime<Utc>,
) -> OptimizationProblem {
    let Some(feed) = feed else {
        return problem;
    };
    if problem.is_empty() {
        return problem;
    }

    let area = problem.bounding_box();
    let timeout = Duration::from_millis(config.timeout_ms);
    match fetch_with_timeout(feed, area, at, timeout) {
        Ok(conditions) => {
            let factor = conditions.time_factor();
            for row in problem.time_matrix.iter_mut() {
                for minutes in row.iter_mut() {
                    *minutes *= factor;
                }
            }
            debug!(
                traffic = conditions.traffic_impact,
                weather = conditions.weather_impact,
                factor,
                "applied live conditions"
            );
            problem.enriched = true;
            problem.conditions = Some(conditions);
        }
        Err(err) => {
            warn!(error = %err, "live conditions unavailable, using static matrices");
            problem.enriched = false;
        }
    }

    problem
}
