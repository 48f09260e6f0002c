//! Real-time monitoring of in-flight routes.
//!
//! Each tick pulls the active routes from the dispatch system, assesses
//! delay, progress deviation and traffic/weather impact, publishes alerts to
//! subscribers and offers re-optimization suggestions back to dispatch.
//! The monitor owns no timer; the host drives [`RouteMonitor::tick`], usually
//! through [`RouteMonitor::schedule`].

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::conditions::{BoundingBox, Conditions, fetch_with_timeout};
use crate::error::{OptimizerError, Result};
use crate::model::Coordinate;
use crate::scheduler::Scheduler;
use crate::traits::{ActiveRouteSource, ConditionsFeed};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteStatus {
    Active,
    OnTrack,
    Delayed,
    Deviated,
    Completed,
    Cancelled,
}

impl RouteStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RouteStatus::Completed | RouteStatus::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Waypoint {
    pub id: String,
    pub completed: bool,
    #[serde(default)]
    pub coordinate: Option<Coordinate>,
}

/// A route currently being driven, as reported by dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoredRoute {
    pub route_id: String,
    pub driver_id: String,
    pub start_time: DateTime<Utc>,
    pub planned_duration_minutes: f64,
    #[serde(default)]
    pub current_position: Option<Coordinate>,
    pub waypoints: Vec<Waypoint>,
    pub status: RouteStatus,
}

impl MonitoredRoute {
    pub fn completed_fraction(&self) -> Option<f64> {
        if self.waypoints.is_empty() {
            return None;
        }
        let done = self.waypoints.iter().filter(|w| w.completed).count();
        Some(done as f64 / self.waypoints.len() as f64)
    }

    pub fn remaining_waypoints(&self) -> Vec<String> {
        self.waypoints
            .iter()
            .filter(|w| !w.completed)
            .map(|w| w.id.clone())
            .collect()
    }

    fn area(&self) -> Option<BoundingBox> {
        let points: Vec<Coordinate> = self
            .current_position
            .into_iter()
            .chain(self.waypoints.iter().filter_map(|w| w.coordinate))
            .collect();
        (!points.is_empty()).then(|| BoundingBox::around(&points))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    Delay,
    Deviation,
    Traffic,
    Weather,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Grades how far `value` is past `threshold`.
    pub fn grade(value: f64, threshold: f64) -> Self {
        let ratio = if threshold > 0.0 { value / threshold } else { f64::INFINITY };
        if ratio < 1.5 {
            Severity::Low
        } else if ratio < 2.0 {
            Severity::Medium
        } else if ratio < 3.0 {
            Severity::High
        } else {
            Severity::Critical
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    #[serde(rename = "type")]
    pub kind: AlertType,
    pub route_id: String,
    pub severity: Severity,
    pub details: String,
    pub recommendations: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Offered to dispatch; never applied automatically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReoptimizationSuggestion {
    pub route_id: String,
    pub driver_id: String,
    pub reasons: Vec<String>,
    pub remaining_waypoints: Vec<String>,
    pub delay_minutes: f64,
    pub deviation: f64,
    pub traffic_impact: f64,
    pub timestamp: DateTime<Utc>,
}

/// Metrics computed for one route in one tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteAssessment {
    pub elapsed_minutes: f64,
    pub delay_minutes: f64,
    pub expected_progress: f64,
    pub actual_progress: f64,
    pub deviation: f64,
    pub traffic_impact: f64,
    pub weather_impact: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub interval_secs: u64,
    pub delay_threshold_minutes: f64,
    pub deviation_threshold: f64,
    pub traffic_threshold: f64,
    pub weather_threshold: f64,
    pub suggestion_delay_minutes: f64,
    pub suggestion_deviation: f64,
    pub suggestion_traffic: f64,
    /// UTC hours treated as rush hour when no conditions feed is available.
    pub peak_hours: Vec<u32>,
    pub peak_traffic_impact: f64,
    pub off_peak_traffic_impact: f64,
    pub conditions_timeout_ms: u64,
    /// Finished routes held for [`RouteMonitor::drain_archived`]; the oldest
    /// are dropped beyond this.
    pub archive_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            delay_threshold_minutes: 10.0,
            deviation_threshold: 0.25,
            traffic_threshold: 0.5,
            weather_threshold: 0.3,
            suggestion_delay_minutes: 5.0,
            suggestion_deviation: 0.15,
            suggestion_traffic: 0.3,
            peak_hours: vec![7, 8, 16, 17, 18],
            peak_traffic_impact: 0.4,
            off_peak_traffic_impact: 0.1,
            conditions_timeout_ms: 4000,
            archive_capacity: 500,
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub assessed: usize,
    pub alerts: Vec<Alert>,
    pub suggestions: Vec<ReoptimizationSuggestion>,
    pub archived: Vec<String>,
}

pub struct RouteMonitor {
    source: Arc<dyn ActiveRouteSource>,
    feed: Option<Arc<dyn ConditionsFeed>>,
    config: MonitorConfig,
    subscribers: Mutex<Vec<Sender<Alert>>>,
    statuses: Mutex<HashMap<String, RouteStatus>>,
    archive: Mutex<VecDeque<MonitoredRoute>>,
    /// Finished routes dispatch still lists, so they are archived once.
    archived_ids: Mutex<HashSet<String>>,
}

impl RouteMonitor {
    pub fn new(
        source: Arc<dyn ActiveRouteSource>,
        feed: Option<Arc<dyn ConditionsFeed>>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            source,
            feed,
            config,
            subscribers: Mutex::new(Vec::new()),
            statuses: Mutex::new(HashMap::new()),
            archive: Mutex::new(VecDeque::new()),
            archived_ids: Mutex::new(HashSet::new()),
        }
    }

    /// Registers a new alert consumer. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> Receiver<Alert> {
        let (sender, receiver) = mpsc::channel();
        lock(&self.subscribers).push(sender);
        receiver
    }

    /// Registers the periodic tick on a host-owned scheduler.
    pub fn schedule(self: &Arc<Self>, scheduler: &mut Scheduler) -> Result<()> {
        let monitor = Arc::clone(self);
        let interval = Duration::from_secs(self.config.interval_secs.max(1));
        scheduler.every("route-monitor", interval, move || {
            // A failed tick is already logged; the next interval retries.
            let _ = monitor.tick();
        })
    }

    pub fn tick(&self) -> Result<TickReport> {
        self.tick_at(Utc::now())
    }

    /// Runs one monitoring pass as of `now`.
    ///
    /// Fails with `MonitoringDataUnavailable` when dispatch cannot list the
    /// active routes; nothing is published for that tick.
    pub fn tick_at(&self, now: DateTime<Utc>) -> Result<TickReport> {
        let routes = match self.source.active_routes() {
            Ok(routes) => routes,
            Err(err) => {
                warn!(error = %err, "skipping monitor tick, active routes unavailable");
                return Err(match err {
                    OptimizerError::MonitoringDataUnavailable(_) => err,
                    other => OptimizerError::MonitoringDataUnavailable(other.to_string()),
                });
            }
        };

        let seen: HashSet<String> = routes.iter().map(|route| route.route_id.clone()).collect();
        let (finished, active): (Vec<MonitoredRoute>, Vec<MonitoredRoute>) =
            routes.into_iter().partition(|route| route.status.is_terminal());

        let mut report = TickReport::default();
        for route in finished {
            self.archive_route(route, &mut report);
        }

        // One feed call per tick, covering every active route.
        let area = active.iter().filter_map(MonitoredRoute::area).reduce(|a, b| a.union(&b));
        let conditions = self.conditions_in(area, now);

        for route in active {
            let assessment = self.evaluate(&route, conditions, now);
            report.assessed += 1;
            self.update_status(&route, &assessment);

            for alert in self.alerts_for(&route, &assessment, now) {
                info!(route = %alert.route_id, kind = ?alert.kind, severity = ?alert.severity, "route alert");
                self.publish(&alert);
                report.alerts.push(alert);
            }

            if let Some(suggestion) = self.suggestion_for(&route, &assessment, now) {
                self.source.suggest_reoptimization(suggestion.clone());
                report.suggestions.push(suggestion);
            }
        }

        // Routes dispatch no longer reports are no longer tracked.
        lock(&self.statuses).retain(|route_id, _| seen.contains(route_id));
        lock(&self.archived_ids).retain(|route_id| seen.contains(route_id));

        debug!(
            assessed = report.assessed,
            alerts = report.alerts.len(),
            suggestions = report.suggestions.len(),
            "monitor tick finished"
        );
        Ok(report)
    }

    /// Assesses a single route, fetching conditions for its own area.
    pub fn assess(&self, route: &MonitoredRoute, now: DateTime<Utc>) -> RouteAssessment {
        self.evaluate(route, self.conditions_in(route.area(), now), now)
    }

    pub fn status_of(&self, route_id: &str) -> Option<RouteStatus> {
        lock(&self.statuses).get(route_id).copied()
    }

    /// Takes the finished routes archived since the last call, oldest first.
    pub fn drain_archived(&self) -> Vec<MonitoredRoute> {
        lock(&self.archive).drain(..).collect()
    }

    fn evaluate(&self, route: &MonitoredRoute, conditions: Conditions, now: DateTime<Utc>) -> RouteAssessment {
        let elapsed_minutes = ((now - route.start_time).num_seconds().max(0) as f64) / 60.0;
        let planned = route.planned_duration_minutes;
        let delay_minutes = (elapsed_minutes - planned).max(0.0);

        let expected_progress = if planned > 0.0 {
            (elapsed_minutes / planned).clamp(0.0, 1.0)
        } else {
            1.0
        };
        let actual_progress = route.completed_fraction().unwrap_or(expected_progress);

        RouteAssessment {
            elapsed_minutes,
            delay_minutes,
            expected_progress,
            actual_progress,
            deviation: (expected_progress - actual_progress).abs(),
            traffic_impact: conditions.traffic_impact,
            weather_impact: conditions.weather_impact,
        }
    }

    fn conditions_in(&self, area: Option<BoundingBox>, now: DateTime<Utc>) -> Conditions {
        if let (Some(feed), Some(area)) = (&self.feed, area) {
            let timeout = Duration::from_millis(self.config.conditions_timeout_ms);
            match fetch_with_timeout(Arc::clone(feed), area, now, timeout) {
                Ok(conditions) => return conditions,
                Err(err) => debug!(error = %err, "using heuristic conditions"),
            }
        }

        let traffic = if self.config.peak_hours.contains(&now.hour()) {
            self.config.peak_traffic_impact
        } else {
            self.config.off_peak_traffic_impact
        };
        Conditions::new(traffic, 0.0)
    }

    fn update_status(&self, route: &MonitoredRoute, assessment: &RouteAssessment) {
        let status = if assessment.delay_minutes > self.config.delay_threshold_minutes {
            RouteStatus::Delayed
        } else if assessment.deviation > self.config.deviation_threshold {
            RouteStatus::Deviated
        } else {
            RouteStatus::OnTrack
        };

        let previous = lock(&self.statuses).insert(route.route_id.clone(), status);
        let previous = previous.unwrap_or(route.status);
        if previous != status {
            info!(route = %route.route_id, from = ?previous, to = ?status, "route status changed");
        }
    }

    fn archive_route(&self, route: MonitoredRoute, report: &mut TickReport) {
        lock(&self.statuses).remove(&route.route_id);
        if !lock(&self.archived_ids).insert(route.route_id.clone()) {
            return;
        }
        info!(route = %route.route_id, status = ?route.status, "archiving finished route");
        report.archived.push(route.route_id.clone());

        let mut archive = lock(&self.archive);
        archive.push_back(route);
        while archive.len() > self.config.archive_capacity {
            archive.pop_front();
        }
    }

    fn alerts_for(&self, route: &MonitoredRoute, assessment: &RouteAssessment, now: DateTime<Utc>) -> Vec<Alert> {
        let config = &self.config;
        let checks = [
            (
                AlertType::Delay,
                assessment.delay_minutes,
                config.delay_threshold_minutes,
                format!("route is {:.1} minutes behind schedule", assessment.delay_minutes),
            ),
            (
                AlertType::Deviation,
                assessment.deviation,
                config.deviation_threshold,
                format!(
                    "progress {:.0}% against {:.0}% expected",
                    assessment.actual_progress * 100.0,
                    assessment.expected_progress * 100.0
                ),
            ),
            (
                AlertType::Traffic,
                assessment.traffic_impact,
                config.traffic_threshold,
                format!("traffic impact {:.2}", assessment.traffic_impact),
            ),
            (
                AlertType::Weather,
                assessment.weather_impact,
                config.weather_threshold,
                format!("weather impact {:.2}", assessment.weather_impact),
            ),
        ];

        checks
            .into_iter()
            .filter(|(_, value, threshold, _)| value > threshold)
            .map(|(kind, value, threshold, details)| Alert {
                kind,
                route_id: route.route_id.clone(),
                severity: Severity::grade(value, threshold),
                details,
                recommendations: recommendations(kind),
                timestamp: now,
            })
            .collect()
    }

    fn suggestion_for(
        &self,
        route: &MonitoredRoute,
        assessment: &RouteAssessment,
        now: DateTime<Utc>,
    ) -> Option<ReoptimizationSuggestion> {
        let config = &self.config;
        let mut reasons = Vec::new();
        if assessment.delay_minutes > config.suggestion_delay_minutes {
            reasons.push(format!("delay of {:.1} minutes", assessment.delay_minutes));
        }
        if assessment.deviation > config.suggestion_deviation {
            reasons.push(format!("progress deviation of {:.2}", assessment.deviation));
        }
        if assessment.traffic_impact > config.suggestion_traffic {
            reasons.push(format!("traffic impact of {:.2}", assessment.traffic_impact));
        }
        if reasons.is_empty() {
            return None;
        }

        Some(ReoptimizationSuggestion {
            route_id: route.route_id.clone(),
            driver_id: route.driver_id.clone(),
            reasons,
            remaining_waypoints: route.remaining_waypoints(),
            delay_minutes: assessment.delay_minutes,
            deviation: assessment.deviation,
            traffic_impact: assessment.traffic_impact,
            timestamp: now,
        })
    }

    fn publish(&self, alert: &Alert) {
        lock(&self.subscribers).retain(|subscriber| subscriber.send(alert.clone()).is_ok());
    }
}

fn recommendations(kind: AlertType) -> Vec<String> {
    let lines: &[&str] = match kind {
        AlertType::Delay => &["Notify affected customers", "Consider re-optimizing the remaining stops"],
        AlertType::Deviation => &["Contact the driver to confirm progress", "Review remaining stop order"],
        AlertType::Traffic => &["Avoid congested corridors", "Shift non-urgent stops later"],
        AlertType::Weather => &["Reduce planned speed", "Postpone low-priority stops"],
    };
    lines.iter().map(|line| line.to_string()).collect()
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use chrono::{Duration as ChronoDuration, TimeZone};

    use super::*;

    #[test]
    fn test_severity_grades() {
        assert_eq!(Severity::grade(12.0, 10.0), Severity::Low);
        assert_eq!(Severity::grade(15.0, 10.0), Severity::Medium);
        assert_eq!(Severity::grade(25.0, 10.0), Severity::High);
        assert_eq!(Severity::grade(30.0, 10.0), Severity::Critical);
    }

    struct NoRoutes;

    impl ActiveRouteSource for NoRoutes {
        fn active_routes(&self) -> Result<Vec<MonitoredRoute>> {
            Ok(Vec::new())
        }

        fn suggest_reoptimization(&self, _suggestion: ReoptimizationSuggestion) {}
    }

    fn route(start: DateTime<Utc>, planned: f64, done: usize, total: usize) -> MonitoredRoute {
        MonitoredRoute {
            route_id: "r1".to_string(),
            driver_id: "d1".to_string(),
            start_time: start,
            planned_duration_minutes: planned,
            current_position: None,
            waypoints: (0..total)
                .map(|i| Waypoint {
                    id: format!("w{}", i),
                    completed: i < done,
                    coordinate: None,
                })
                .collect(),
            status: RouteStatus::Active,
        }
    }

    #[test]
    fn test_assessment_delay_and_deviation() {
        let monitor = RouteMonitor::new(Arc::new(NoRoutes), None, MonitorConfig::default());
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 11, 0, 0).unwrap();
        let assessment = monitor.assess(&route(now - ChronoDuration::minutes(75), 60.0, 1, 4), now);

        assert!((assessment.delay_minutes - 15.0).abs() < 1e-9);
        assert_eq!(assessment.expected_progress, 1.0);
        assert!((assessment.deviation - 0.75).abs() < 1e-9);
        assert!((assessment.traffic_impact - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_peak_hour_heuristic() {
        let monitor = RouteMonitor::new(Arc::new(NoRoutes), None, MonitorConfig::default());
        let rush = Utc.with_ymd_and_hms(2024, 5, 1, 8, 15, 0).unwrap();
        let assessment = monitor.assess(&route(rush, 60.0, 0, 2), rush);
        assert!((assessment.traffic_impact - 0.4).abs() < 1e-9);
        assert_eq!(assessment.delay_minutes, 0.0);
    }

    #[test]
    fn test_future_start_is_not_delayed() {
        let monitor = RouteMonitor::new(Arc::new(NoRoutes), None, MonitorConfig::default());
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 11, 0, 0).unwrap();
        let assessment = monitor.assess(&route(now + ChronoDuration::minutes(30), 60.0, 0, 2), now);
        assert_eq!(assessment.elapsed_minutes, 0.0);
        assert_eq!(assessment.deviation, 0.0);
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let monitor = RouteMonitor::new(Arc::new(NoRoutes), None, MonitorConfig::default());
        let kept = monitor.subscribe();
        drop(monitor.subscribe());

        let alert = Alert {
            kind: AlertType::Weather,
            route_id: "r1".to_string(),
            severity: Severity::Low,
            details: String::new(),
            recommendations: Vec::new(),
            timestamp: Utc::now(),
        };
        monitor.publish(&alert);

        assert_eq!(lock(&monitor.subscribers).len(), 1);
        assert_eq!(kept.try_recv().unwrap(), alert);
    }

    #[test]
    fn test_alert_serializes_type_field() {
        let alert = Alert {
            kind: AlertType::Delay,
            route_id: "r1".to_string(),
            severity: Severity::High,
            details: "late".to_string(),
            recommendations: vec![],
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 11, 0, 0).unwrap(),
        };
        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["type"], "delay");
        assert_eq!(json["severity"], "high");
        assert_eq!(json["routeId"], "r1");
    }
}
