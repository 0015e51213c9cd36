//! Health checks served by the health reserved route.
//!
//! - `{health_path}` - full report with every indicator
//! - `{health_path}/live` - liveness: only indicators marked for liveness
//! - `{health_path}/ready` - readiness: same as the full report
//!
//! The overall status is `DOWN` if any component is down, `DEGRADED` if
//! any is degraded, otherwise `UP`. `DOWN` maps to 503.

use crate::application::ServerStats;
use crate::http::HttpResponse;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Health status of a component or the overall application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Up,
    /// Functioning, with issues
    Degraded,
    Down,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Up | HealthStatus::Degraded)
    }

    pub fn http_status_code(&self) -> u16 {
        match self {
            HealthStatus::Up | HealthStatus::Degraded => 200,
            HealthStatus::Down => 503,
        }
    }
}

/// Result of a health check for a single component.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, String>,
}

impl HealthCheckResult {
    pub fn new(name: impl Into<String>, status: HealthStatus) -> Self {
        Self {
            name: name.into(),
            status,
            details: BTreeMap::new(),
        }
    }

    pub fn up(name: impl Into<String>) -> Self {
        Self::new(name, HealthStatus::Up)
    }

    pub fn degraded(name: impl Into<String>) -> Self {
        Self::new(name, HealthStatus::Degraded)
    }

    pub fn down(name: impl Into<String>) -> Self {
        Self::new(name, HealthStatus::Down)
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.details.insert(key.into(), value.to_string());
        self
    }
}

/// A component check run on every health request.
pub trait HealthIndicator: Send + Sync {
    fn name(&self) -> &str;

    fn check(&self) -> HealthCheckResult;

    /// Whether the liveness probe runs this check.
    fn include_in_liveness(&self) -> bool {
        false
    }
}

/// Which probe is being answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthProbe {
    Full,
    Liveness,
    Readiness,
}

/// Aggregated health report
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub timestamp: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<HealthCheckResult>,
}

impl HealthReport {
    pub fn to_response(&self) -> HttpResponse {
        match serde_json::to_value(self) {
            Ok(body) => HttpResponse::new(self.status.http_status_code())
                .with_header("Cache-Control", "no-store")
                .with_json_value(&body),
            Err(_) => HttpResponse::internal_server_error(),
        }
    }
}

/// Runs the registered indicators.
#[derive(Clone)]
pub struct HealthService {
    indicators: Vec<Arc<dyn HealthIndicator>>,
    started_at: Instant,
}

impl Default for HealthService {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthService {
    pub fn new() -> Self {
        Self {
            indicators: Vec::new(),
            started_at: Instant::now(),
        }
    }

    pub fn register(&mut self, indicator: impl HealthIndicator + 'static) {
        self.indicators.push(Arc::new(indicator));
    }

    pub fn indicator_names(&self) -> Vec<&str> {
        self.indicators.iter().map(|i| i.name()).collect()
    }

    pub fn check(&self, probe: HealthProbe) -> HealthReport {
        let components: Vec<HealthCheckResult> = self
            .indicators
            .iter()
            .filter(|indicator| probe != HealthProbe::Liveness || indicator.include_in_liveness())
            .map(|indicator| indicator.check())
            .collect();

        let status = if components.iter().any(|c| c.status == HealthStatus::Down) {
            HealthStatus::Down
        } else if components.iter().any(|c| c.status == HealthStatus::Degraded) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Up
        };

        HealthReport {
            status,
            version: env!("CARGO_PKG_VERSION"),
            uptime_seconds: self.started_at.elapsed().as_secs(),
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            components,
        }
    }
}

/// Reports connection and request counters of the running server.
pub struct ServerHealthIndicator {
    stats: Arc<ServerStats>,
}

impl ServerHealthIndicator {
    pub fn new(stats: Arc<ServerStats>) -> Self {
        Self { stats }
    }
}

impl HealthIndicator for ServerHealthIndicator {
    fn name(&self) -> &str {
        "server"
    }

    fn check(&self) -> HealthCheckResult {
        HealthCheckResult::up("server")
            .with_detail("active_connections", self.stats.active_connections())
            .with_detail("requests", self.stats.requests())
            .with_detail("server_errors", self.stats.server_errors())
            .with_detail("websocket_upgrades", self.stats.websocket_upgrades())
    }

    fn include_in_liveness(&self) -> bool {
        true
    }
}
