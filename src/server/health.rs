//! Health, metrics and endpoint index routes
//!
//! Serves monitoring endpoints for operators and container orchestration.

use super::{with_state, AppState};
use crate::config::DiscoveryMode;
use crate::observability::metrics::metrics;
use serde::Serialize;
use std::collections::BTreeMap;
use std::convert::Infallible;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

const HEALTHY: &str = "healthy";

#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    pub status: String,
    pub message: Option<String>,
    pub last_check: u64,
}

impl HealthCheck {
    fn healthy(message: impl Into<String>) -> Self {
        Self {
            status: HEALTHY.to_string(),
            message: Some(message.into()),
            last_check: current_timestamp(),
        }
    }

    fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            status: "unhealthy".to_string(),
            message: Some(message.into()),
            last_check: current_timestamp(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: u64,
    pub router_id: String,
    pub uptime_seconds: u64,
    pub checks: BTreeMap<String, HealthCheck>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status == HEALTHY
    }
}

#[derive(Debug, Serialize)]
struct EndpointIndex {
    endpoints: BTreeMap<&'static str, &'static str>,
}

/// Evaluate every check against the current state
pub fn health_status(state: &AppState) -> HealthStatus {
    let mut checks = BTreeMap::new();
    checks.insert("directory".to_string(), check_directory(state));
    checks.insert("discovery".to_string(), check_discovery(state));
    checks.insert(
        "dynamic_agents".to_string(),
        HealthCheck::healthy(format!(
            "{} dynamic agents cached",
            state.executor.factory().len()
        )),
    );

    let overall_healthy = checks.values().all(|check| check.status == HEALTHY);
    metrics().update_health_status(overall_healthy);

    HealthStatus {
        status: if overall_healthy { HEALTHY } else { "degraded" }.to_string(),
        timestamp: current_timestamp(),
        router_id: state.config.router.id.clone(),
        uptime_seconds: metrics().get_metrics().lifecycle.uptime_seconds,
        checks,
    }
}

fn check_directory(state: &AppState) -> HealthCheck {
    let snapshot = state.directory.snapshot();
    let skipped = snapshot.load_errors().len();

    // An empty directory only matters when discovery is answered locally
    if snapshot.is_empty() && state.config.discovery.mode == DiscoveryMode::Local {
        return HealthCheck::unhealthy(format!(
            "No agent cards loaded from {} ({skipped} skipped)",
            state.config.directory.cards_dir.display()
        ));
    }

    HealthCheck::healthy(format!(
        "{} agent cards loaded ({skipped} skipped)",
        snapshot.len()
    ))
}

fn check_discovery(state: &AppState) -> HealthCheck {
    match state.config.discovery.mode {
        DiscoveryMode::Local => HealthCheck::healthy("Local keyword discovery"),
        DiscoveryMode::Remote => HealthCheck::healthy(format!(
            "Remote discovery at {}",
            state.config.discovery.base_url.as_deref().unwrap_or("<unset>")
        )),
    }
}

/// GET /health, GET /metrics and GET /
pub fn routes(
    state: AppState,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    // GET /health - overall status with individual checks
    let health_route = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state))
        .and_then(|state: AppState| async move {
            let status = health_status(&state);
            let code = if status.is_healthy() {
                StatusCode::OK
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            Ok::<_, Infallible>(warp::reply::with_status(warp::reply::json(&status), code))
        });

    // GET /metrics - complete metrics export
    let metrics_route = warp::path("metrics")
        .and(warp::path::end())
        .and(warp::get())
        .and_then(|| async move {
            let snapshot = metrics().get_metrics();
            Ok::<_, Infallible>(warp::reply::json(&snapshot))
        });

    // GET / - endpoint index
    let root_route = warp::path::end().and(warp::get()).and_then(|| async move {
        Ok::<_, Infallible>(warp::reply::json(&endpoint_index()))
    });

    health_route.or(metrics_route).or(root_route)
}

fn endpoint_index() -> EndpointIndex {
    let endpoints = BTreeMap::from([
        ("POST /query", "Route free text to the best matching agent"),
        ("POST /a2a", "Inbound JSON-RPC handled by a dynamic agent"),
        ("GET /.well-known/agent.json", "Agent card of this router"),
        ("POST /tools/call", "find_agent_simple directory lookup"),
        ("GET /resources/read", "Agent card list or a single card by uri"),
        ("POST /directory/reload", "Re-read the agent card directory"),
        ("GET /health", "Overall health status with detailed checks"),
        ("GET /metrics", "Routing, discovery and bridge statistics"),
    ]);
    EndpointIndex { endpoints }
}

fn current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
