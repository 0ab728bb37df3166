//! Thread-safe metrics collection system
//!
//! Atomic counters for the hot paths (queries, discovery, bridge calls) and
//! mutex-protected collections for timing data and per-agent statistics.

use crate::error::FailureKind;
use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Global metrics collector instance
pub static METRICS: Lazy<MetricsCollector> = Lazy::new(MetricsCollector::new);

/// Get reference to global metrics collector
pub fn metrics() -> &'static MetricsCollector {
    &METRICS
}

const MAX_SAMPLES: usize = 1000;

/// Thread-safe metrics collector using atomics and mutexes
pub struct MetricsCollector {
    // Orchestrator runs
    queries_received: AtomicU64,
    queries_in_flight: AtomicU64,
    queries_succeeded: AtomicU64,
    queries_failed: AtomicU64,
    query_times: Mutex<Vec<u64>>, // in milliseconds
    failures_by_kind: Mutex<HashMap<FailureKind, u64>>,

    // Discovery
    discovery_lookups: AtomicU64,
    discovery_fallbacks: AtomicU64,
    discovery_alternate_paths: AtomicU64,

    // Bridge
    envelope_fallbacks: AtomicU64,
    agent_stats: Mutex<HashMap<String, AgentCallStats>>,

    // Dynamic agents
    dynamic_agents_created: AtomicU64,
    inbound_requests: AtomicU64,

    // Lifecycle
    uptime_start: AtomicU64,
    directory_reloads: AtomicU64,
    health_status: AtomicBool,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            queries_received: AtomicU64::new(0),
            queries_in_flight: AtomicU64::new(0),
            queries_succeeded: AtomicU64::new(0),
            queries_failed: AtomicU64::new(0),
            query_times: Mutex::new(Vec::new()),
            failures_by_kind: Mutex::new(HashMap::new()),
            discovery_lookups: AtomicU64::new(0),
            discovery_fallbacks: AtomicU64::new(0),
            discovery_alternate_paths: AtomicU64::new(0),
            envelope_fallbacks: AtomicU64::new(0),
            agent_stats: Mutex::new(HashMap::new()),
            dynamic_agents_created: AtomicU64::new(0),
            inbound_requests: AtomicU64::new(0),
            uptime_start: AtomicU64::new(current_timestamp()),
            directory_reloads: AtomicU64::new(0),
            health_status: AtomicBool::new(true),
        }
    }

    // Query metrics
    pub fn query_received(&self) {
        self.queries_received.fetch_add(1, Ordering::Relaxed);
        self.queries_in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub fn query_succeeded(&self, duration: Duration) {
        self.queries_succeeded.fetch_add(1, Ordering::Relaxed);
        self.queries_in_flight.fetch_sub(1, Ordering::Relaxed);
        self.record_query_time(duration);
    }

    pub fn query_failed(&self, kind: FailureKind, duration: Duration) {
        self.queries_failed.fetch_add(1, Ordering::Relaxed);
        self.queries_in_flight.fetch_sub(1, Ordering::Relaxed);
        self.record_query_time(duration);

        if let Ok(mut by_kind) = self.failures_by_kind.lock() {
            *by_kind.entry(kind).or_insert(0) += 1;
        }
    }

    fn record_query_time(&self, duration: Duration) {
        if let Ok(mut times) = self.query_times.lock() {
            push_bounded(&mut times, duration.as_millis() as u64);
        }
    }

    // Discovery metrics
    pub fn discovery_lookup(&self) {
        self.discovery_lookups.fetch_add(1, Ordering::Relaxed);
    }

    pub fn discovery_fallback(&self) {
        self.discovery_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn discovery_alternate_path(&self) {
        self.discovery_alternate_paths.fetch_add(1, Ordering::Relaxed);
    }

    // Bridge metrics
    pub fn envelope_fallback(&self) {
        self.envelope_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn agent_called(&self, agent_name: &str, duration: Duration, success: bool) {
        if let Ok(mut stats) = self.agent_stats.lock() {
            let entry = stats
                .entry(agent_name.to_string())
                .or_insert_with(|| AgentCallStats::new(agent_name));
            entry.calls += 1;
            entry.last_call = current_timestamp();
            push_bounded(&mut entry.call_times, duration.as_millis() as u64);
            if !success {
                entry.failures += 1;
            }
        }
    }

    pub fn agent_timeout(&self, agent_name: &str) {
        if let Ok(mut stats) = self.agent_stats.lock() {
            if let Some(entry) = stats.get_mut(agent_name) {
                entry.timeouts += 1;
            }
        }
    }

    // Dynamic agent metrics
    pub fn dynamic_agent_created(&self) {
        self.dynamic_agents_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inbound_request(&self) {
        self.inbound_requests.fetch_add(1, Ordering::Relaxed);
    }

    // Lifecycle metrics
    pub fn directory_reloaded(&self) {
        self.directory_reloads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn update_health_status(&self, healthy: bool) {
        self.health_status.store(healthy, Ordering::Relaxed);
    }

    // Reset all metrics (useful for testing)
    pub fn reset(&self) {
        for counter in [
            &self.queries_received,
            &self.queries_in_flight,
            &self.queries_succeeded,
            &self.queries_failed,
            &self.discovery_lookups,
            &self.discovery_fallbacks,
            &self.discovery_alternate_paths,
            &self.envelope_fallbacks,
            &self.dynamic_agents_created,
            &self.inbound_requests,
            &self.directory_reloads,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.uptime_start
            .store(current_timestamp(), Ordering::Relaxed);
        self.health_status.store(true, Ordering::Relaxed);

        if let Ok(mut times) = self.query_times.lock() {
            times.clear();
        }
        if let Ok(mut by_kind) = self.failures_by_kind.lock() {
            by_kind.clear();
        }
        if let Ok(mut stats) = self.agent_stats.lock() {
            stats.clear();
        }
    }

    /// Average and percentiles over recorded query times
    fn query_time_statistics(&self) -> (f64, f64, f64, f64) {
        let Ok(times) = self.query_times.lock() else {
            return (0.0, 0.0, 0.0, 0.0);
        };
        if times.is_empty() {
            return (0.0, 0.0, 0.0, 0.0);
        }

        let mut sorted = times.clone();
        sorted.sort_unstable();
        let avg = sorted.iter().sum::<u64>() as f64 / sorted.len() as f64;
        (
            avg,
            percentile(&sorted, 50.0),
            percentile(&sorted, 95.0),
            percentile(&sorted, 99.0),
        )
    }

    fn failure_counts(&self) -> HashMap<String, u64> {
        self.failures_by_kind
            .lock()
            .map(|by_kind| {
                by_kind
                    .iter()
                    .map(|(kind, count)| (kind.as_str().to_string(), *count))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn agent_snapshots(&self) -> HashMap<String, AgentCallStatsSnapshot> {
        self.agent_stats
            .lock()
            .map(|stats| {
                stats
                    .iter()
                    .map(|(name, s)| (name.clone(), s.snapshot()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Get complete metrics snapshot
    pub fn get_metrics(&self) -> MetricsSnapshot {
        let now = current_timestamp();
        let (avg_query_time_ms, p50, p95, p99) = self.query_time_statistics();

        MetricsSnapshot {
            queries: QueryMetrics {
                received: self.queries_received.load(Ordering::Relaxed),
                in_flight: self.queries_in_flight.load(Ordering::Relaxed),
                succeeded: self.queries_succeeded.load(Ordering::Relaxed),
                failed: self.queries_failed.load(Ordering::Relaxed),
                failures_by_kind: self.failure_counts(),
                avg_query_time_ms,
                query_time_p50_ms: p50,
                query_time_p95_ms: p95,
                query_time_p99_ms: p99,
            },
            discovery: DiscoveryMetrics {
                lookups: self.discovery_lookups.load(Ordering::Relaxed),
                local_fallbacks: self.discovery_fallbacks.load(Ordering::Relaxed),
                alternate_paths: self.discovery_alternate_paths.load(Ordering::Relaxed),
            },
            bridge: BridgeMetrics {
                envelope_fallbacks: self.envelope_fallbacks.load(Ordering::Relaxed),
                agents: self.agent_snapshots(),
            },
            dynamic: DynamicMetrics {
                agents_created: self.dynamic_agents_created.load(Ordering::Relaxed),
                inbound_requests: self.inbound_requests.load(Ordering::Relaxed),
            },
            lifecycle: LifecycleMetrics {
                uptime_seconds: now.saturating_sub(self.uptime_start.load(Ordering::Relaxed)),
                directory_reloads: self.directory_reloads.load(Ordering::Relaxed),
                healthy: self.health_status.load(Ordering::Relaxed),
            },
            timestamp: now,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

// Internal per-agent statistics (with timing data)
#[derive(Debug)]
struct AgentCallStats {
    name: String,
    calls: u64,
    failures: u64,
    timeouts: u64,
    call_times: Vec<u64>, // milliseconds
    last_call: u64,
}

impl AgentCallStats {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            calls: 0,
            failures: 0,
            timeouts: 0,
            call_times: Vec::new(),
            last_call: 0,
        }
    }

    fn snapshot(&self) -> AgentCallStatsSnapshot {
        let avg_call_time_ms = if self.call_times.is_empty() {
            0.0
        } else {
            self.call_times.iter().sum::<u64>() as f64 / self.call_times.len() as f64
        };
        let success_rate = if self.calls == 0 {
            0.0
        } else {
            (self.calls - self.failures) as f64 / self.calls as f64
        };

        AgentCallStatsSnapshot {
            name: self.name.clone(),
            calls: self.calls,
            failures: self.failures,
            timeouts: self.timeouts,
            avg_call_time_ms,
            last_call: self.last_call,
            success_rate,
        }
    }
}

// Public metrics structures
#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub queries: QueryMetrics,
    pub discovery: DiscoveryMetrics,
    pub bridge: BridgeMetrics,
    pub dynamic: DynamicMetrics,
    pub lifecycle: LifecycleMetrics,
    pub timestamp: u64,
}

#[derive(Debug, Serialize)]
pub struct QueryMetrics {
    pub received: u64,
    pub in_flight: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub failures_by_kind: HashMap<String, u64>,
    pub avg_query_time_ms: f64,
    pub query_time_p50_ms: f64,
    pub query_time_p95_ms: f64,
    pub query_time_p99_ms: f64,
}

#[derive(Debug, Serialize)]
pub struct DiscoveryMetrics {
    pub lookups: u64,
    pub local_fallbacks: u64,
    pub alternate_paths: u64,
}

#[derive(Debug, Serialize)]
pub struct BridgeMetrics {
    pub envelope_fallbacks: u64,
    pub agents: HashMap<String, AgentCallStatsSnapshot>,
}

#[derive(Debug, Serialize)]
pub struct AgentCallStatsSnapshot {
    pub name: String,
    pub calls: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub avg_call_time_ms: f64,
    pub last_call: u64,
    pub success_rate: f64,
}

#[derive(Debug, Serialize)]
pub struct DynamicMetrics {
    pub agents_created: u64,
    pub inbound_requests: u64,
}

#[derive(Debug, Serialize)]
pub struct LifecycleMetrics {
    pub uptime_seconds: u64,
    pub directory_reloads: u64,
    pub healthy: bool,
}

// Helper functions
fn push_bounded(samples: &mut Vec<u64>, value: u64) {
    samples.push(value);
    if samples.len() > MAX_SAMPLES {
        samples.remove(0);
    }
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn percentile(sorted_data: &[u64], percentile: f64) -> f64 {
    if sorted_data.is_empty() {
        return 0.0;
    }

    let len = sorted_data.len();
    let index = (percentile / 100.0) * (len - 1) as f64;

    if index.fract() == 0.0 {
        sorted_data[index as usize] as f64
    } else {
        let lower = sorted_data[index.floor() as usize] as f64;
        let upper = sorted_data[index.ceil() as usize] as f64;
        lower + (upper - lower) * index.fract()
    }
}
