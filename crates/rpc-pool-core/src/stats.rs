//! Point-in-time snapshot types behind `get_stats()` / `get_load_distribution()`
//! (spec §6).

use crate::breaker_history::BreakerEvent;
use crate::ids::EndpointId;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct EndpointStats {
    pub endpoint: EndpointId,
    pub url: String,
    pub breaker_state: &'static str,
    pub in_flight: usize,
    pub max_concurrent: usize,
    pub tokens_available: f64,
    pub success_count: u64,
    pub failure_count: u64,
    pub p50_latency_ms: u64,
    pub p99_latency_ms: u64,
    /// Last up to 50 breaker transitions for this endpoint (spec §3).
    pub recent_breaker_events: Vec<BreakerEvent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GlobalStats {
    pub total_requests: u64,
    pub total_failures: u64,
    pub queue_len: usize,
    pub max_queue_size: usize,
    pub isolated_components: Vec<&'static str>,
    pub capability_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub global: GlobalStats,
    pub endpoints: Vec<EndpointStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadShare {
    pub url: String,
    pub requests: u64,
    pub percentage: f64,
    pub utilisation: f64,
}
