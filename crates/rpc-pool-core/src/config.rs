//! Configuration types for the pool (spec §6). Construction accepts a
//! simple key/value map — no env-loading, no file format parsing, per the
//! spec's explicit exclusion of configuration loading from this crate's
//! scope.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::HashSet;
use std::time::Duration;

fn default_hedgeable_methods() -> HashSet<String> {
    [
        "getSlot",
        "getBalance",
        "getAccountInfo",
        "getBlockHeight",
        "getLatestBlockhash",
        "getTokenAccountBalance",
        "getMultipleAccounts",
        "getTransaction",
        "getVersion",
        "getHealth",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Per-endpoint configuration, immutable after pool construction (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub url: String,
    pub max_concurrent: usize,
    pub rps_limit: f64,
    pub burst_capacity: f64,
    pub weight: f64,
    pub priority: i32,
    pub timeout_ms: u64,
}

impl EndpointConfig {
    pub fn new(url: impl Into<String>, defaults: &PoolConfig) -> Self {
        Self {
            url: url.into(),
            max_concurrent: defaults.default_max_concurrent,
            rps_limit: defaults.default_rps_limit,
            burst_capacity: defaults.default_burst_capacity,
            weight: 1.0,
            priority: 0,
            timeout_ms: defaults.default_timeout_ms,
        }
    }
}

/// Circuit breaker tuning (spec §4.2, §6).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub cooldown_ms: u64,
    pub jitter_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            cooldown_ms: 30_000,
            jitter_ms: 5_000,
        }
    }
}

/// Hedging tuning (spec §4.6, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HedgingConfig {
    pub delay_ms: u64,
    pub max_backups: usize,
    pub cancellation_timeout_ms: u64,
    pub hedgeable_methods: HashSet<String>,
    pub enabled: bool,
}

impl Default for HedgingConfig {
    fn default() -> Self {
        Self {
            delay_ms: 100,
            max_backups: 2,
            cancellation_timeout_ms: 100,
            hedgeable_methods: default_hedgeable_methods(),
            enabled: true,
        }
    }
}

/// Weights for the endpoint selector's composite score (spec §4.3). Lower
/// total score wins.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SelectorWeights {
    pub priority: f64,
    pub weight: f64,
    pub latency: f64,
    pub utilisation: f64,
    pub failure_rate: f64,
}

impl Default for SelectorWeights {
    fn default() -> Self {
        Self {
            priority: 1.0,
            weight: 1.0,
            latency: 0.01,
            utilisation: 10.0,
            failure_rate: 20.0,
        }
    }
}

/// Top-level pool configuration; the defaults here are exactly the table in
/// spec §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    pub max_global_in_flight: usize,
    pub max_queue_size: usize,
    pub default_timeout_ms: u64,
    pub default_failover_budget_ms: u64,
    pub default_rps_limit: f64,
    pub default_burst_capacity: f64,
    pub default_max_concurrent: usize,
    pub max_attempts: usize,
    pub breaker: BreakerConfig,
    pub hedging: HedgingConfig,
    pub selector_weights: SelectorWeights,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_global_in_flight: 500,
            max_queue_size: 500,
            default_timeout_ms: 3_000,
            default_failover_budget_ms: 5_000,
            default_rps_limit: 100.0,
            default_burst_capacity: 200.0,
            default_max_concurrent: 50,
            max_attempts: 4,
            breaker: BreakerConfig::default(),
            hedging: HedgingConfig::default(),
            selector_weights: SelectorWeights::default(),
        }
    }
}

impl PoolConfig {
    /// Builds a config from a loosely-typed key/value map — the "simple
    /// key/value map" input contract described in spec §6. Unknown keys are
    /// ignored; missing keys fall back to documented defaults.
    pub fn from_map(map: &HashMap<String, serde_json::Value>) -> Self {
        let mut cfg = PoolConfig::default();

        macro_rules! num {
            ($key:literal, $field:expr, $as_fn:ident) => {
                if let Some(v) = map.get($key).and_then(|v| v.$as_fn()) {
                    $field = v as _;
                }
            };
        }

        num!("max_global_in_flight", cfg.max_global_in_flight, as_u64);
        num!("max_queue_size", cfg.max_queue_size, as_u64);
        num!("default_timeout_ms", cfg.default_timeout_ms, as_u64);
        num!(
            "default_failover_budget_ms",
            cfg.default_failover_budget_ms,
            as_u64
        );
        num!("default_rps_limit", cfg.default_rps_limit, as_f64);
        num!(
            "default_burst_capacity",
            cfg.default_burst_capacity,
            as_f64
        );
        num!(
            "default_max_concurrent",
            cfg.default_max_concurrent,
            as_u64
        );
        num!(
            "breaker.failure_threshold",
            cfg.breaker.failure_threshold,
            as_u64
        );
        num!(
            "breaker.success_threshold",
            cfg.breaker.success_threshold,
            as_u64
        );
        num!("breaker.cooldown_ms", cfg.breaker.cooldown_ms, as_u64);
        num!("breaker.jitter_ms", cfg.breaker.jitter_ms, as_u64);
        num!("hedging.delay_ms", cfg.hedging.delay_ms, as_u64);
        num!("hedging.max_backups", cfg.hedging.max_backups, as_u64);
        num!(
            "hedging.cancellation_timeout_ms",
            cfg.hedging.cancellation_timeout_ms,
            as_u64
        );

        if let Some(methods) = map.get("hedgeable_methods").and_then(|v| v.as_array()) {
            cfg.hedging.hedgeable_methods = methods
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect();
        }

        cfg
    }

    pub fn failover_budget(&self) -> Duration {
        Duration::from_millis(self.default_failover_budget_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}
