use rpc_pool_circuitbreaker::CircuitBreaker;
use rpc_pool_core::{EndpointConfig, EndpointId, Ring};
use rpc_pool_ratelimiter::TokenBucket;
use rpc_pool_transport::EndpointTransport;
use std::sync::atomic::{AtomicU64, AtomicUsize};
use std::sync::Mutex;

/// How many latency samples each endpoint keeps for its p50/p99 stats
/// (spec §3, §4.3, §6: rolling latency samples, bounded ring, <= 64).
/// Fixed rather than configurable — the spec mandates the bound rather
/// than exposing it as a knob.
const LATENCY_WINDOW: usize = 64;

/// Everything the executor needs about one endpoint: its identity,
/// immutable config, and the live resilience primitives that gate and
/// track calls against it.
pub struct EndpointRuntime {
    pub id: EndpointId,
    pub config: EndpointConfig,
    pub bucket: TokenBucket,
    pub breaker: CircuitBreaker,
    pub transport: EndpointTransport,
    pub in_flight: AtomicUsize,
    pub latency: Mutex<Ring<u64>>,
    pub success_count: AtomicU64,
    pub failure_count: AtomicU64,
}

impl EndpointRuntime {
    pub fn new(
        id: EndpointId,
        config: EndpointConfig,
        bucket: TokenBucket,
        breaker: CircuitBreaker,
        transport: EndpointTransport,
    ) -> Self {
        Self {
            id,
            config,
            bucket,
            breaker,
            transport,
            in_flight: AtomicUsize::new(0),
            latency: Mutex::new(Ring::new(LATENCY_WINDOW)),
            success_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
        }
    }

    pub fn recent_failure_rate(&self) -> f64 {
        use std::sync::atomic::Ordering::Relaxed;
        let success = self.success_count.load(Relaxed);
        let failure = self.failure_count.load(Relaxed);
        let total = success + failure;
        if total == 0 {
            0.0
        } else {
            failure as f64 / total as f64
        }
    }
}
