use rand::Rng;
use rpc_pool_core::{BreakerConfig, EndpointId, EventBus, PoolEvent};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[cfg(feature = "metrics")]
use metrics::counter;

/// A cooldown doubles on every re-entry into `OPEN` from `HALF_OPEN`, capped
/// to avoid an endpoint effectively never recovering.
const MAX_BACKOFF_MULTIPLIER: u32 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CircuitState {
    Closed = 0,
    Open = 1,
    HalfOpen = 2,
}

impl CircuitState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => CircuitState::Closed,
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Outcome of an admission check against the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Circuit is `CLOSED`; proceed normally.
    Allow,
    /// Circuit is `OPEN` and `next_probe` has not elapsed, or a probe is
    /// already in flight.
    RejectOpen,
    /// Circuit is `HALF_OPEN` (or promotable from `OPEN`) and this caller
    /// won the single probe slot.
    AllowProbe,
}

struct Inner {
    consecutive_failures: usize,
    half_open_successes: usize,
    half_open_probe_in_flight: bool,
    open_count: u32,
    opened_at: Instant,
    next_probe: Instant,
}

/// Per-endpoint circuit breaker (spec §4.2). State is readable lock-free via
/// an [`AtomicU8`]; transitions take a mutex so bookkeeping stays
/// consistent under concurrent callers racing for the half-open slot.
pub struct CircuitBreaker {
    endpoint: EndpointId,
    config: BreakerConfig,
    state: AtomicU8,
    inner: Mutex<Inner>,
    events: EventBus,
}

impl CircuitBreaker {
    pub fn new(endpoint: EndpointId, config: BreakerConfig, events: EventBus) -> Self {
        Self {
            endpoint,
            config,
            state: AtomicU8::new(CircuitState::Closed as u8),
            inner: Mutex::new(Inner {
                consecutive_failures: 0,
                half_open_successes: 0,
                half_open_probe_in_flight: false,
                open_count: 0,
                opened_at: Instant::now(),
                next_probe: Instant::now(),
            }),
            events,
        }
    }

    /// Lock-free read of the current state, for stats snapshots and the
    /// selector's hard-gate filtering.
    pub fn state(&self) -> CircuitState {
        CircuitState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn cooldown_for(&self, open_count: u32) -> u64 {
        let exponent = open_count.saturating_sub(1).min(MAX_BACKOFF_MULTIPLIER.trailing_zeros());
        let multiplier = 1u64 << exponent;
        self.config.cooldown_ms.saturating_mul(multiplier)
    }

    fn recompute_next_probe(&self, inner: &mut Inner, now: Instant) {
        let cooldown = Duration::from_millis(self.cooldown_for(inner.open_count));
        let jitter_ms = if self.config.jitter_ms > 0 {
            rand::rng().random_range(0..=self.config.jitter_ms)
        } else {
            0
        };
        inner.next_probe = now + cooldown + Duration::from_millis(jitter_ms);
    }

    fn transition_to_open(&self, inner: &mut Inner, now: Instant) {
        inner.open_count += 1;
        inner.half_open_successes = 0;
        inner.half_open_probe_in_flight = false;
        inner.opened_at = now;
        self.recompute_next_probe(inner, now);
        self.state.store(CircuitState::Open as u8, Ordering::Release);
        #[cfg(feature = "metrics")]
        counter!("circuitbreaker_opened_total", "endpoint" => self.endpoint.to_string())
            .increment(1);
        self.events.emit(PoolEvent::BreakerOpen {
            endpoint: self.endpoint,
            consecutive_failures: inner.consecutive_failures,
            open_count: inner.open_count,
        });
        tracing::warn!(endpoint = %self.endpoint, open_count = inner.open_count, "circuit opened");
    }

    /// A failure recorded while already `OPEN` isn't a new transition — it
    /// doesn't escalate `open_count` or double the cooldown again — but it
    /// still refreshes `opened_at`/`next_probe` off the latest failure time
    /// (spec §4.2: re-entries, and failures while open, keep the clock
    /// moving forward; never backwards).
    fn refresh_open(&self, inner: &mut Inner, now: Instant) {
        inner.opened_at = now;
        self.recompute_next_probe(inner, now);
        tracing::debug!(endpoint = %self.endpoint, "failure recorded while open, refreshed cooldown");
    }

    fn transition_to_closed(&self, inner: &mut Inner) {
        inner.consecutive_failures = 0;
        inner.half_open_successes = 0;
        inner.half_open_probe_in_flight = false;
        inner.open_count = 0;
        self.state.store(CircuitState::Closed as u8, Ordering::Release);
        self.events
            .emit(PoolEvent::BreakerClosed { endpoint: self.endpoint });
        tracing::info!(endpoint = %self.endpoint, "circuit closed");
    }

    /// Admission check. May itself drive a lazy `OPEN` → `HALF_OPEN`
    /// transition if `next_probe` has elapsed.
    pub fn should_allow(&self) -> Decision {
        match self.state() {
            CircuitState::Closed => Decision::Allow,
            CircuitState::Open => {
                let now = Instant::now();
                let mut inner = self.inner.lock().unwrap();
                if now < inner.next_probe {
                    return Decision::RejectOpen;
                }
                self.state.store(CircuitState::HalfOpen as u8, Ordering::Release);
                self.events.emit(PoolEvent::BreakerHalfOpen {
                    endpoint: self.endpoint,
                });
                inner.half_open_probe_in_flight = true;
                Decision::AllowProbe
            }
            CircuitState::HalfOpen => {
                let mut inner = self.inner.lock().unwrap();
                if inner.half_open_probe_in_flight {
                    Decision::RejectOpen
                } else {
                    inner.half_open_probe_in_flight = true;
                    Decision::AllowProbe
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        match self.state() {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                inner.half_open_probe_in_flight = false;
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.success_threshold as usize {
                    self.transition_to_closed(&mut inner);
                }
            }
            CircuitState::Open => {
                tracing::trace!(endpoint = %self.endpoint, "success recorded while open, ignoring");
            }
        }
    }

    pub fn record_failure(&self) {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap();
        match self.state() {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold as usize {
                    self.transition_to_open(&mut inner, now);
                }
            }
            CircuitState::HalfOpen => {
                self.transition_to_open(&mut inner, now);
            }
            CircuitState::Open => {
                self.refresh_open(&mut inner, now);
            }
        }
    }

    /// Test/operator hook: force a state, emitting the same event a natural
    /// transition would.
    pub fn force_state(&self, state: CircuitState) {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap();
        match state {
            CircuitState::Closed => self.transition_to_closed(&mut inner),
            CircuitState::Open => {
                inner.consecutive_failures = self.config.failure_threshold as usize;
                self.transition_to_open(&mut inner, now);
            }
            CircuitState::HalfOpen => {
                inner.half_open_probe_in_flight = false;
                inner.half_open_successes = 0;
                self.state.store(CircuitState::HalfOpen as u8, Ordering::Release);
                self.events.emit(PoolEvent::BreakerHalfOpen {
                    endpoint: self.endpoint,
                });
            }
        }
    }

    /// Non-mutating check used by the selector's hard-gate filtering
    /// (spec §4.3 gate 1). Unlike [`Self::should_allow`], this never claims
    /// the single half-open probe slot — it only reports whether the
    /// breaker *would* admit a call right now.
    pub fn peek_admissible(&self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let inner = self.inner.lock().unwrap();
                Instant::now() >= inner.next_probe
            }
            CircuitState::HalfOpen => {
                let inner = self.inner.lock().unwrap();
                !inner.half_open_probe_in_flight
            }
        }
    }

    pub fn endpoint(&self) -> EndpointId {
        self.endpoint
    }

    pub fn consecutive_failures(&self) -> usize {
        self.inner.lock().unwrap().consecutive_failures
    }

    /// When the breaker most recently transitioned (or re-entered/refreshed)
    /// `OPEN`. Exposed for stats and for testing the jitter-bound invariant
    /// (spec.md §8: `next_probe − opened_at ∈ [cooldown, cooldown + jitter]`).
    pub fn opened_at(&self) -> Instant {
        self.inner.lock().unwrap().opened_at
    }

    pub fn next_probe(&self) -> Instant {
        self.inner.lock().unwrap().next_probe
    }
}
