//! Integration Error Handler (spec §4.8).
//!
//! Isolation is orthogonal to the per-endpoint circuit breakers: it
//! watches the internal components themselves (the ones listed in spec
//! §4.1–§4.7) for unexpected failures — a panic caught at a call boundary,
//! a poisoned lock, anything that isn't an ordinary RPC-level error — and
//! swaps the executor onto a named fallback while a background probe
//! decides when it's safe to swap back.

use rpc_pool_core::{EventBus, PoolEvent};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

#[cfg(feature = "metrics")]
use metrics::gauge;

/// The internal components the error handler can isolate. Request Cache
/// and Batch Manager are in the spec's fallback table but aren't built by
/// this pool (no caching/batching module exists), so they're omitted here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    TokenBucket,
    CircuitBreaker,
    Selector,
    HedgedManager,
}

impl Component {
    pub fn name(&self) -> &'static str {
        match self {
            Component::TokenBucket => "token-bucket",
            Component::CircuitBreaker => "circuit-breaker",
            Component::Selector => "selector",
            Component::HedgedManager => "hedged-manager",
        }
    }

    /// Human-readable summary of the fallback behaviour the executor
    /// switches to while this component is isolated (spec §4.8 table).
    pub fn fallback_description(&self) -> &'static str {
        match self {
            Component::TokenBucket => "skip rate check, rely on max_concurrent only",
            Component::CircuitBreaker => "treat all endpoints as closed, rely on transport errors",
            Component::Selector => "round-robin over endpoints by index",
            Component::HedgedManager => "primary only, no backups",
        }
    }
}

/// Tuning for one component's isolation/probe lifecycle. Defaults match
/// spec §4.8: a 60s failure window, isolate at 3 failures, probe every 30s,
/// re-integrate after 3 consecutive healthy probes.
#[derive(Debug, Clone, Copy)]
pub struct MonitorConfig {
    pub failure_window: Duration,
    pub failure_threshold: usize,
    pub probe_interval: Duration,
    pub healthy_probes_required: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            failure_window: Duration::from_secs(60),
            failure_threshold: 3,
            probe_interval: Duration::from_secs(30),
            healthy_probes_required: 3,
        }
    }
}

/// Per-component sliding-window failure tracker plus isolation state.
/// `isolated` is a plain `AtomicBool` rather than `ArcSwap` over an enum:
/// there are exactly two states and no payload, so the extra indirection
/// buys nothing here (the executor still reads it lock-free either way).
pub struct ComponentMonitor {
    component: Component,
    config: MonitorConfig,
    isolated: AtomicBool,
    failures: Mutex<VecDeque<Instant>>,
    consecutive_healthy: AtomicUsize,
    probe_handle: Mutex<Option<JoinHandle<()>>>,
    events: EventBus,
}

impl ComponentMonitor {
    pub fn new(component: Component, config: MonitorConfig, events: EventBus) -> Arc<Self> {
        Arc::new(Self {
            component,
            config,
            isolated: AtomicBool::new(false),
            failures: Mutex::new(VecDeque::new()),
            consecutive_healthy: AtomicUsize::new(0),
            probe_handle: Mutex::new(None),
            events,
        })
    }

    pub fn component(&self) -> Component {
        self.component
    }

    pub fn is_isolated(&self) -> bool {
        self.isolated.load(Ordering::Acquire)
    }

    fn prune(&self, failures: &mut VecDeque<Instant>, now: Instant) {
        while let Some(front) = failures.front() {
            if now.duration_since(*front) > self.config.failure_window {
                failures.pop_front();
            } else {
                break;
            }
        }
    }

    /// Records an internal component failure (not an ordinary RPC
    /// failure). Spawns the probe loop and isolates once the sliding
    /// window crosses the threshold.
    pub fn record_failure(self: &Arc<Self>, probe: impl Fn() -> bool + Send + Sync + 'static) {
        if self.is_isolated() {
            return;
        }
        let now = Instant::now();
        let should_isolate = {
            let mut failures = self.failures.lock().unwrap();
            self.prune(&mut failures, now);
            failures.push_back(now);
            failures.len() >= self.config.failure_threshold
        };
        if should_isolate {
            self.isolate(probe);
        }
    }

    fn isolate(self: &Arc<Self>, probe: impl Fn() -> bool + Send + Sync + 'static) {
        if self.isolated.swap(true, Ordering::AcqRel) {
            return;
        }
        self.consecutive_healthy.store(0, Ordering::Relaxed);
        tracing::warn!(component = self.component.name(), "component isolated");
        self.events.emit(PoolEvent::ComponentIsolated {
            component: self.component.name(),
        });
        #[cfg(feature = "metrics")]
        gauge!("component_isolated", "component" => self.component.name()).set(1.0);

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(this.config.probe_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if probe() {
                    let count = this.consecutive_healthy.fetch_add(1, Ordering::AcqRel) + 1;
                    if count >= this.config.healthy_probes_required {
                        this.reintegrate();
                        break;
                    }
                } else {
                    this.consecutive_healthy.store(0, Ordering::Relaxed);
                }
            }
        });
        *self.probe_handle.lock().unwrap() = Some(handle);
    }

    fn reintegrate(&self) {
        self.isolated.store(false, Ordering::Release);
        self.failures.lock().unwrap().clear();
        self.consecutive_healthy.store(0, Ordering::Relaxed);
        tracing::info!(component = self.component.name(), "component re-integrated");
        self.events.emit(PoolEvent::ComponentRecovered {
            component: self.component.name(),
        });
        #[cfg(feature = "metrics")]
        gauge!("component_isolated", "component" => self.component.name()).set(0.0);
    }

    /// Ignored by design (spec §4.8: "a component throwing during shutdown
    /// is ignored") — `destroy()` on the pool calls this instead of
    /// `record_failure` so a teardown-time panic never starts a probe loop
    /// that outlives the pool.
    pub fn abort(&self) {
        if let Some(handle) = self.probe_handle.lock().unwrap().take() {
            handle.abort();
        }
    }
}

/// Holds one [`ComponentMonitor`] per internal component and derives the
/// pool-wide capability percentage shown in stats.
pub struct ErrorHandlerRegistry {
    monitors: Vec<Arc<ComponentMonitor>>,
}

impl ErrorHandlerRegistry {
    pub fn new(events: EventBus) -> Self {
        Self::with_config(events, MonitorConfig::default())
    }

    pub fn with_config(events: EventBus, config: MonitorConfig) -> Self {
        let components = [
            Component::TokenBucket,
            Component::CircuitBreaker,
            Component::Selector,
            Component::HedgedManager,
        ];
        Self {
            monitors: components
                .into_iter()
                .map(|c| ComponentMonitor::new(c, config, events.clone()))
                .collect(),
        }
    }

    pub fn monitor(&self, component: Component) -> &Arc<ComponentMonitor> {
        self.monitors
            .iter()
            .find(|m| m.component() == component)
            .expect("all Component variants are registered at construction")
    }

    pub fn isolated_components(&self) -> Vec<&'static str> {
        self.monitors
            .iter()
            .filter(|m| m.is_isolated())
            .map(|m| m.component().name())
            .collect()
    }

    /// `(healthy / total) × 100` per spec §4.8.
    pub fn capability_pct(&self) -> f64 {
        let total = self.monitors.len();
        if total == 0 {
            return 100.0;
        }
        let healthy = self.monitors.iter().filter(|m| !m.is_isolated()).count();
        (healthy as f64 / total as f64) * 100.0
    }

    pub fn shutdown(&self) {
        for monitor in &self.monitors {
            monitor.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpc_pool_core::EventBusBuilder;

    fn fast_config() -> MonitorConfig {
        MonitorConfig {
            failure_window: Duration::from_secs(60),
            failure_threshold: 3,
            probe_interval: Duration::from_millis(20),
            healthy_probes_required: 2,
        }
    }

    #[test]
    fn stays_active_below_threshold() {
        let monitor = ComponentMonitor::new(
            Component::TokenBucket,
            fast_config(),
            EventBusBuilder::new().build(),
        );
        monitor.record_failure(|| true);
        monitor.record_failure(|| true);
        assert!(!monitor.is_isolated());
    }

    #[tokio::test]
    async fn isolates_at_threshold_and_reintegrates_after_healthy_probes() {
        let monitor = ComponentMonitor::new(
            Component::CircuitBreaker,
            fast_config(),
            EventBusBuilder::new().build(),
        );
        for _ in 0..3 {
            monitor.record_failure(|| true);
        }
        assert!(monitor.is_isolated());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!monitor.is_isolated(), "should reintegrate after healthy probes");
    }

    #[tokio::test]
    async fn unhealthy_probes_reset_consecutive_count() {
        let healthy = Arc::new(AtomicBool::new(false));
        let healthy_clone = Arc::clone(&healthy);
        let monitor = ComponentMonitor::new(
            Component::Selector,
            fast_config(),
            EventBusBuilder::new().build(),
        );
        for _ in 0..3 {
            let healthy_clone = Arc::clone(&healthy_clone);
            monitor.record_failure(move || healthy_clone.load(Ordering::Relaxed));
        }
        assert!(monitor.is_isolated());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(monitor.is_isolated(), "stays isolated while probes report unhealthy");
        healthy.store(true, Ordering::Relaxed);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!monitor.is_isolated());
    }

    #[tokio::test]
    async fn capability_pct_reflects_isolated_components() {
        let registry = ErrorHandlerRegistry::with_config(EventBusBuilder::new().build(), fast_config());
        assert_eq!(registry.capability_pct(), 100.0);
        for _ in 0..3 {
            registry.monitor(Component::TokenBucket).record_failure(|| true);
        }
        assert_eq!(registry.capability_pct(), 75.0);
        assert_eq!(registry.isolated_components(), vec!["token-bucket"]);
    }

    #[tokio::test]
    async fn shutdown_aborts_pending_probes_without_panicking() {
        let registry = ErrorHandlerRegistry::with_config(EventBusBuilder::new().build(), fast_config());
        for _ in 0..3 {
            registry.monitor(Component::HedgedManager).record_failure(|| false);
        }
        registry.shutdown();
    }
}
