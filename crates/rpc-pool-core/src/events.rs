//! Pool-wide event system.
//!
//! Every subsystem (bucket, breaker, selector, queue, hedge manager, error
//! handler) emits into the same [`EventBus`] rather than maintaining its own
//! listener list. Consumers subscribe once, at pool construction, via
//! [`PoolBuilder::on`](crate) and never miss an event from a component built
//! afterwards, because the bus itself is constructed first and cloned into
//! every component.

use crate::ids::EndpointId;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// One of the event kinds the public `on(event, handler)` API (spec §6) can
/// subscribe to, plus the finer-grained internal events components use for
/// their own tests and tracing.
#[derive(Debug, Clone)]
pub enum PoolEvent {
    /// A circuit breaker transitioned into `OPEN`.
    BreakerOpen {
        endpoint: EndpointId,
        consecutive_failures: usize,
        open_count: u32,
    },
    /// A circuit breaker transitioned into `CLOSED`.
    BreakerClosed { endpoint: EndpointId },
    /// A circuit breaker transitioned into `HALF_OPEN`.
    BreakerHalfOpen { endpoint: EndpointId },
    /// A completed call exceeded the high-latency threshold.
    HighLatency {
        endpoint: EndpointId,
        latency_ms: u64,
    },
    /// The global request queue rejected an admission because it was full.
    QueueFull { queue_len: usize, max: usize },
    /// A hedge backup was dispatched.
    HedgeStarted {
        request_id: u64,
        attempt: usize,
        endpoint: EndpointId,
    },
    /// A hedged call resolved; `hedges_cancelled` counts the siblings that
    /// were still in flight at resolution time.
    HedgeResolved {
        request_id: u64,
        winner: EndpointId,
        hedges_cancelled: usize,
    },
    /// An internal component was isolated after repeated internal failures.
    ComponentIsolated { component: &'static str },
    /// An isolated component passed enough health probes to be re-integrated.
    ComponentRecovered { component: &'static str },
}

impl PoolEvent {
    /// Stable name used for tracing fields and `on()` filtering.
    pub fn kind(&self) -> &'static str {
        match self {
            PoolEvent::BreakerOpen { .. } => "breaker-open",
            PoolEvent::BreakerClosed { .. } => "breaker-closed",
            PoolEvent::BreakerHalfOpen { .. } => "breaker-half-open",
            PoolEvent::HighLatency { .. } => "high-latency",
            PoolEvent::QueueFull { .. } => "queue-full",
            PoolEvent::HedgeStarted { .. } => "hedge-started",
            PoolEvent::HedgeResolved { .. } => "hedge-resolved",
            PoolEvent::ComponentIsolated { .. } => "component-isolated",
            PoolEvent::ComponentRecovered { .. } => "component-recovered",
        }
    }
}

/// Anything that wants to observe [`PoolEvent`]s.
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &PoolEvent, at: Instant);
}

impl<F> EventListener for F
where
    F: Fn(&PoolEvent, Instant) + Send + Sync,
{
    fn on_event(&self, event: &PoolEvent, at: Instant) {
        (self)(event, at)
    }
}

/// Cheaply-cloneable broadcast of [`PoolEvent`]s to every registered
/// listener. A single instance is constructed at pool build time and shared
/// (via `Arc`) by every subsystem so none of them can emit to a stale or
/// partial listener list.
#[derive(Clone, Default)]
pub struct EventBus {
    listeners: Arc<Vec<Arc<dyn EventListener>>>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl EventBus {
    pub fn new(listeners: Vec<Arc<dyn EventListener>>) -> Self {
        Self {
            listeners: Arc::new(listeners),
        }
    }

    /// Emits to every listener. A panicking listener is caught and logged so
    /// one misbehaving subscriber can't drop events for the rest.
    pub fn emit(&self, event: PoolEvent) {
        let now = Instant::now();
        tracing::debug!(kind = event.kind(), "pool event");
        for listener in self.listeners.iter() {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener.on_event(&event, now);
            }));
            if result.is_err() {
                tracing::warn!(kind = event.kind(), "event listener panicked");
            }
        }
    }
}

/// Builder-side collector for listeners, handed to `PoolBuilder::on`.
#[derive(Default)]
pub struct EventBusBuilder {
    listeners: Vec<Arc<dyn EventListener>>,
}

impl EventBusBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<L: EventListener + 'static>(&mut self, listener: L) -> &mut Self {
        self.listeners.push(Arc::new(listener));
        self
    }

    pub fn build(self) -> EventBus {
        EventBus::new(self.listeners)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn emits_to_all_listeners() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut builder = EventBusBuilder::new();
        for _ in 0..3 {
            let c = Arc::clone(&count);
            builder.add(move |_: &PoolEvent, _: Instant| {
                c.fetch_add(1, Ordering::SeqCst);
            });
        }
        let bus = builder.build();
        bus.emit(PoolEvent::ComponentRecovered {
            component: "token-bucket",
        });
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn panicking_listener_does_not_block_others() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let mut builder = EventBusBuilder::new();
        builder.add(|_: &PoolEvent, _: Instant| panic!("boom"));
        builder.add(move |_: &PoolEvent, _: Instant| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        let bus = builder.build();
        bus.emit(PoolEvent::QueueFull {
            queue_len: 500,
            max: 500,
        });
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
