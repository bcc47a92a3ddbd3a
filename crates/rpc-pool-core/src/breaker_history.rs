//! Bounded per-endpoint breaker-event history (spec §3: "breaker events
//! <= 50"). A [`BreakerHistory`] is an [`EventListener`] registered at pool
//! build time; it keeps the last 50 breaker transitions per endpoint for
//! `get_stats()` to surface, independent of whatever a caller's own `on()`
//! handler does with the same events.

use crate::events::{EventListener, PoolEvent};
use crate::ids::EndpointId;
use crate::ring::Ring;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

const CAPACITY: usize = 50;

/// One recorded breaker transition. `kind` matches [`PoolEvent::kind`]
/// ("breaker-open", "breaker-closed", "breaker-half-open").
#[derive(Debug, Clone, Serialize)]
pub struct BreakerEvent {
    pub kind: &'static str,
}

pub struct BreakerHistory {
    rings: Mutex<HashMap<EndpointId, Ring<BreakerEvent>>>,
}

impl BreakerHistory {
    pub fn new() -> Self {
        Self {
            rings: Mutex::new(HashMap::new()),
        }
    }

    pub fn recent(&self, endpoint: EndpointId) -> Vec<BreakerEvent> {
        self.rings
            .lock()
            .unwrap()
            .get(&endpoint)
            .map(|ring| ring.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for BreakerHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl EventListener for BreakerHistory {
    fn on_event(&self, event: &PoolEvent, _at: Instant) {
        let (endpoint, kind) = match *event {
            PoolEvent::BreakerOpen { endpoint, .. } => (endpoint, "breaker-open"),
            PoolEvent::BreakerClosed { endpoint } => (endpoint, "breaker-closed"),
            PoolEvent::BreakerHalfOpen { endpoint } => (endpoint, "breaker-half-open"),
            _ => return,
        };
        self.rings
            .lock()
            .unwrap()
            .entry(endpoint)
            .or_insert_with(|| Ring::new(CAPACITY))
            .push(BreakerEvent { kind });
    }
}

/// Lets a shared `Arc<BreakerHistory>` be registered with [`EventBusBuilder::add`]
/// while the same handle stays usable for reads elsewhere.
impl EventListener for std::sync::Arc<BreakerHistory> {
    fn on_event(&self, event: &PoolEvent, at: Instant) {
        (**self).on_event(event, at)
    }
}
