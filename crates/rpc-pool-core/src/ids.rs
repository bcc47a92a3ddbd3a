//! Identity types (spec §3: Endpoint identity, Request identity).

use std::sync::atomic::{AtomicU64, Ordering};

/// Stable index into the pool's endpoint vector. Endpoints are created once
/// at pool construction and never added/removed (spec §3 lifecycle), so a
/// plain index is a safe, allocation-free identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct EndpointId(pub usize);

impl std::fmt::Display for EndpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "endpoint#{}", self.0)
    }
}

/// Monotonically increasing request identity (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

/// Generator for [`RequestId`]s, one per pool.
#[derive(Debug, Default)]
pub struct RequestIdGen(AtomicU64);

impl RequestIdGen {
    pub fn new() -> Self {
        Self(AtomicU64::new(1))
    }

    pub fn next(&self) -> RequestId {
        RequestId(self.0.fetch_add(1, Ordering::Relaxed))
    }
}
