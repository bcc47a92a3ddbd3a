//! Fixed-capacity ring buffer shared by every rolling per-endpoint history
//! (latency samples, breaker events). Replaces the "global rolling arrays
//! that grew unbounded" pattern flagged in the design notes: capacity is
//! fixed at construction, push never allocates past it.

use std::collections::VecDeque;

/// A `VecDeque`-backed ring with a capacity fixed at construction time.
/// Pushing past capacity silently drops the oldest entry.
#[derive(Debug, Clone)]
pub struct Ring<T> {
    buf: VecDeque<T>,
    capacity: usize,
}

impl<T> Ring<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring capacity must be positive");
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, item: T) {
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(item);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.buf.iter()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

impl Ring<u64> {
    /// p50 over current contents, 0 if empty. Used for latency scoring in
    /// the selector (spec §4.3).
    pub fn percentile(&self, pct: f64) -> u64 {
        if self.buf.is_empty() {
            return 0;
        }
        let mut sorted: Vec<u64> = self.buf.iter().copied().collect();
        sorted.sort_unstable();
        let idx = ((sorted.len() as f64 - 1.0) * pct).round() as usize;
        sorted[idx.min(sorted.len() - 1)]
    }
}
