//! Endpoint selection (spec §4.3).
//!
//! The scoring function itself is pure and stateless: it never calls out,
//! blocks, or consults a breaker directly. The executor gathers a
//! [`EndpointSnapshot`] per endpoint (already past the breaker's admission
//! check) each call and hands the slice here. The only state this crate
//! owns is the round-robin tie-break counter, which must survive across
//! calls to actually rotate.

use rpc_pool_core::{EndpointId, SelectorWeights};
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time view of one endpoint, gathered by the executor just before
/// a selection. `admissible` folds together all three hard gates from spec
/// §4.3 (breaker eligibility, concurrency headroom, token availability) —
/// the selector only scores what survives filtering.
#[derive(Debug, Clone, Copy)]
pub struct EndpointSnapshot {
    pub endpoint: EndpointId,
    pub admissible: bool,
    pub priority: i32,
    pub weight: f64,
    pub p50_latency_ms: u64,
    pub in_flight: usize,
    pub max_concurrent: usize,
    pub recent_failure_rate: f64,
}

impl EndpointSnapshot {
    fn score(&self, weights: &SelectorWeights) -> f64 {
        let utilisation = if self.max_concurrent == 0 {
            1.0
        } else {
            self.in_flight as f64 / self.max_concurrent as f64
        };
        self.priority as f64 * weights.priority
            - self.weight * weights.weight
            + self.p50_latency_ms as f64 * weights.latency
            + utilisation * weights.utilisation
            + self.recent_failure_rate * weights.failure_rate
    }
}

/// Holds the round-robin counter used to break ties between equally-scored
/// endpoints. One instance per pool, shared across calls.
#[derive(Debug, Default)]
pub struct Selector {
    round_robin: AtomicU64,
}

/// Endpoints are considered tied if their scores differ by less than this;
/// float score arithmetic otherwise almost never produces an exact tie.
const TIE_EPSILON: f64 = 1e-9;

impl Selector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Selects the best admissible endpoint, or `None` if every candidate
    /// failed a hard gate.
    pub fn select(
        &self,
        candidates: &[EndpointSnapshot],
        weights: &SelectorWeights,
    ) -> Option<EndpointId> {
        let mut best: Vec<(&EndpointSnapshot, f64)> = Vec::new();
        let mut best_score = f64::INFINITY;

        for candidate in candidates.iter().filter(|c| c.admissible) {
            let score = candidate.score(weights);
            if score < best_score - TIE_EPSILON {
                best_score = score;
                best.clear();
                best.push((candidate, score));
            } else if (score - best_score).abs() <= TIE_EPSILON {
                best.push((candidate, score));
            }
        }

        if best.is_empty() {
            return None;
        }
        if best.len() == 1 {
            return Some(best[0].0.endpoint);
        }

        let idx = self.round_robin.fetch_add(1, Ordering::Relaxed) as usize % best.len();
        Some(best[idx].0.endpoint)
    }

    /// Ranks admissible candidates best-first by score, without the
    /// round-robin tie-break. Used by the hedge manager to pick backup
    /// endpoints once a primary has already been chosen via [`Self::select`].
    pub fn rank(&self, candidates: &[EndpointSnapshot], weights: &SelectorWeights) -> Vec<EndpointId> {
        let mut scored: Vec<(f64, EndpointId)> = candidates
            .iter()
            .filter(|c| c.admissible)
            .map(|c| (c.score(weights), c.endpoint))
            .collect();
        scored.sort_by(|a, b| a.0.total_cmp(&b.0));
        scored.into_iter().map(|(_, id)| id).collect()
    }
}
