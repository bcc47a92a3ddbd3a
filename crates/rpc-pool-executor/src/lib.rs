//! Call orchestration (spec §4.7): endpoint selection, admission, dispatch
//! (plain or hedged), retry/failover across endpoints, and queue fallback
//! when nothing is immediately admissible.
//!
//! This crate is the one place all the other `rpc-pool-*` crates meet —
//! everything else here is either a primitive it drives ([`TokenBucket`],
//! [`CircuitBreaker`], [`Selector`], [`EndpointTransport`]) or a fallback
//! path it falls into ([`RequestQueue`], [`execute_hedged`]).

mod error;
mod runtime;

pub use error::ExecutorError;
pub use runtime::EndpointRuntime;

use futures::FutureExt;
use rand::Rng;
use rpc_pool_circuitbreaker::{CircuitBreaker, Decision};
use rpc_pool_core::{
    AttemptOutcome, AttemptOutcomeLite, BreakerHistory, EndpointConfig, EndpointId, EventBus,
    GlobalStats, LoadShare, PoolConfig, PoolError, PoolStats, RequestId, RequestIdGen,
};
use rpc_pool_errorhandler::{Component, ErrorHandlerRegistry};
use rpc_pool_hedge::execute_hedged;
use rpc_pool_queue::{EnqueueError, QueuedEntry, RequestQueue};
use rpc_pool_ratelimiter::TokenBucket;
use rpc_pool_selector::{EndpointSnapshot, Selector};
use rpc_pool_transport::EndpointTransport;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[cfg(feature = "metrics")]
use metrics::counter;

/// Per-call overrides. `None` fields fall back to the pool's configured
/// defaults (spec §6).
#[derive(Default)]
pub struct CallOptions {
    pub timeout: Option<Duration>,
    pub failover_budget: Option<Duration>,
    /// `Some(false)` disables hedging for this call regardless of method or
    /// global config — the caller's way of marking a non-idempotent method
    /// that still happens to be in `hedgeable_methods` (spec §4.6 edge case:
    /// "Non-idempotent methods must never be hedged").
    pub idempotent: Option<bool>,
    pub cancel: Option<CancellationToken>,
}

/// How the queue wait in [`Executor::call`] ended.
enum QueueWaitError {
    Full,
    Destroyed,
}

/// Outcome of dispatching to the busiest bottleneck: the endpoint that
/// actually produced a result, paired with it so the caller can credit the
/// right breaker and latency ring (the winner of a hedged race is often not
/// the endpoint the selector originally picked).
type DispatchResult = Result<(EndpointId, Value), PoolError>;

pub struct Executor {
    endpoints: Vec<Arc<EndpointRuntime>>,
    selector: Selector,
    queue: RequestQueue,
    config: PoolConfig,
    events: EventBus,
    errors: Arc<ErrorHandlerRegistry>,
    breaker_history: Arc<BreakerHistory>,
    ids: RequestIdGen,
    total_requests: AtomicU64,
    total_failures: AtomicU64,
    destroyed: AtomicBool,
    pending: Mutex<HashMap<RequestId, oneshot::Sender<bool>>>,
    pump: Mutex<Option<JoinHandle<()>>>,
    /// Cursor for the Selector's isolated-mode fallback (spec §4.8:
    /// "round-robin over endpoints by index").
    round_robin: AtomicUsize,
}

impl Executor {
    pub fn new(
        endpoint_configs: Vec<EndpointConfig>,
        config: PoolConfig,
        events: EventBus,
        errors: Arc<ErrorHandlerRegistry>,
        breaker_history: Arc<BreakerHistory>,
    ) -> Result<Arc<Self>, ExecutorError> {
        let mut endpoints = Vec::with_capacity(endpoint_configs.len());
        for cfg in endpoint_configs {
            let id = EndpointId(endpoints.len());
            let bucket_cfg = rpc_pool_ratelimiter::TokenBucketConfig::builder()
                .rps_limit(cfg.rps_limit)
                .burst_capacity(cfg.burst_capacity)
                .build();
            let bucket = TokenBucket::new(cfg.url.clone(), bucket_cfg);
            let breaker = CircuitBreaker::new(id, config.breaker, events.clone());
            let transport =
                EndpointTransport::new(id, cfg.url.clone(), Duration::from_millis(cfg.timeout_ms))?;
            endpoints.push(Arc::new(EndpointRuntime::new(id, cfg, bucket, breaker, transport)));
        }

        let queue = RequestQueue::named(config.max_queue_size, "executor");
        let executor = Arc::new(Self {
            endpoints,
            selector: Selector::new(),
            queue,
            config,
            events,
            errors,
            breaker_history,
            ids: RequestIdGen::new(),
            total_requests: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            destroyed: AtomicBool::new(false),
            pending: Mutex::new(HashMap::new()),
            pump: Mutex::new(None),
            round_robin: AtomicUsize::new(0),
        });

        let handle = Self::spawn_pump(Arc::clone(&executor));
        *executor.pump.lock().unwrap() = Some(handle);
        Ok(executor)
    }

    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }

    /// The attempt loop from spec §4.7: select, gate, dispatch, classify,
    /// retry or fail — bounded by `max_attempts` and an effective deadline
    /// of `min(timeout, failover_budget)`.
    pub async fn call(self: &Arc<Self>, method: &str, params: Value, opts: CallOptions) -> Result<Value, PoolError> {
        if self.destroyed.load(Ordering::Acquire) {
            return Err(PoolError::PoolDestroyed);
        }

        let id = self.ids.next();
        let now = Instant::now();
        let timeout = opts.timeout.unwrap_or_else(|| self.config.timeout());
        let failover_budget = opts
            .failover_budget
            .unwrap_or_else(|| self.config.failover_budget());
        let deadline = now + timeout.min(failover_budget);

        let mut tabu: HashSet<EndpointId> = HashSet::new();
        let mut trail: Vec<AttemptOutcome> = Vec::new();
        let mut attempts = 0usize;

        loop {
            if attempts >= self.config.max_attempts || Instant::now() >= deadline {
                return Err(self.deadline_error(trail));
            }
            if tabu.len() >= self.endpoints.len() {
                // Every endpoint has already been tried and rejected this
                // call; queueing would wait on global capacity that this
                // call can never use again (tabu is per-call, not visible
                // to the queue pump), so stop here instead of spinning.
                return Err(self.deadline_error(trail));
            }

            let Some(endpoint_id) = self.pick_endpoint(&tabu) else {
                // Every remaining candidate is alive but specifically
                // breaker-rejected: failing over by queueing would just
                // wait out the same cooldown with no chance of success, so
                // surface circuit-open immediately (spec §7, §8 scenario 5)
                // rather than waiting for the deadline to expire.
                if self.all_remaining_breaker_rejected(&tabu) == Some(true) {
                    return Err(PoolError::CircuitOpen {
                        attempts: trail.iter().map(AttemptOutcomeLite::from).collect(),
                    });
                }
                match self.wait_for_capacity(id, deadline).await {
                    Ok(true) => continue,
                    Ok(false) => return Err(self.deadline_error(trail)),
                    Err(QueueWaitError::Full) => {
                        return Err(PoolError::NoCapacity {
                            attempts: trail.iter().map(AttemptOutcomeLite::from).collect(),
                        })
                    }
                    Err(QueueWaitError::Destroyed) => return Err(PoolError::PoolDestroyed),
                }
            };

            let runtime = Arc::clone(&self.endpoints[endpoint_id.0]);

            let breaker_decision = self.guard_breaker(&runtime, || runtime.breaker.should_allow(), Decision::Allow);
            match breaker_decision {
                Decision::RejectOpen => {
                    tabu.insert(endpoint_id);
                    attempts += 1;
                    continue;
                }
                Decision::Allow | Decision::AllowProbe => {}
            }

            if !self.guard_bucket(&runtime, || runtime.bucket.try_consume(1.0), true) {
                tabu.insert(endpoint_id);
                attempts += 1;
                continue;
            }

            attempts += 1;
            runtime.in_flight.fetch_add(1, Ordering::AcqRel);
            let start = Instant::now();

            let hedgeable = self.config.hedging.enabled
                && opts.idempotent != Some(false)
                && self.config.hedging.hedgeable_methods.contains(method)
                && !self.errors.monitor(Component::HedgedManager).is_isolated();

            let outcome: DispatchResult = if hedgeable {
                match AssertUnwindSafe(self.dispatch_hedged(id, endpoint_id, &tabu, method, &params))
                    .catch_unwind()
                    .await
                {
                    Ok(result) => result,
                    Err(_) => {
                        self.errors.monitor(Component::HedgedManager).record_failure(|| true);
                        self.dispatch_single(endpoint_id, id, method, &params, opts.cancel.as_ref())
                            .await
                    }
                }
            } else {
                self.dispatch_single(endpoint_id, id, method, &params, opts.cancel.as_ref())
                    .await
            };

            let elapsed = start.elapsed();
            runtime.in_flight.fetch_sub(1, Ordering::AcqRel);
            self.queue.signal_drain();

            match outcome {
                Ok((winner, value)) => {
                    let winner_runtime = &self.endpoints[winner.0];
                    self.guard_breaker(winner_runtime, || winner_runtime.breaker.record_success(), ());
                    winner_runtime.success_count.fetch_add(1, Ordering::Relaxed);
                    winner_runtime
                        .latency
                        .lock()
                        .unwrap()
                        .push(elapsed.as_millis() as u64);
                    self.total_requests.fetch_add(1, Ordering::Relaxed);
                    #[cfg(feature = "metrics")]
                    counter!("executor_calls_total", "outcome" => "success").increment(1);
                    return Ok(value);
                }
                Err(err) => {
                    let kind = err.kind();
                    let failed_endpoint = pool_error_endpoint(&err).unwrap_or(endpoint_id);
                    let failed_runtime = &self.endpoints[failed_endpoint.0];
                    failed_runtime.failure_count.fetch_add(1, Ordering::Relaxed);
                    self.total_requests.fetch_add(1, Ordering::Relaxed);
                    self.total_failures.fetch_add(1, Ordering::Relaxed);
                    if kind.counts_as_breaker_failure() {
                        self.guard_breaker(failed_runtime, || failed_runtime.breaker.record_failure(), ());
                    }
                    #[cfg(feature = "metrics")]
                    counter!("executor_calls_total", "outcome" => "failure").increment(1);

                    trail.push(AttemptOutcome {
                        endpoint: failed_endpoint,
                        kind,
                        message: err.to_string(),
                        elapsed,
                    });

                    if !kind.is_retryable() {
                        return Err(err);
                    }
                    tabu.insert(endpoint_id);
                    self.backoff(attempts).await;
                }
            }
        }
    }

    /// Runs `f` against the circuit breaker unless the breaker component is
    /// isolated, in which case it returns `fallback` untouched (spec §4.8:
    /// "treat all endpoints as closed, rely on transport errors"). A panic
    /// out of `f` is caught, counted against the breaker monitor, and also
    /// resolves to `fallback` for this call.
    fn guard_breaker<T: Clone>(&self, rt: &Arc<EndpointRuntime>, f: impl FnOnce() -> T, fallback: T) -> T {
        if self.errors.monitor(Component::CircuitBreaker).is_isolated() {
            return fallback;
        }
        match std::panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(v) => v,
            Err(_) => {
                let probe_rt = Arc::clone(rt);
                self.errors.monitor(Component::CircuitBreaker).record_failure(move || {
                    std::panic::catch_unwind(AssertUnwindSafe(|| probe_rt.breaker.peek_admissible())).is_ok()
                });
                fallback
            }
        }
    }

    /// Same as [`Self::guard_breaker`] but for the token bucket (spec §4.8:
    /// "skip rate check, rely on max_concurrent only").
    fn guard_bucket<T: Clone>(&self, rt: &Arc<EndpointRuntime>, f: impl FnOnce() -> T, fallback: T) -> T {
        if self.errors.monitor(Component::TokenBucket).is_isolated() {
            return fallback;
        }
        match std::panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(v) => v,
            Err(_) => {
                let probe_rt = Arc::clone(rt);
                self.errors.monitor(Component::TokenBucket).record_failure(move || {
                    // Re-integration probe resets the bucket before checking
                    // it, rather than just polling a still-wedged state.
                    std::panic::catch_unwind(AssertUnwindSafe(|| {
                        probe_rt.bucket.reset();
                        probe_rt.bucket.has_tokens(1.0)
                    }))
                    .is_ok()
                });
                fallback
            }
        }
    }

    /// Whether endpoint `idx` could take a request right now, folding in
    /// both resilience primitives' isolated-mode fallbacks.
    fn is_admissible(&self, idx: usize) -> bool {
        let rt = &self.endpoints[idx];
        let in_flight = rt.in_flight.load(Ordering::Acquire);
        let breaker_ok = self.guard_breaker(rt, || rt.breaker.peek_admissible(), true);
        let bucket_ok = self.guard_bucket(rt, || rt.bucket.has_tokens(1.0), true);
        breaker_ok && bucket_ok && in_flight < rt.config.max_concurrent
    }

    fn snapshot_for(&self, idx: usize) -> EndpointSnapshot {
        let rt = &self.endpoints[idx];
        EndpointSnapshot {
            endpoint: EndpointId(idx),
            admissible: self.is_admissible(idx),
            priority: rt.config.priority,
            weight: rt.config.weight,
            p50_latency_ms: rt.latency.lock().unwrap().percentile(0.5),
            in_flight: rt.in_flight.load(Ordering::Acquire),
            max_concurrent: rt.config.max_concurrent,
            recent_failure_rate: rt.recent_failure_rate(),
        }
    }

    /// Selector isolated-mode fallback (spec §4.8): ignore scoring entirely
    /// and rotate through admissible endpoints by index.
    fn round_robin_fallback(&self, candidates: &[usize]) -> Option<EndpointId> {
        let admissible: Vec<usize> = candidates.iter().copied().filter(|&i| self.is_admissible(i)).collect();
        if admissible.is_empty() {
            return None;
        }
        let idx = self.round_robin.fetch_add(1, Ordering::Relaxed) % admissible.len();
        Some(EndpointId(admissible[idx]))
    }

    fn pick_endpoint(&self, tabu: &HashSet<EndpointId>) -> Option<EndpointId> {
        let candidates: Vec<usize> = (0..self.endpoints.len())
            .filter(|i| !tabu.contains(&EndpointId(*i)))
            .collect();
        if self.errors.monitor(Component::Selector).is_isolated() {
            return self.round_robin_fallback(&candidates);
        }
        let snapshots: Vec<EndpointSnapshot> = candidates.iter().map(|&i| self.snapshot_for(i)).collect();
        match std::panic::catch_unwind(AssertUnwindSafe(|| {
            self.selector.select(&snapshots, &self.config.selector_weights)
        })) {
            Ok(result) => result,
            Err(_) => {
                self.errors.monitor(Component::Selector).record_failure(|| true);
                self.round_robin_fallback(&candidates)
            }
        }
    }

    fn rank_backups(&self, primary: EndpointId, tabu: &HashSet<EndpointId>) -> Vec<EndpointId> {
        let candidates: Vec<usize> = (0..self.endpoints.len())
            .filter(|&i| EndpointId(i) != primary && !tabu.contains(&EndpointId(i)))
            .collect();
        if self.errors.monitor(Component::Selector).is_isolated() {
            return candidates.into_iter().filter(|&i| self.is_admissible(i)).map(EndpointId).collect();
        }
        let snapshots: Vec<EndpointSnapshot> = candidates.iter().map(|&i| self.snapshot_for(i)).collect();
        match std::panic::catch_unwind(AssertUnwindSafe(|| {
            self.selector.rank(&snapshots, &self.config.selector_weights)
        })) {
            Ok(v) => v,
            Err(_) => {
                self.errors.monitor(Component::Selector).record_failure(|| true);
                candidates.into_iter().filter(|&i| self.is_admissible(i)).map(EndpointId).collect()
            }
        }
    }

    /// `None` if there's no live (non-tabu) candidate left to judge;
    /// `Some(true)` if every live candidate is specifically rejected by its
    /// breaker (as opposed to rate-limited or at concurrency capacity).
    /// Always `Some(false)` while the breaker component itself is isolated,
    /// since its rejection signal isn't in play (spec §4.8 fallback).
    fn all_remaining_breaker_rejected(&self, tabu: &HashSet<EndpointId>) -> Option<bool> {
        if self.errors.monitor(Component::CircuitBreaker).is_isolated() {
            return Some(false);
        }
        let remaining: Vec<usize> = (0..self.endpoints.len())
            .filter(|i| !tabu.contains(&EndpointId(*i)))
            .collect();
        if remaining.is_empty() {
            return None;
        }
        Some(remaining.iter().all(|&i| {
            let rt = &self.endpoints[i];
            !self.guard_breaker(rt, || rt.breaker.peek_admissible(), true)
        }))
    }

    fn any_capacity_endpoint(&self) -> Option<EndpointId> {
        (0..self.endpoints.len()).find(|&i| self.is_admissible(i)).map(EndpointId)
    }

    async fn dispatch_single(
        &self,
        endpoint_id: EndpointId,
        request_id: RequestId,
        method: &str,
        params: &Value,
        external_cancel: Option<&CancellationToken>,
    ) -> DispatchResult {
        let runtime = &self.endpoints[endpoint_id.0];
        let token = external_cancel.cloned().unwrap_or_else(CancellationToken::new);
        runtime
            .transport
            .call(request_id.0, method, params.clone(), &token)
            .await
            .map(|v| (endpoint_id, v))
    }

    /// Races `primary` against up to `hedging.max_backups` of the
    /// next-best-ranked non-tabu endpoints (spec §4.6). Backup endpoints get
    /// their own `in_flight` bookkeeping and breaker credit for whichever
    /// one resolves; the primary's bookkeeping is already owned by the
    /// caller (it's debited before this is called, same as the unhedged
    /// path). Backups don't debit their token bucket — hedging borrows
    /// momentary headroom on endpoints already known-admissible rather than
    /// competing with ordinary calls for rate budget.
    async fn dispatch_hedged(
        self: &Arc<Self>,
        request_id: RequestId,
        primary: EndpointId,
        tabu: &HashSet<EndpointId>,
        method: &str,
        params: &Value,
    ) -> DispatchResult {
        let mut candidates = vec![primary];
        candidates.extend(self.rank_backups(primary, tabu));

        let method = method.to_string();
        let params = params.clone();
        let this = Arc::clone(self);

        let outcome = execute_hedged(
            request_id,
            &candidates,
            &self.config.hedging,
            &self.events,
            move |endpoint, cancel| {
                let this = Arc::clone(&this);
                let method = method.clone();
                let params = params.clone();
                async move {
                    this.dispatch_backup(endpoint, primary, request_id, &method, params, cancel)
                        .await
                }
            },
        )
        .await;

        match outcome {
            Some(o) => o.result.map(|v| (o.winner, v)),
            None => Err(PoolError::Cancelled),
        }
    }

    async fn dispatch_backup(
        &self,
        endpoint: EndpointId,
        primary: EndpointId,
        request_id: RequestId,
        method: &str,
        params: Value,
        cancel: CancellationToken,
    ) -> Result<Value, PoolError> {
        let runtime = &self.endpoints[endpoint.0];
        let is_backup = endpoint != primary;
        if is_backup {
            runtime.in_flight.fetch_add(1, Ordering::AcqRel);
        }
        let result = runtime.transport.call(request_id.0, method, params, &cancel).await;
        if is_backup {
            runtime.in_flight.fetch_sub(1, Ordering::AcqRel);
            match &result {
                Ok(_) => {
                    self.guard_breaker(runtime, || runtime.breaker.record_success(), ());
                }
                Err(e) if e.kind().counts_as_breaker_failure() => {
                    self.guard_breaker(runtime, || runtime.breaker.record_failure(), ());
                }
                Err(_) => {}
            }
        }
        result
    }

    async fn backoff(&self, attempt: usize) {
        const BASE_MS: u64 = 25;
        const CAP_MS: u64 = 500;
        let doubled = BASE_MS.saturating_mul(1u64 << attempt.min(6));
        let capped = doubled.min(CAP_MS);
        let jitter = rand::rng().random_range(0..=capped / 4 + 1);
        tokio::time::sleep(Duration::from_millis(capped + jitter)).await;
    }

    fn deadline_error(&self, trail: Vec<AttemptOutcome>) -> PoolError {
        PoolError::DeadlineExceeded {
            attempts: trail.iter().map(AttemptOutcomeLite::from).collect(),
        }
    }

    async fn wait_for_capacity(&self, id: RequestId, deadline: Instant) -> Result<bool, QueueWaitError> {
        if self.queue.is_destroyed() {
            return Err(QueueWaitError::Destroyed);
        }
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(id, tx);

        let entry = QueuedEntry {
            request_id: id,
            enqueued_at: Instant::now(),
            deadline,
        };
        if let Err(e) = self.queue.enqueue(entry) {
            self.pending.lock().unwrap().remove(&id);
            return match e {
                EnqueueError::Full { .. } => Err(QueueWaitError::Full),
                EnqueueError::Destroyed => Err(QueueWaitError::Destroyed),
            };
        }
        self.queue.signal_drain();

        match tokio::time::timeout_at(tokio::time::Instant::from_std(deadline), rx).await {
            Ok(Ok(admitted)) => Ok(admitted),
            Ok(Err(_)) => Err(QueueWaitError::Destroyed),
            Err(_) => {
                self.pending.lock().unwrap().remove(&id);
                Ok(false)
            }
        }
    }

    /// Background drainer: on every queue signal or a short fallback tick,
    /// checks whether the head of the queue can now be admitted somewhere
    /// and wakes the matching waiter. Runs for the pool's lifetime; stored
    /// as a `JoinHandle` so `destroy()` can abort it (spec §4.5, §4.8 — a
    /// component throwing during shutdown is ignored, not propagated).
    fn spawn_pump(this: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(25));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = this.queue.notified() => {}
                    _ = interval.tick() => {}
                }
                if this.destroyed.load(Ordering::Acquire) {
                    break;
                }
                let now = Instant::now();
                let (dispatched, expired) = this.queue.drain(now, |_entry| this.any_capacity_endpoint());
                let mut pending = this.pending.lock().unwrap();
                for entry in dispatched {
                    if let Some(tx) = pending.remove(&entry.request_id) {
                        let _ = tx.send(true);
                    }
                }
                for entry in expired {
                    if let Some(tx) = pending.remove(&entry.request_id) {
                        let _ = tx.send(false);
                    }
                }
            }
        })
    }

    /// Tears the pool down: stops the queue pump, rejects every queued
    /// waiter with a deadline failure, and shuts down the component
    /// monitors. Idempotent.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(handle) = self.pump.lock().unwrap().take() {
            handle.abort();
        }
        let drained = self.queue.destroy();
        let mut pending = self.pending.lock().unwrap();
        for entry in drained {
            if let Some(tx) = pending.remove(&entry.request_id) {
                let _ = tx.send(false);
            }
        }
        for (_, tx) in pending.drain() {
            let _ = tx.send(false);
        }
        drop(pending);
        self.errors.shutdown();
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> PoolStats {
        let endpoints = self
            .endpoints
            .iter()
            .map(|rt| {
                let latency = rt.latency.lock().unwrap();
                rpc_pool_core::EndpointStats {
                    endpoint: rt.id,
                    url: rt.config.url.clone(),
                    breaker_state: rt.breaker.state().as_str(),
                    in_flight: rt.in_flight.load(Ordering::Acquire),
                    max_concurrent: rt.config.max_concurrent,
                    tokens_available: rt.bucket.available(),
                    success_count: rt.success_count.load(Ordering::Relaxed),
                    failure_count: rt.failure_count.load(Ordering::Relaxed),
                    p50_latency_ms: latency.percentile(0.5),
                    p99_latency_ms: latency.percentile(0.99),
                    recent_breaker_events: self.breaker_history.recent(rt.id),
                }
            })
            .collect();

        let global = GlobalStats {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            queue_len: self.queue.len(),
            max_queue_size: self.config.max_queue_size,
            isolated_components: self.errors.isolated_components(),
            capability_pct: self.errors.capability_pct(),
        };
        PoolStats { global, endpoints }
    }

    pub fn load_distribution(&self) -> Vec<LoadShare> {
        let total: u64 = self
            .endpoints
            .iter()
            .map(|rt| rt.success_count.load(Ordering::Relaxed) + rt.failure_count.load(Ordering::Relaxed))
            .sum();
        self.endpoints
            .iter()
            .map(|rt| {
                let requests = rt.success_count.load(Ordering::Relaxed) + rt.failure_count.load(Ordering::Relaxed);
                let percentage = if total == 0 { 0.0 } else { requests as f64 / total as f64 * 100.0 };
                let utilisation = if rt.config.max_concurrent == 0 {
                    0.0
                } else {
                    rt.in_flight.load(Ordering::Acquire) as f64 / rt.config.max_concurrent as f64
                };
                LoadShare {
                    url: rt.config.url.clone(),
                    requests,
                    percentage,
                    utilisation,
                }
            })
            .collect()
    }
}

fn pool_error_endpoint(err: &PoolError) -> Option<EndpointId> {
    match err {
        PoolError::Timeout { endpoint }
        | PoolError::Network { endpoint, .. }
        | PoolError::RateLimited { endpoint }
        | PoolError::Server { endpoint, .. }
        | PoolError::Client { endpoint, .. }
        | PoolError::RpcError { endpoint, .. } => Some(*endpoint),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpc_pool_core::{BreakerHistory, EventBusBuilder};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn endpoint_config(url: String) -> EndpointConfig {
        EndpointConfig {
            url,
            max_concurrent: 10,
            rps_limit: 1000.0,
            burst_capacity: 1000.0,
            weight: 1.0,
            priority: 0,
            timeout_ms: 2_000,
        }
    }

    async fn build_executor(configs: Vec<EndpointConfig>, mut pool_config: PoolConfig) -> Arc<Executor> {
        pool_config.hedging.enabled = false;
        let events = EventBusBuilder::new().build();
        let errors = Arc::new(ErrorHandlerRegistry::new(events.clone()));
        let history = Arc::new(BreakerHistory::new());
        Executor::new(configs, pool_config, events, errors, history).unwrap()
    }

    #[tokio::test]
    async fn single_endpoint_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1, "result": 42,
            })))
            .mount(&server)
            .await;

        let executor = build_executor(vec![endpoint_config(server.uri())], PoolConfig::default()).await;
        let result = executor.call("getSlot", json!([]), CallOptions::default()).await.unwrap();
        assert_eq!(result, json!(42));
    }

    #[tokio::test]
    async fn fails_over_to_second_endpoint_after_server_error() {
        let bad = MockServer::start().await;
        Mock::given(method("POST")).respond_with(ResponseTemplate::new(503)).mount(&bad).await;
        let good = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1, "result": "ok",
            })))
            .mount(&good)
            .await;

        let executor = build_executor(
            vec![endpoint_config(bad.uri()), endpoint_config(good.uri())],
            PoolConfig::default(),
        )
        .await;
        let result = executor.call("getSlot", json!([]), CallOptions::default()).await.unwrap();
        assert_eq!(result, json!("ok"));
    }

    #[tokio::test]
    async fn non_retryable_client_error_surfaces_immediately() {
        let server = MockServer::start().await;
        Mock::given(method("POST")).respond_with(ResponseTemplate::new(400)).mount(&server).await;

        let executor = build_executor(vec![endpoint_config(server.uri())], PoolConfig::default()).await;
        let err = executor.call("getSlot", json!([]), CallOptions::default()).await.unwrap_err();
        assert!(matches!(err, PoolError::Client { status: 400, .. }));
    }

    #[tokio::test]
    async fn exhausting_all_endpoints_returns_deadline_exceeded() {
        let bad = MockServer::start().await;
        Mock::given(method("POST")).respond_with(ResponseTemplate::new(503)).mount(&bad).await;

        let mut config = PoolConfig::default();
        config.max_attempts = 2;
        config.default_failover_budget_ms = 2_000;
        config.default_timeout_ms = 2_000;
        let executor = build_executor(vec![endpoint_config(bad.uri())], config).await;
        let err = executor.call("getSlot", json!([]), CallOptions::default()).await.unwrap_err();
        assert!(matches!(err, PoolError::DeadlineExceeded { .. }));
    }

    #[tokio::test]
    async fn destroy_rejects_subsequent_calls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"jsonrpc":"2.0","id":1,"result":1})))
            .mount(&server)
            .await;
        let executor = build_executor(vec![endpoint_config(server.uri())], PoolConfig::default()).await;
        executor.destroy();
        let err = executor.call("getSlot", json!([]), CallOptions::default()).await.unwrap_err();
        assert!(matches!(err, PoolError::PoolDestroyed));
    }

    #[tokio::test]
    async fn all_breakers_open_fails_fast_with_circuit_open() {
        let server = MockServer::start().await;
        Mock::given(method("POST")).respond_with(ResponseTemplate::new(503)).mount(&server).await;

        let mut config = PoolConfig::default();
        config.breaker.failure_threshold = 1;
        config.default_failover_budget_ms = 500;
        config.default_timeout_ms = 500;
        config.max_attempts = 1;
        let executor = build_executor(vec![endpoint_config(server.uri())], config).await;

        // First call opens the breaker (threshold=1).
        let _ = executor.call("getSlot", json!([]), CallOptions::default()).await;
        assert_eq!(executor.endpoints[0].breaker.state(), rpc_pool_circuitbreaker::CircuitState::Open);

        let start = Instant::now();
        let err = executor.call("getSlot", json!([]), CallOptions::default()).await.unwrap_err();
        assert!(matches!(err, PoolError::CircuitOpen { .. }));
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn stats_reflect_successful_calls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"jsonrpc":"2.0","id":1,"result":1})))
            .mount(&server)
            .await;
        let executor = build_executor(vec![endpoint_config(server.uri())], PoolConfig::default()).await;
        executor.call("getSlot", json!([]), CallOptions::default()).await.unwrap();
        let stats = executor.stats();
        assert_eq!(stats.global.total_requests, 1);
        assert_eq!(stats.endpoints[0].success_count, 1);
    }

    #[tokio::test]
    async fn selector_isolation_falls_back_to_round_robin() {
        let server_a = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"jsonrpc":"2.0","id":1,"result":1})))
            .mount(&server_a)
            .await;
        let server_b = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"jsonrpc":"2.0","id":1,"result":1})))
            .mount(&server_b)
            .await;

        let executor = build_executor(
            vec![endpoint_config(server_a.uri()), endpoint_config(server_b.uri())],
            PoolConfig::default(),
        )
        .await;

        for _ in 0..3 {
            executor.errors.monitor(Component::Selector).record_failure(|| true);
        }
        assert!(executor.errors.monitor(Component::Selector).is_isolated());

        let tabu = HashSet::new();
        let first = executor.pick_endpoint(&tabu).unwrap();
        let second = executor.pick_endpoint(&tabu).unwrap();
        assert_ne!(first, second, "isolated selector should round-robin rather than repick the same endpoint");
    }

    #[tokio::test]
    async fn circuitbreaker_isolation_bypasses_forced_open_state() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"jsonrpc":"2.0","id":1,"result":1})))
            .mount(&server)
            .await;

        let executor = build_executor(vec![endpoint_config(server.uri())], PoolConfig::default()).await;
        executor.endpoints[0]
            .breaker
            .force_state(rpc_pool_circuitbreaker::CircuitState::Open);

        for _ in 0..3 {
            executor.errors.monitor(Component::CircuitBreaker).record_failure(|| true);
        }
        assert!(executor.errors.monitor(Component::CircuitBreaker).is_isolated());

        // With the breaker component isolated, should_allow() is never
        // consulted; the call goes through despite the endpoint's breaker
        // being forced OPEN.
        let result = executor.call("getSlot", json!([]), CallOptions::default()).await;
        assert!(result.is_ok(), "isolated breaker component should fall back to always-allow");
    }
}
