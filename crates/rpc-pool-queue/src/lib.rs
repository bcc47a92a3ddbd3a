//! Bounded FIFO admission queue (spec §4.5).
//!
//! Requests land here only when every endpoint failed admission but the
//! pool isn't fully saturated. The queue holds no handles to the actual
//! async work — just enough to let the executor re-attempt dispatch and to
//! reject entries whose deadline has passed.

use rpc_pool_core::{EndpointId, RequestId};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Instant;
use tokio::sync::Notify;

#[cfg(feature = "metrics")]
use metrics::gauge;

/// An admission request waiting for endpoint capacity to free up.
#[derive(Debug, Clone)]
pub struct QueuedEntry {
    pub request_id: RequestId,
    pub enqueued_at: Instant,
    pub deadline: Instant,
}

impl QueuedEntry {
    fn expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueError {
    Full { len: usize, max: usize },
    Destroyed,
}

/// Mutex-guarded `VecDeque`. Strict FIFO: only the head is ever tested
/// against admission, so a blocked head holds up the whole queue rather
/// than letting later requests jump ahead (spec §4.5).
pub struct RequestQueue {
    max_len: usize,
    inner: Mutex<VecDeque<QueuedEntry>>,
    destroyed: AtomicBool,
    drain_signal: Notify,
    name: &'static str,
}

impl RequestQueue {
    pub fn new(max_len: usize) -> Self {
        Self::named(max_len, "default")
    }

    pub fn named(max_len: usize, name: &'static str) -> Self {
        Self {
            max_len,
            inner: Mutex::new(VecDeque::new()),
            destroyed: AtomicBool::new(false),
            drain_signal: Notify::new(),
            name,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn enqueue(&self, entry: QueuedEntry) -> Result<(), EnqueueError> {
        if self.destroyed.load(Ordering::Acquire) {
            return Err(EnqueueError::Destroyed);
        }
        let mut inner = self.inner.lock().unwrap();
        if inner.len() >= self.max_len {
            return Err(EnqueueError::Full {
                len: inner.len(),
                max: self.max_len,
            });
        }
        inner.push_back(entry);
        #[cfg(feature = "metrics")]
        gauge!("queue_len", "queue" => self.name).set(inner.len() as f64);
        Ok(())
    }

    /// Called by the executor on every completion or rate-limiter refill
    /// tick. `admits` is consulted only against the current head; expired
    /// heads are popped as they're found regardless of `admits`.
    pub fn drain<F>(&self, now: Instant, mut admits: F) -> (Vec<QueuedEntry>, Vec<QueuedEntry>)
    where
        F: FnMut(&QueuedEntry) -> Option<EndpointId>,
    {
        let mut dispatched = Vec::new();
        let mut expired = Vec::new();
        let mut inner = self.inner.lock().unwrap();

        loop {
            let Some(front) = inner.front() else { break };
            if front.expired(now) {
                expired.push(inner.pop_front().unwrap());
                continue;
            }
            if admits(front).is_some() {
                dispatched.push(inner.pop_front().unwrap());
                continue;
            }
            break;
        }

        #[cfg(feature = "metrics")]
        gauge!("queue_len", "queue" => self.name).set(inner.len() as f64);
        (dispatched, expired)
    }

    /// Wakes any task waiting on [`Self::notified`]. The executor calls
    /// this after every completion and every successful token refill so
    /// queued callers get a prompt re-check instead of polling.
    pub fn signal_drain(&self) {
        self.drain_signal.notify_waiters();
    }

    pub async fn notified(&self) {
        self.drain_signal.notified().await;
    }

    /// Marks the queue closed and rejects every remaining entry with
    /// "pool-destroyed" (spec §4.5). Further `enqueue` calls fail fast.
    pub fn destroy(&self) -> Vec<QueuedEntry> {
        self.destroyed.store(true, Ordering::Release);
        let mut inner = self.inner.lock().unwrap();
        let drained: Vec<_> = inner.drain(..).collect();
        self.drain_signal.notify_waiters();
        drained
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn entry(id: u64, deadline_in: Duration) -> QueuedEntry {
        QueuedEntry {
            request_id: RequestId(id),
            enqueued_at: Instant::now(),
            deadline: Instant::now() + deadline_in,
        }
    }

    #[test]
    fn rejects_when_full() {
        let queue = RequestQueue::new(2);
        queue.enqueue(entry(1, Duration::from_secs(1))).unwrap();
        queue.enqueue(entry(2, Duration::from_secs(1))).unwrap();
        let err = queue.enqueue(entry(3, Duration::from_secs(1))).unwrap_err();
        assert_eq!(err, EnqueueError::Full { len: 2, max: 2 });
    }

    #[test]
    fn drain_stops_at_blocked_head() {
        let queue = RequestQueue::new(10);
        queue.enqueue(entry(1, Duration::from_secs(10))).unwrap();
        queue.enqueue(entry(2, Duration::from_secs(10))).unwrap();
        let (dispatched, expired) = queue.drain(Instant::now(), |_| None);
        assert!(dispatched.is_empty());
        assert!(expired.is_empty());
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn drain_dispatches_admitted_head_only() {
        let queue = RequestQueue::new(10);
        queue.enqueue(entry(1, Duration::from_secs(10))).unwrap();
        queue.enqueue(entry(2, Duration::from_secs(10))).unwrap();
        let mut calls = 0;
        let (dispatched, _) = queue.drain(Instant::now(), |_| {
            calls += 1;
            if calls == 1 {
                Some(EndpointId(0))
            } else {
                None
            }
        });
        assert_eq!(dispatched.len(), 1);
        assert_eq!(dispatched[0].request_id, RequestId(1));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn expired_head_is_rejected_during_drain() {
        let queue = RequestQueue::new(10);
        queue.enqueue(entry(1, Duration::from_millis(1))).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        let (dispatched, expired) = queue.drain(Instant::now(), |_| Some(EndpointId(0)));
        assert!(dispatched.is_empty());
        assert_eq!(expired.len(), 1);
    }

    #[test]
    fn destroy_rejects_remaining_and_blocks_new_work() {
        let queue = RequestQueue::new(10);
        queue.enqueue(entry(1, Duration::from_secs(10))).unwrap();
        let drained = queue.destroy();
        assert_eq!(drained.len(), 1);
        assert_eq!(
            queue.enqueue(entry(2, Duration::from_secs(10))),
            Err(EnqueueError::Destroyed)
        );
    }

    #[tokio::test]
    async fn notified_wakes_on_signal() {
        let queue = std::sync::Arc::new(RequestQueue::new(10));
        let q2 = queue.clone();
        let handle = tokio::spawn(async move {
            q2.notified().await;
        });
        tokio::task::yield_now().await;
        queue.signal_drain();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("notified should wake promptly")
            .unwrap();
    }
}
