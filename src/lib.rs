//! Resilient JSON-RPC 2.0 connection pool for fleets of RPC endpoints
//! (Solana and compatible chains), combining per-endpoint token-bucket rate
//! limiting, circuit breaking, latency/capacity-aware selection, hedged
//! speculative requests, a bounded admission queue, and cross-component
//! failure isolation behind a single `call()` entry point.
//!
//! ```no_run
//! use rpc_pool::{CallOptions, Pool};
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = Pool::builder()
//!     .endpoint("https://rpc-a.example.com")
//!     .endpoint("https://rpc-b.example.com")
//!     .build()?;
//!
//! let slot = pool.call("getSlot", json!([]), CallOptions::default()).await?;
//! println!("slot: {slot}");
//! # Ok(())
//! # }
//! ```

mod builder;
mod error;

pub use builder::PoolBuilder;
pub use error::PoolBuildError;
pub use rpc_pool_core::{
    BreakerConfig, BreakerEvent, EndpointConfig, EndpointStats, EventListener, GlobalStats,
    HedgingConfig, LoadShare, PoolConfig, PoolError, PoolEvent, PoolStats, SelectorWeights,
};
pub use rpc_pool_executor::CallOptions;

use rpc_pool_executor::Executor;
use serde_json::Value;
use std::sync::Arc;

/// A running pool. Construct via [`Pool::builder`]; cheap to clone (all
/// state lives behind the inner `Arc`d executor), so it's safe to share
/// across tasks.
#[derive(Clone)]
pub struct Pool {
    executor: Arc<Executor>,
}

impl Pool {
    pub fn builder() -> PoolBuilder {
        PoolBuilder::new()
    }

    /// Executes one JSON-RPC call against the pool, selecting, retrying,
    /// and failing over across endpoints per spec §4.7.
    pub async fn call(&self, method: &str, params: Value, opts: CallOptions) -> Result<Value, PoolError> {
        self.executor.call(method, params, opts).await
    }

    pub fn get_stats(&self) -> PoolStats {
        self.executor.stats()
    }

    pub fn get_load_distribution(&self) -> Vec<LoadShare> {
        self.executor.load_distribution()
    }

    /// Shuts the pool down: stops the background queue pump and component
    /// probes, and rejects any queued calls with a deadline failure.
    /// Idempotent; subsequent `call()`s return [`PoolError::PoolDestroyed`].
    pub fn destroy(&self) {
        self.executor.destroy()
    }

    pub fn is_destroyed(&self) -> bool {
        self.executor.is_destroyed()
    }

    pub fn endpoint_count(&self) -> usize {
        self.executor.endpoint_count()
    }
}
