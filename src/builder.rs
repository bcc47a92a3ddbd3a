use crate::error::PoolBuildError;
use crate::Pool;
use rpc_pool_core::{BreakerHistory, EndpointConfig, EventBusBuilder, EventListener, PoolConfig};
use rpc_pool_errorhandler::ErrorHandlerRegistry;
use rpc_pool_executor::Executor;
use std::sync::Arc;

/// Builds a [`Pool`] from a set of endpoint URLs/configs, pool-wide tuning,
/// and event listeners. Listeners registered here are the only ones that
/// ever see events — every subsystem shares one [`rpc_pool_core::EventBus`]
/// built once `build()` runs (spec §6 `on()`).
pub struct PoolBuilder {
    endpoints: Vec<EndpointConfig>,
    config: PoolConfig,
    event_bus: EventBusBuilder,
}

impl Default for PoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PoolBuilder {
    pub fn new() -> Self {
        Self {
            endpoints: Vec::new(),
            config: PoolConfig::default(),
            event_bus: EventBusBuilder::new(),
        }
    }

    /// Adds an endpoint with the pool's current defaults for rate limit,
    /// concurrency, and timeout. Call [`Self::config`] first if you want
    /// different defaults for endpoints added afterward.
    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        let cfg = EndpointConfig::new(url, &self.config);
        self.endpoints.push(cfg);
        self
    }

    /// Adds an endpoint with fully explicit per-endpoint configuration.
    pub fn endpoint_with(mut self, config: EndpointConfig) -> Self {
        self.endpoints.push(config);
        self
    }

    pub fn config(mut self, config: PoolConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers a listener for pool events (breaker transitions, hedge
    /// starts, component isolation, ...). Spec §6 `on(event, handler)`.
    pub fn on<L: EventListener + 'static>(mut self, listener: L) -> Self {
        self.event_bus.add(listener);
        self
    }

    pub fn build(mut self) -> Result<Pool, PoolBuildError> {
        if self.endpoints.is_empty() {
            return Err(PoolBuildError::NoEndpoints);
        }
        let history = Arc::new(BreakerHistory::new());
        self.event_bus.add(Arc::clone(&history));
        let events = self.event_bus.build();
        let errors = Arc::new(ErrorHandlerRegistry::new(events.clone()));
        let executor = Executor::new(self.endpoints, self.config, events, errors, history)?;
        Ok(Pool { executor })
    }
}
