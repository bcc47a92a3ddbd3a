//! Shared types for the `rpc-pool` workspace: the event bus, the error
//! taxonomy, configuration, identity types, and the bounded ring buffer used
//! everywhere a rolling history is needed.

pub mod breaker_history;
pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod ring;
pub mod stats;

pub use breaker_history::{BreakerEvent, BreakerHistory};
pub use config::{BreakerConfig, EndpointConfig, HedgingConfig, PoolConfig, SelectorWeights};
pub use error::{AttemptOutcome, AttemptOutcomeLite, ErrorKind, PoolError};
pub use events::{EventBus, EventBusBuilder, EventListener, PoolEvent};
pub use ids::{EndpointId, RequestId, RequestIdGen};
pub use ring::Ring;
pub use stats::{EndpointStats, GlobalStats, LoadShare, PoolStats};
