//! Per-endpoint circuit breaker (spec §4.2).
//!
//! Unlike a generic middleware breaker tracking a sliding window of call
//! outcomes, this one tracks consecutive failures/successes only — the
//! selector and error handler already carry their own windows, and a
//! per-endpoint breaker re-deriving a failure *rate* here would just be a
//! second, slower-reacting copy of the same signal.

pub mod circuit;
pub mod error;

pub use circuit::{CircuitBreaker, CircuitState, Decision};
pub use error::CircuitOpenError;
