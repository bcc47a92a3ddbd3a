use rpc_pool_core::ErrorKind;
use thiserror::Error;

/// Raised by [`crate::CircuitBreaker::should_allow`] callers that want a
/// typed rejection instead of matching on [`crate::Decision`].
#[derive(Debug, Clone, Error)]
#[error("circuit open for {endpoint}")]
pub struct CircuitOpenError {
    pub endpoint: rpc_pool_core::EndpointId,
}

impl CircuitOpenError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::CircuitOpen
    }
}
