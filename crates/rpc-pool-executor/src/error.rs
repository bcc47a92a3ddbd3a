use thiserror::Error;

/// Errors that can occur while standing up the executor's per-endpoint
/// transports. Everything else surfaces through [`rpc_pool_core::PoolError`].
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("failed to build transport for endpoint: {0}")]
    Transport(#[from] reqwest::Error),
}
