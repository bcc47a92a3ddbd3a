use thiserror::Error;

/// Errors that can occur while constructing a [`crate::Pool`].
#[derive(Debug, Error)]
pub enum PoolBuildError {
    #[error("pool must be built with at least one endpoint")]
    NoEndpoints,
    #[error(transparent)]
    Executor(#[from] rpc_pool_executor::ExecutorError),
}
