use thiserror::Error;

/// Errors raised while building or configuring a [`crate::TokenBucket`].
#[derive(Debug, Clone, Error)]
pub enum RateLimiterError {
    #[error("rps_limit must be positive, got {0}")]
    InvalidRpsLimit(f64),
    #[error("burst_capacity ({burst}) must be >= steady_capacity ({steady})")]
    BurstBelowSteady { burst: f64, steady: f64 },
}
