//! The error taxonomy from spec §7, plus the classification used to decide
//! whether a given outcome should count against a circuit breaker and
//! whether an executor attempt loop should retry it.

use crate::ids::EndpointId;
use std::time::Duration;
use thiserror::Error;

/// Machine-readable error kind (spec §7's `kind` column).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    CircuitOpen,
    QueueFull,
    DeadlineExceeded,
    Timeout,
    Network,
    RateLimited,
    Server,
    Client,
    RpcError,
    Cancelled,
    PoolDestroyed,
    ComponentDegraded,
}

impl ErrorKind {
    /// Whether an executor attempt loop should try another endpoint after
    /// seeing this kind (spec §7 "Retried?" column).
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout | ErrorKind::Network | ErrorKind::RateLimited | ErrorKind::Server
        )
    }

    /// Whether this kind counts as a circuit-breaker failure under the
    /// default classification policy (spec §4.2).
    pub fn counts_as_breaker_failure(self) -> bool {
        matches!(
            self,
            ErrorKind::Network | ErrorKind::Timeout | ErrorKind::Server | ErrorKind::RateLimited
        )
    }
}

/// One attempt's outcome, kept on terminal errors for the "full attempt
/// trail" diagnostic requirement (spec §7).
#[derive(Debug, Clone)]
pub struct AttemptOutcome {
    pub endpoint: EndpointId,
    pub kind: ErrorKind,
    pub message: String,
    pub elapsed: Duration,
}

/// Top-level error returned by [`call`](crate)-style APIs.
#[derive(Debug, Error, Clone)]
pub enum PoolError {
    #[error("all candidate endpoints' circuit breakers rejected the call")]
    CircuitOpen { attempts: Vec<AttemptOutcomeLite> },

    #[error("request queue is full ({len}/{max})")]
    QueueFull { len: usize, max: usize },

    #[error("failover budget exceeded after {} attempt(s)", attempts.len())]
    DeadlineExceeded {
        attempts: Vec<AttemptOutcomeLite>,
    },

    #[error("no endpoint admitted the call and the queue has no room")]
    NoCapacity { attempts: Vec<AttemptOutcomeLite> },

    #[error("transport timeout on {endpoint}")]
    Timeout { endpoint: EndpointId },

    #[error("network error on {endpoint}: {message}")]
    Network { endpoint: EndpointId, message: String },

    #[error("rate limited on {endpoint}")]
    RateLimited { endpoint: EndpointId },

    #[error("server error ({status}) on {endpoint}")]
    Server { endpoint: EndpointId, status: u16 },

    #[error("client error ({status}) on {endpoint}: {message}")]
    Client {
        endpoint: EndpointId,
        status: u16,
        message: String,
    },

    #[error("rpc error {code} on {endpoint}: {message}")]
    RpcError {
        endpoint: EndpointId,
        code: i64,
        message: String,
    },

    #[error("call cancelled")]
    Cancelled,

    #[error("pool has been destroyed")]
    PoolDestroyed,
}

impl PoolError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PoolError::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            PoolError::QueueFull { .. } => ErrorKind::QueueFull,
            PoolError::DeadlineExceeded { .. } => ErrorKind::DeadlineExceeded,
            PoolError::NoCapacity { .. } => ErrorKind::DeadlineExceeded,
            PoolError::Timeout { .. } => ErrorKind::Timeout,
            PoolError::Network { .. } => ErrorKind::Network,
            PoolError::RateLimited { .. } => ErrorKind::RateLimited,
            PoolError::Server { .. } => ErrorKind::Server,
            PoolError::Client { .. } => ErrorKind::Client,
            PoolError::RpcError { .. } => ErrorKind::RpcError,
            PoolError::Cancelled => ErrorKind::Cancelled,
            PoolError::PoolDestroyed => ErrorKind::PoolDestroyed,
        }
    }
}

/// A `Clone`-friendly summary of [`AttemptOutcome`] embedded in terminal
/// errors (the full [`AttemptOutcome`] list lives in executor-side
/// diagnostics; this copy is what callers see on the error itself).
#[derive(Debug, Clone)]
pub struct AttemptOutcomeLite {
    pub endpoint: EndpointId,
    pub kind: ErrorKind,
}

impl From<&AttemptOutcome> for AttemptOutcomeLite {
    fn from(o: &AttemptOutcome) -> Self {
        Self {
            endpoint: o.endpoint,
            kind: o.kind,
        }
    }
}
