use rpc_pool_core::{EndpointId, ErrorKind, PoolError};

/// Maps a transport-level failure to the shared [`PoolError`] taxonomy so
/// the breaker's `counts_as_breaker_failure` policy stays in one place
/// (spec §4.2's failure classification table).
pub fn classify_reqwest_error(endpoint: EndpointId, err: &reqwest::Error) -> PoolError {
    if err.is_timeout() {
        PoolError::Timeout { endpoint }
    } else if err.is_connect() || err.is_request() {
        PoolError::Network {
            endpoint,
            message: err.to_string(),
        }
    } else {
        PoolError::Network {
            endpoint,
            message: err.to_string(),
        }
    }
}

/// Maps an HTTP status code that made it back (i.e. not a transport-level
/// failure) to a [`PoolError`], per spec §4.2's classification table: 5xx
/// and 429 count as breaker failures, other 4xx do not.
pub fn classify_status(endpoint: EndpointId, status: reqwest::StatusCode) -> Option<PoolError> {
    if status.is_success() {
        return None;
    }
    if status.as_u16() == 429 {
        return Some(PoolError::RateLimited { endpoint });
    }
    if status.is_server_error() {
        return Some(PoolError::Server {
            endpoint,
            status: status.as_u16(),
        });
    }
    Some(PoolError::Client {
        endpoint,
        status: status.as_u16(),
        message: status.canonical_reason().unwrap_or("unknown").to_string(),
    })
}

pub fn kind_of(err: &PoolError) -> ErrorKind {
    err.kind()
}
