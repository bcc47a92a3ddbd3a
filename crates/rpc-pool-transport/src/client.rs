use crate::envelope::{JsonRpcEnvelope, JsonRpcResponse};
use crate::error::{classify_reqwest_error, classify_status};
use rpc_pool_core::{EndpointId, PoolError};
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// One long-lived `reqwest::Client` per endpoint, reused across calls so
/// connections stay pooled (spec §4.4: "first call may be slow; subsequent
/// calls ≤ network RTT").
#[derive(Clone)]
pub struct EndpointTransport {
    endpoint: EndpointId,
    url: String,
    client: reqwest::Client,
}

impl EndpointTransport {
    pub fn new(endpoint: EndpointId, url: impl Into<String>, timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;
        Ok(Self {
            endpoint,
            url: url.into(),
            client,
        })
    }

    pub fn endpoint(&self) -> EndpointId {
        self.endpoint
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Sends one JSON-RPC request, racing the in-flight HTTP call against
    /// `cancel`. When `cancel` fires first the in-flight request is simply
    /// dropped (reqwest aborts the underlying connection) and
    /// [`PoolError::Cancelled`] is returned — the caller (the hedge manager)
    /// never waits for the server to actually respond.
    pub async fn call(
        &self,
        id: u64,
        method: &str,
        params: Value,
        cancel: &CancellationToken,
    ) -> Result<Value, PoolError> {
        let envelope = JsonRpcEnvelope::new(id, method, params);
        let start = Instant::now();

        let send = self
            .client
            .post(&self.url)
            .header("content-type", "application/json")
            .json(&envelope)
            .send();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PoolError::Cancelled),
            result = send => result,
        };

        let response = response.map_err(|e| classify_reqwest_error(self.endpoint, &e))?;
        let status = response.status();
        if let Some(err) = classify_status(self.endpoint, status) {
            return Err(err);
        }

        let parse = response.json::<JsonRpcResponse>();
        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PoolError::Cancelled),
            result = parse => result,
        };
        let body = body.map_err(|e| classify_reqwest_error(self.endpoint, &e))?;

        tracing::debug!(
            endpoint = %self.endpoint,
            method,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "rpc call completed"
        );

        if let Some(error) = body.error {
            return Err(PoolError::RpcError {
                endpoint: self.endpoint,
                code: error.code,
                message: error.message,
            });
        }
        body.result.ok_or_else(|| PoolError::RpcError {
            endpoint: self.endpoint,
            code: 0,
            message: "response carried neither result nor error".to_string(),
        })
    }
}
