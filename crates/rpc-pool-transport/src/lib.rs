//! JSON-RPC 2.0 HTTP transport (spec §4.4).

pub mod client;
pub mod envelope;
pub mod error;

pub use client::EndpointTransport;
pub use envelope::{JsonRpcEnvelope, JsonRpcErrorBody, JsonRpcResponse};
