//! Per-endpoint token-bucket admission control (spec §4.1).
//!
//! A [`TokenBucket`] is purely local state behind a `Mutex`: no background
//! task, no shared clock beyond [`std::time::Instant`]. The pool constructs
//! one bucket per endpoint and consults it before dispatching a request.

pub mod bucket;
pub mod config;
pub mod error;

pub use bucket::TokenBucket;
pub use config::{TokenBucketConfig, TokenBucketConfigBuilder};
pub use error::RateLimiterError;
