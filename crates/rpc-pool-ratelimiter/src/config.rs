use std::time::Duration;

/// Configuration for a single endpoint's [`crate::TokenBucket`] (spec §4.1).
#[derive(Debug, Clone, Copy)]
pub struct TokenBucketConfig {
    pub(crate) steady_capacity: f64,
    pub(crate) burst_capacity: f64,
    pub(crate) refill_rate: f64,
    pub(crate) burst_duration: Duration,
    pub(crate) burst_cooldown: Duration,
}

impl TokenBucketConfig {
    pub fn builder() -> TokenBucketConfigBuilder {
        TokenBucketConfigBuilder::new()
    }
}

/// Builder for [`TokenBucketConfig`].
pub struct TokenBucketConfigBuilder {
    steady_capacity: f64,
    burst_capacity: f64,
    refill_rate: f64,
    burst_duration: Duration,
    burst_cooldown: Duration,
}

impl Default for TokenBucketConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenBucketConfigBuilder {
    /// Defaults: steady capacity 5, refill rate matching steady capacity
    /// (i.e. rps=5), burst capacity 2x steady, burst window 10s, cooldown
    /// 10s before burst mode can re-activate.
    pub fn new() -> Self {
        Self {
            steady_capacity: 5.0,
            burst_capacity: 10.0,
            refill_rate: 5.0,
            burst_duration: Duration::from_secs(10),
            burst_cooldown: Duration::from_secs(10),
        }
    }

    pub fn rps_limit(mut self, rps: f64) -> Self {
        self.steady_capacity = rps;
        self.refill_rate = rps;
        self
    }

    pub fn burst_capacity(mut self, capacity: f64) -> Self {
        self.burst_capacity = capacity;
        self
    }

    pub fn burst_duration(mut self, duration: Duration) -> Self {
        self.burst_duration = duration;
        self
    }

    pub fn burst_cooldown(mut self, duration: Duration) -> Self {
        self.burst_cooldown = duration;
        self
    }

    pub fn build(self) -> TokenBucketConfig {
        TokenBucketConfig {
            steady_capacity: self.steady_capacity,
            burst_capacity: self.burst_capacity.max(self.steady_capacity),
            refill_rate: self.refill_rate,
            burst_duration: self.burst_duration,
            burst_cooldown: self.burst_cooldown,
        }
    }
}
