use std::time::Duration;

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::ProviderId;

/// Token-bucket limits for one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub requests_per_minute: u32,
    pub burst: u32,
}

impl RateLimit {
    pub const fn new(requests_per_minute: u32, burst: u32) -> Self {
        Self {
            requests_per_minute,
            burst,
        }
    }
}

/// Per-provider rate limit and breaker thresholds used to build its guard.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderPolicy {
    pub provider_id: ProviderId,
    pub rate_limit: RateLimit,
    pub breaker: CircuitBreakerConfig,
}

impl ProviderPolicy {
    pub fn new(provider_id: ProviderId, rate_limit: RateLimit, breaker: CircuitBreakerConfig) -> Self {
        Self {
            provider_id,
            rate_limit,
            breaker,
        }
    }

    /// Unofficial endpoint; kept well under the observed throttling point.
    pub fn yahoo_default() -> Self {
        Self::new(
            ProviderId::Yahoo,
            RateLimit::new(60, 10),
            CircuitBreakerConfig {
                failure_threshold: 3,
                open_timeout: Duration::from_secs(30),
                success_threshold: 2,
            },
        )
    }

    /// Free tier: 5 requests per minute.
    pub fn alphavantage_default() -> Self {
        Self::new(
            ProviderId::AlphaVantage,
            RateLimit::new(5, 5),
            CircuitBreakerConfig {
                failure_threshold: 3,
                open_timeout: Duration::from_secs(60),
                success_threshold: 1,
            },
        )
    }

    /// Free tier: 5 requests per minute.
    pub fn polygon_default() -> Self {
        Self::new(
            ProviderId::Polygon,
            RateLimit::new(5, 5),
            CircuitBreakerConfig {
                failure_threshold: 3,
                open_timeout: Duration::from_secs(60),
                success_threshold: 1,
            },
        )
    }

    pub fn fred_default() -> Self {
        Self::new(
            ProviderId::Fred,
            RateLimit::new(120, 20),
            CircuitBreakerConfig {
                failure_threshold: 5,
                open_timeout: Duration::from_secs(30),
                success_threshold: 1,
            },
        )
    }

    pub fn default_for(provider_id: ProviderId) -> Self {
        match provider_id {
            ProviderId::Yahoo => Self::yahoo_default(),
            ProviderId::AlphaVantage => Self::alphavantage_default(),
            ProviderId::Polygon => Self::polygon_default(),
            ProviderId::Fred => Self::fred_default(),
        }
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimit) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn with_breaker(mut self, breaker: CircuitBreakerConfig) -> Self {
        self.breaker = breaker;
        self
    }
}
