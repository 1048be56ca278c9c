use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::{Clock, DefaultClock};
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};

use crate::provider_policy::RateLimit;

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Token bucket refilled at `requests_per_minute`, holding at most `burst` tokens.
#[derive(Clone)]
pub struct TokenBucket {
    limiter: Arc<DirectRateLimiter>,
    clock: DefaultClock,
    limit: RateLimit,
}

impl TokenBucket {
    pub fn new(limit: RateLimit) -> Self {
        let clock = DefaultClock::default();
        Self {
            limiter: Arc::new(RateLimiter::direct_with_clock(quota_for(limit), &clock)),
            clock,
            limit,
        }
    }

    /// Takes one token, or returns how long until one is available.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        self.limiter
            .check()
            .map_err(|not_until| not_until.wait_time_from(self.clock.now()))
    }

    pub fn limit(&self) -> RateLimit {
        self.limit
    }
}

fn quota_for(limit: RateLimit) -> Quota {
    let per_minute = NonZeroU32::new(limit.requests_per_minute.max(1))
        .expect("requests per minute is at least one");
    let burst = NonZeroU32::new(limit.burst.max(1)).expect("burst is at least one");

    Quota::per_minute(per_minute).allow_burst(burst)
}
