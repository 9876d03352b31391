//! Login throttling
//!
//! One greedy token bucket per caller key. With the defaults a caller holds 5
//! attempts and regains one every 12 seconds (5 per minute), which is the
//! GCRA quota `with_period(60s / 5).allow_burst(5)`.

use governor::clock::{Clock, DefaultClock};
use governor::middleware::NoOpMiddleware;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::time::Duration;
use tasklane_core::{ConfigError, RateLimitConfig};

type KeyedLimiter<C> =
    RateLimiter<String, DefaultKeyedStateStore<String>, C, NoOpMiddleware<<C as Clock>::Instant>>;

/// Per-caller login rate limiter
pub struct LoginRateLimiter<C: Clock = DefaultClock> {
    limiter: KeyedLimiter<C>,
    clock: C,
}

impl LoginRateLimiter<DefaultClock> {
    pub fn new(config: &RateLimitConfig) -> Result<Self, ConfigError> {
        Self::with_clock(config, DefaultClock::default())
    }
}

impl<C: Clock> LoginRateLimiter<C> {
    pub fn with_clock(config: &RateLimitConfig, clock: C) -> Result<Self, ConfigError> {
        let limiter = RateLimiter::dashmap_with_clock(quota(config)?, &clock);
        Ok(Self { limiter, clock })
    }

    /// Take one attempt from `caller`'s bucket
    ///
    /// On exhaustion returns how long until the next attempt is allowed.
    pub fn check(&self, caller: &str) -> Result<(), Duration> {
        self.limiter
            .check_key(&caller.to_string())
            .map_err(|not_until| not_until.wait_time_from(self.clock.now()))
    }

    /// Forget callers whose buckets are full again
    pub fn retain_recent(&self) {
        self.limiter.retain_recent();
    }

    /// Number of tracked callers
    pub fn tracked_callers(&self) -> usize {
        self.limiter.len()
    }
}

fn quota(config: &RateLimitConfig) -> Result<Quota, ConfigError> {
    let capacity = NonZeroU32::new(config.capacity).ok_or_else(|| ConfigError::InvalidValue {
        key: "rate_limit.capacity".to_string(),
        value: config.capacity.to_string(),
    })?;
    let refill = config.refill_tokens.max(1);
    let period = Duration::from_secs(config.refill_period_secs) / refill;

    Quota::with_period(period)
        .map(|q| q.allow_burst(capacity))
        .ok_or_else(|| ConfigError::InvalidValue {
            key: "rate_limit.refill_period_secs".to_string(),
            value: config.refill_period_secs.to_string(),
        })
}
