//! Timeout and bounded retry for store calls
//!
//! Every store call runs under a per-attempt timeout. Transient failures
//! (`Unavailable`, `Timeout`) are retried with capped exponential backoff,
//! but only for calls declared idempotent; an insert that timed out may have
//! landed, so it is attempted exactly once.

use crate::config::StoreConfig;
use crate::{StoreError, StoreResult};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Whether repeating a call is harmless
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Idempotency {
    Idempotent,
    NonIdempotent,
}

/// Per-call timeout plus retry schedule
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&StoreConfig::default())
    }
}

impl From<&StoreConfig> for RetryPolicy {
    fn from(config: &StoreConfig) -> Self {
        Self {
            timeout: Duration::from_millis(config.timeout_ms),
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            multiplier: config.backoff_multiplier,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (zero-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let delay = self.base_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32);
        let capped = (delay as u64).min(self.max_delay.as_millis() as u64);
        Duration::from_millis(capped)
    }

    /// Run `call` under this policy
    ///
    /// `op` names the call in logs.
    pub async fn run<T, F, Fut>(
        &self,
        op: &'static str,
        idempotency: Idempotency,
        mut call: F,
    ) -> StoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let mut attempt = 0;
        loop {
            let result = match tokio::time::timeout(self.timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(StoreError::Timeout(self.timeout)),
            };

            match result {
                Err(e)
                    if e.is_transient()
                        && idempotency == Idempotency::Idempotent
                        && attempt < self.max_retries =>
                {
                    let delay = self.backoff(attempt);
                    warn!(
                        op,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Store call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}
