//! Revoked access tokens
//!
//! A bounded, expiring set consulted on every authenticated request. Entries
//! live at least as long as the longest access token, so a revoked token
//! cannot outlive its entry. Tokens are keyed by digest to keep entries small.
//!
//! Author: hephaex@gmail.com

use super::refresh::hash_token;
use moka::future::Cache;
use moka::policy::EvictionPolicy;
use std::time::Duration;

/// Concurrent revocation registry
#[derive(Clone)]
pub struct RevocationRegistry {
    entries: Cache<String, ()>,
    ttl: Duration,
}

impl RevocationRegistry {
    /// Registry holding at most `max_entries` tokens for `ttl` each
    ///
    /// Under size pressure the least recently used entry goes; new entries
    /// are always admitted.
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .eviction_policy(EvictionPolicy::lru())
            .build();

        Self { entries, ttl }
    }

    /// Revoke a token; visible to every subsequent `is_revoked`
    pub async fn revoke(&self, token: &str) {
        self.entries.insert(hash_token(token), ()).await;
    }

    pub fn is_revoked(&self, token: &str) -> bool {
        self.entries.contains_key(&hash_token(token))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Approximate number of live entries
    pub fn len(&self) -> u64 {
        self.entries.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply pending evictions now
    pub async fn run_maintenance(&self) {
        self.entries.run_pending_tasks().await;
    }
}

impl std::fmt::Debug for RevocationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevocationRegistry")
            .field("entries", &self.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}
