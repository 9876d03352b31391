//! Application state management
//!
//! Author: hephaex@gmail.com

use crate::auth::SessionService;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tasklane_core::{AppConfig, DocumentStore};

/// Application state shared across handlers
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Server start time
    pub start_time: Instant,
    /// Request counter
    pub request_count: AtomicU64,
    /// Ready status
    pub is_ready: AtomicBool,
    /// Users, refresh tokens and tasks
    pub store: Arc<dyn DocumentStore>,
    /// Login, refresh, logout and the gate
    pub sessions: Arc<SessionService>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn DocumentStore>,
        sessions: Arc<SessionService>,
    ) -> Self {
        Self {
            config,
            start_time: Instant::now(),
            request_count: AtomicU64::new(0),
            is_ready: AtomicBool::new(true),
            store,
            sessions,
        }
    }

    /// Build the session service over `store` and wrap both in state
    pub fn build(
        config: AppConfig,
        store: Arc<dyn DocumentStore>,
    ) -> Result<Self, crate::auth::AuthError> {
        let sessions = Arc::new(SessionService::new(&config, Arc::clone(&store))?);
        Ok(Self::new(config, store, sessions))
    }

    /// Increment request counter
    pub fn increment_requests(&self) -> u64 {
        self.request_count.fetch_add(1, Ordering::SeqCst)
    }

    /// Get total request count
    pub fn get_request_count(&self) -> u64 {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Check if service is ready
    pub fn is_ready(&self) -> bool {
        self.is_ready.load(Ordering::SeqCst)
    }

    /// Set ready status
    pub fn set_ready(&self, ready: bool) {
        self.is_ready.store(ready, Ordering::SeqCst);
    }
}
