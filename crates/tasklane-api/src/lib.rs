//! Tasklane API - HTTP server
//!
//! Session handling (signup, login, refresh rotation, logout with revocation,
//! login throttling) and per-user task endpoints over a document store.
//!
//! Author: hephaex@gmail.com

pub mod audit;
pub mod auth;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use routes::create_router;

#[cfg(any(test, feature = "test-utils"))]
pub use testing::{create_router_for_testing, create_router_with_store, test_config, test_state};

#[cfg(any(test, feature = "test-utils"))]
mod testing {
    use crate::state::AppState;
    use axum::Router;
    use std::sync::Arc;
    use tasklane_core::{AppConfig, DocumentStore, PasswordConfig};
    use tasklane_store::MemoryStore;

    /// Fixed secret and cheap Argon2 parameters
    pub fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.auth.jwt_secret = Some("tasklane-test-secret-0123456789abcdef".to_string());
        config.password = PasswordConfig {
            memory_cost: 1024,
            time_cost: 1,
            parallelism: 1,
            output_len: 32,
        };
        config
    }

    /// State over `store`
    ///
    /// # Panics
    ///
    /// If the session service cannot be built from [`test_config`].
    pub fn test_state(store: Arc<dyn DocumentStore>) -> Arc<AppState> {
        match AppState::build(test_config(), store) {
            Ok(state) => Arc::new(state),
            Err(e) => panic!("test state: {e}"),
        }
    }

    pub fn create_router_with_store(store: Arc<dyn DocumentStore>) -> Router {
        crate::create_router(test_state(store))
    }

    /// Router over a fresh in-memory store
    pub fn create_router_for_testing() -> Router {
        create_router_with_store(Arc::new(MemoryStore::new()))
    }
}
