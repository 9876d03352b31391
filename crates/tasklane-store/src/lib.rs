//! Tasklane Store - Document store backends
//!
//! Implements the core store traits over SurrealDB and over in-process maps,
//! and wraps either in [`Guarded`] so every call carries a timeout and the
//! configured retry policy.

pub mod guarded;
pub mod memory;
pub mod surrealdb_store;

pub use guarded::Guarded;
pub use memory::MemoryStore;
pub use surrealdb_store::SurrealDbStore;

use std::sync::Arc;
use tasklane_core::{AppConfig, DocumentStore, RetryPolicy, StoreBackend, StoreResult};
use tracing::info;

/// Open the configured backend, wrapped in the store call policy
pub async fn connect(config: &AppConfig) -> StoreResult<Arc<dyn DocumentStore>> {
    let policy = RetryPolicy::from(&config.store);

    match config.database.backend {
        StoreBackend::Memory => {
            info!("Using in-memory document store");
            Ok(Arc::new(Guarded::new(MemoryStore::new(), policy)))
        }
        StoreBackend::SurrealDb => {
            info!(url = %config.database.surrealdb_url, "Connecting to SurrealDB");
            let store = SurrealDbStore::new(&config.database).await?;
            store.init_schema().await?;
            Ok(Arc::new(Guarded::new(store, policy)))
        }
    }
}
