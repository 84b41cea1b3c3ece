// StateStore implementations (data access layer)
// Adapters that implement the domain repository interface

pub mod json_state_store;
pub mod memory_state_store;
pub mod sqlite_state_store;

pub use json_state_store::JsonStateStore;
pub use memory_state_store::MemoryStateStore;
pub use sqlite_state_store::SqliteStateStore;

use std::sync::Arc;

use crate::config::StoreBackend;
use crate::domain::repositories::StateStore;
use crate::errors::CoordinatorResult;

/// Opens the store selected by configuration
pub async fn open_store(backend: &StoreBackend) -> CoordinatorResult<Arc<dyn StateStore>> {
    let store: Arc<dyn StateStore> = match backend {
        StoreBackend::Json { path } => Arc::new(JsonStateStore::new(path.clone())),
        StoreBackend::Sqlite { database_url } => {
            Arc::new(SqliteStateStore::connect(database_url).await?)
        }
        StoreBackend::Memory => Arc::new(MemoryStateStore::new()),
    };
    tracing::info!(backend = store.name(), "State store opened");
    Ok(store)
}
