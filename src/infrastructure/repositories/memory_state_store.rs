use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::repositories::StateStore;
use crate::domain::state::SystemState;
use crate::errors::CoordinatorResult;

/// In-process StateStore
///
/// Holds one snapshot in memory; useful for single-process runs and tests.
#[derive(Default)]
pub struct MemoryStateStore {
    snapshot: RwLock<Option<SystemState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> CoordinatorResult<Option<SystemState>> {
        Ok(self.snapshot.read().await.clone())
    }

    async fn save(&self, state: &SystemState) -> CoordinatorResult<()> {
        *self.snapshot.write().await = Some(state.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
