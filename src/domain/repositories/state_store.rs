use async_trait::async_trait;

use crate::domain::state::SystemState;
use crate::errors::CoordinatorResult;

/// Repository trait for the SystemState snapshot
///
/// Defines the contract for persisting and retrieving the whole shared
/// state. Implementations must replace a snapshot atomically so a
/// concurrent reader in another process never sees a partial write.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the latest snapshot, or `None` if nothing was ever saved
    async fn load(&self) -> CoordinatorResult<Option<SystemState>>;

    /// Replace the stored snapshot with `state`
    async fn save(&self, state: &SystemState) -> CoordinatorResult<()>;

    /// Read-modify-write of the snapshot
    ///
    /// `apply` receives the latest snapshot and returns the one to store.
    /// Nothing is written when it fails. Backends that can lock the medium
    /// across both steps override this so writers in separate processes
    /// cannot interleave.
    async fn update(
        &self,
        apply: &mut (dyn FnMut(Option<SystemState>) -> CoordinatorResult<SystemState> + Send),
    ) -> CoordinatorResult<SystemState> {
        let next = apply(self.load().await?)?;
        self.save(&next).await?;
        Ok(next)
    }

    /// Backend name for logging
    fn name(&self) -> &str;
}
