use async_trait::async_trait;

use crate::errors::CoordinatorResult;

/// Port for the surface that renders notifications to an agent
///
/// Delivery is two discrete operations: the text, then the "execute"
/// action (an Enter key for a terminal multiplexer). The dispatcher
/// spaces them apart; drivers must not combine them.
#[async_trait]
pub trait TerminalDriver: Send + Sync {
    /// Write rendered notification text into the agent's session
    async fn write_text(&self, agent_id: &str, text: &str) -> CoordinatorResult<()>;

    /// Trigger the execute action in the agent's session
    async fn submit(&self, agent_id: &str) -> CoordinatorResult<()>;

    /// Driver name for logging
    fn name(&self) -> &str;
}
