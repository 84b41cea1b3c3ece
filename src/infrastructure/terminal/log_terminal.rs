use async_trait::async_trait;

use crate::domain::terminal::TerminalDriver;
use crate::errors::CoordinatorResult;

/// TerminalDriver that writes notifications to the tracing log
///
/// Stands in for a real multiplexer when no agent sessions are attached.
#[derive(Debug, Default, Clone)]
pub struct LogTerminal;

impl LogTerminal {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TerminalDriver for LogTerminal {
    async fn write_text(&self, agent_id: &str, text: &str) -> CoordinatorResult<()> {
        tracing::info!(agent_id = %agent_id, text = %text, "Terminal notification");
        Ok(())
    }

    async fn submit(&self, agent_id: &str) -> CoordinatorResult<()> {
        tracing::debug!(agent_id = %agent_id, "Terminal submit");
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}
