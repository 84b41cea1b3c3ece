use chrono::Utc;
use std::collections::BTreeSet;
use std::time::Duration;

use crate::domain::agent::{Agent, AgentStatus};
use crate::domain::state::SystemState;
use crate::errors::{CoordinatorError, CoordinatorResult};

/// Agent identity, status and liveness over a borrowed SystemState
///
/// Staleness is advisory: nothing here changes an agent's status because
/// its heartbeat is old.
#[derive(Debug, Clone)]
pub struct AgentRegistry {
    max_age: Duration,
}

impl AgentRegistry {
    pub fn new(max_age: Duration) -> Self {
        Self { max_age }
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Registers an agent, or refreshes an existing registration
    ///
    /// Re-registering keeps the current status and merges capabilities.
    pub fn register(
        &self,
        state: &mut SystemState,
        agent_id: &str,
        capabilities: BTreeSet<String>,
    ) -> CoordinatorResult<Agent> {
        if agent_id.trim().is_empty() {
            return Err(CoordinatorError::InvalidArgument(
                "Agent id cannot be empty".to_string(),
            ));
        }

        let agent = match state.agent_mut(agent_id) {
            Some(existing) => {
                existing.merge_capabilities(capabilities);
                existing.heartbeat();
                tracing::debug!(agent_id = %agent_id, "Agent re-registered");
                existing.clone()
            }
            None => {
                let agent = Agent::new(agent_id, capabilities);
                state.agents.insert(agent_id.to_string(), agent.clone());
                tracing::info!(agent_id = %agent_id, "Agent registered");
                agent
            }
        };
        state.inbox_mut(agent_id);

        Ok(agent)
    }

    /// Changes an agent's status
    ///
    /// Moving to idle is the explicit reset: it clears the current task and
    /// any error message.
    pub fn update_status(
        &self,
        state: &mut SystemState,
        agent_id: &str,
        status: AgentStatus,
        error_message: Option<String>,
    ) -> CoordinatorResult<Agent> {
        let agent = state
            .agent_mut(agent_id)
            .ok_or_else(|| CoordinatorError::UnknownAgent(agent_id.to_string()))?;

        let previous = agent.status();
        agent.transition_to(status, error_message)?;

        tracing::info!(
            agent_id = %agent_id,
            from = %previous,
            to = %status,
            "Agent status updated"
        );
        Ok(agent.clone())
    }

    pub fn heartbeat(&self, state: &mut SystemState, agent_id: &str) -> CoordinatorResult<()> {
        let agent = state
            .agent_mut(agent_id)
            .ok_or_else(|| CoordinatorError::UnknownAgent(agent_id.to_string()))?;
        agent.heartbeat();
        Ok(())
    }

    /// Whether the agent's last activity is younger than `max_age`
    pub fn is_active(
        &self,
        state: &SystemState,
        agent_id: &str,
        max_age: Duration,
    ) -> CoordinatorResult<bool> {
        let agent = state
            .agent(agent_id)
            .ok_or_else(|| CoordinatorError::UnknownAgent(agent_id.to_string()))?;
        Ok(agent.is_active_at(Utc::now(), max_age))
    }

    /// Agents whose heartbeat is older than the configured max age
    pub fn stale_agents(&self, state: &SystemState) -> Vec<String> {
        let now = Utc::now();
        state
            .agents()
            .values()
            .filter(|agent| !agent.is_active_at(now, self.max_age))
            .map(|agent| agent.agent_id().to_string())
            .collect()
    }

    pub fn active_count(&self, state: &SystemState) -> usize {
        let now = Utc::now();
        state
            .agents()
            .values()
            .filter(|agent| agent.is_active_at(now, self.max_age))
            .count()
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}
