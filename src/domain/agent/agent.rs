use super::value_objects::AgentStatus;
use crate::errors::{CoordinatorError, CoordinatorResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use uuid::Uuid;

/// An independent worker process tracked by the coordinator
///
/// # Invariants
/// - `current_task` is only set while the agent is `Busy`
/// - an `Idle` agent carries neither a task nor an error message
/// - `Error` is left only through an explicit reset to `Idle`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    agent_id: String,
    status: AgentStatus,
    current_task: Option<Uuid>,
    last_activity: DateTime<Utc>,
    error_message: Option<String>,
    #[serde(default)]
    capabilities: BTreeSet<String>,
    registered_at: DateTime<Utc>,
}

impl Agent {
    /// Creates a freshly registered, idle agent
    pub fn new(agent_id: impl Into<String>, capabilities: BTreeSet<String>) -> Self {
        let now = Utc::now();
        Self {
            agent_id: agent_id.into(),
            status: AgentStatus::Idle,
            current_task: None,
            last_activity: now,
            error_message: None,
            capabilities,
            registered_at: now,
        }
    }

    /// Moves the agent to `next`, applying the reset side effects
    ///
    /// Entering `Idle` clears the task and error message. Entering `Error`
    /// records the message and drops the task reference.
    pub fn transition_to(
        &mut self,
        next: AgentStatus,
        error_message: Option<String>,
    ) -> CoordinatorResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(CoordinatorError::invalid_transition(
                "agent",
                self.status,
                next,
            ));
        }

        match next {
            AgentStatus::Idle => {
                self.current_task = None;
                self.error_message = None;
            }
            AgentStatus::Error => {
                self.current_task = None;
                self.error_message = error_message;
            }
            AgentStatus::Busy => {}
        }

        self.status = next;
        self.last_activity = Utc::now();
        Ok(())
    }

    /// Binds a task to this agent, making it busy
    pub fn begin_task(&mut self, task_id: Uuid) -> CoordinatorResult<()> {
        if self.status != AgentStatus::Idle {
            return Err(CoordinatorError::invalid_transition(
                "agent",
                self.status,
                AgentStatus::Busy,
            ));
        }

        self.status = AgentStatus::Busy;
        self.current_task = Some(task_id);
        self.last_activity = Utc::now();
        Ok(())
    }

    /// Releases the agent if it is still working on `task_id`
    ///
    /// Returns `true` when the agent went back to idle.
    pub fn finish_task(&mut self, task_id: Uuid) -> bool {
        if self.current_task != Some(task_id) {
            return false;
        }

        self.status = AgentStatus::Idle;
        self.current_task = None;
        self.error_message = None;
        self.last_activity = Utc::now();
        true
    }

    /// Refreshes the liveness timestamp
    pub fn heartbeat(&mut self) {
        self.last_activity = Utc::now();
    }

    pub fn merge_capabilities(&mut self, capabilities: impl IntoIterator<Item = String>) {
        self.capabilities.extend(capabilities);
    }

    /// Whether the last activity is younger than `max_age` at `now`
    pub fn is_active_at(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        match now.signed_duration_since(self.last_activity).to_std() {
            Ok(age) => age < max_age,
            // last_activity is ahead of `now` (clock skew between processes)
            Err(_) => true,
        }
    }

    pub fn can_cover(&self, tag: &str) -> bool {
        self.capabilities.contains(tag)
    }

    // ===== Getters =====

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn status(&self) -> AgentStatus {
        self.status
    }

    pub fn current_task(&self) -> Option<Uuid> {
        self.current_task
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn capabilities(&self) -> &BTreeSet<String> {
        &self.capabilities
    }

    pub fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }

    /// Reconstructs an Agent from persistence layer data
    ///
    /// Only to be used by state store implementations.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persistence(
        agent_id: String,
        status: AgentStatus,
        current_task: Option<Uuid>,
        last_activity: DateTime<Utc>,
        error_message: Option<String>,
        capabilities: BTreeSet<String>,
        registered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            agent_id,
            status,
            current_task,
            last_activity,
            error_message,
            capabilities,
            registered_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent() -> Agent {
        Agent::new("backend-api", BTreeSet::from(["rust".to_string()]))
    }

    #[test]
    fn new_agent_is_idle() {
        let agent = agent();
        assert_eq!(agent.status(), AgentStatus::Idle);
        assert!(agent.current_task().is_none());
        assert!(agent.error_message().is_none());
    }

    #[test]
    fn begin_task_makes_agent_busy() {
        let mut agent = agent();
        let task_id = Uuid::new_v4();

        agent.begin_task(task_id).unwrap();

        assert_eq!(agent.status(), AgentStatus::Busy);
        assert_eq!(agent.current_task(), Some(task_id));
    }

    #[test]
    fn begin_task_on_busy_agent_fails() {
        let mut agent = agent();
        agent.begin_task(Uuid::new_v4()).unwrap();

        let result = agent.begin_task(Uuid::new_v4());
        assert!(matches!(
            result,
            Err(CoordinatorError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn reset_to_idle_clears_task_and_error() {
        let mut agent = agent();
        agent.begin_task(Uuid::new_v4()).unwrap();
        agent
            .transition_to(AgentStatus::Error, Some("panicked".to_string()))
            .unwrap();
        assert_eq!(agent.error_message(), Some("panicked"));
        assert!(agent.current_task().is_none());

        agent.transition_to(AgentStatus::Idle, None).unwrap();

        assert_eq!(agent.status(), AgentStatus::Idle);
        assert!(agent.current_task().is_none());
        assert!(agent.error_message().is_none());
    }

    #[test]
    fn error_agent_cannot_become_busy() {
        let mut agent = agent();
        agent.transition_to(AgentStatus::Error, None).unwrap();

        assert!(agent.transition_to(AgentStatus::Busy, None).is_err());
        assert!(agent.begin_task(Uuid::new_v4()).is_err());
    }

    #[test]
    fn finish_task_ignores_other_tasks() {
        let mut agent = agent();
        let task_id = Uuid::new_v4();
        agent.begin_task(task_id).unwrap();

        assert!(!agent.finish_task(Uuid::new_v4()));
        assert_eq!(agent.status(), AgentStatus::Busy);

        assert!(agent.finish_task(task_id));
        assert_eq!(agent.status(), AgentStatus::Idle);
    }

    #[test]
    fn liveness_uses_max_age() {
        let agent = agent();
        let now = agent.last_activity();

        assert!(agent.is_active_at(now + chrono::Duration::seconds(59), Duration::from_secs(60)));
        assert!(!agent.is_active_at(now + chrono::Duration::seconds(60), Duration::from_secs(60)));
        assert!(agent.is_active_at(now - chrono::Duration::seconds(5), Duration::from_secs(60)));
    }
}
