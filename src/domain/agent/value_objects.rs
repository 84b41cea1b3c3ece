use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Represents the status of an agent process
///
/// # Status Transitions
/// ```text
/// Idle <-> Busy -> Error
///  ^  \______________/ |
///  \-------reset-------/
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Agent is waiting for work
    Idle,
    /// Agent is working on a task
    Busy,
    /// Agent reported a failure and needs a manual reset
    Error,
}

impl AgentStatus {
    /// Checks if a transition from current status to next status is valid
    ///
    /// # Valid Transitions
    /// - Idle -> Busy
    /// - Busy -> Idle
    /// - Busy -> Error
    /// - Idle -> Error
    /// - Error -> Idle (explicit reset only)
    /// - any status to itself
    ///
    /// # Example
    /// ```
    /// use agent_state_coordinator::domain::agent::AgentStatus;
    ///
    /// assert!(AgentStatus::Error.can_transition_to(AgentStatus::Idle));
    /// assert!(!AgentStatus::Error.can_transition_to(AgentStatus::Busy));
    /// ```
    pub fn can_transition_to(&self, next: AgentStatus) -> bool {
        use AgentStatus::*;
        *self == next
            || matches!(
                (self, next),
                (Idle, Busy) | (Busy, Idle) | (Busy, Error) | (Idle, Error) | (Error, Idle)
            )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Idle => "idle",
            AgentStatus::Busy => "busy",
            AgentStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(AgentStatus::Idle),
            "busy" => Ok(AgentStatus::Busy),
            "error" => Ok(AgentStatus::Error),
            other => Err(format!("Unknown agent status: {}", other)),
        }
    }
}
