use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur in the coordinator
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    #[error("Unknown recipient: {0}")]
    UnknownRecipient(String),

    #[error("Unknown task: {0}")]
    UnknownTask(Uuid),

    #[error("Unknown message {message_id} in inbox of {agent_id}")]
    UnknownMessage { agent_id: String, message_id: Uuid },

    #[error("Invalid {entity} transition from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("Missing results for task {task_id} (missing: {missing:?}, unexpected: {unexpected:?})")]
    MissingResults {
        task_id: Uuid,
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Persistence failure: {0}")]
    Persistence(String),

    #[error("Delivery to {agent_id} failed: {reason}")]
    DeliveryFailure { agent_id: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CoordinatorError {
    /// Creates an invalid transition error from any two displayable states
    pub fn invalid_transition(
        entity: &'static str,
        from: impl std::fmt::Display,
        to: impl std::fmt::Display,
    ) -> Self {
        Self::InvalidTransition {
            entity,
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Creates a persistence error
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence(message.into())
    }

    /// Creates a delivery error for an agent terminal
    pub fn delivery(agent_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DeliveryFailure {
            agent_id: agent_id.into(),
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for CoordinatorError {
    fn from(err: std::io::Error) -> Self {
        Self::Persistence(format!("I/O error: {}", err))
    }
}

impl From<serde_json::Error> for CoordinatorError {
    fn from(err: serde_json::Error) -> Self {
        Self::Persistence(format!("Snapshot serialization error: {}", err))
    }
}

impl From<sqlx::Error> for CoordinatorError {
    fn from(err: sqlx::Error) -> Self {
        Self::Persistence(format!("Database error: {}", err))
    }
}

pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_transition_message() {
        let err = CoordinatorError::invalid_transition("task", "completed", "assigned");
        assert_eq!(
            err.to_string(),
            "Invalid task transition from completed to assigned"
        );
    }

    #[test]
    fn io_error_maps_to_persistence() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err = CoordinatorError::from(io_err);
        assert!(matches!(err, CoordinatorError::Persistence(_)));
    }

    #[test]
    fn delivery_failure_names_agent() {
        let err = CoordinatorError::delivery("backend-api", "terminal closed");
        assert!(err.to_string().contains("backend-api"));
        assert!(err.to_string().contains("terminal closed"));
    }
}
