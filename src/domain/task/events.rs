use std::collections::BTreeSet;
use uuid::Uuid;

/// Domain events that occur within the Task lifecycle
///
/// The lifecycle manager turns these into structured log records and
/// agent notices.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    /// Fired when a task is created
    Created {
        task_id: Uuid,
        description: String,
    },
    /// Fired when agents are bound to a pending task
    Assigned {
        task_id: Uuid,
        agents: BTreeSet<String>,
    },
    /// Fired when work begins, either explicitly or through a first progress report
    Started { task_id: Uuid },
    /// Fired on every accepted progress report
    Progressed { task_id: Uuid, progress: u8 },
    /// Fired when every assigned agent delivered a result
    Completed { task_id: Uuid },
    /// Fired when a task is abandoned
    Failed { task_id: Uuid, reason: String },
}

impl TaskEvent {
    /// Returns the task_id for this event
    pub fn task_id(&self) -> Uuid {
        match self {
            TaskEvent::Created { task_id, .. } => *task_id,
            TaskEvent::Assigned { task_id, .. } => *task_id,
            TaskEvent::Started { task_id } => *task_id,
            TaskEvent::Progressed { task_id, .. } => *task_id,
            TaskEvent::Completed { task_id } => *task_id,
            TaskEvent::Failed { task_id, .. } => *task_id,
        }
    }

    /// Short name used as the `event` field in log records
    pub fn name(&self) -> &'static str {
        match self {
            TaskEvent::Created { .. } => "created",
            TaskEvent::Assigned { .. } => "assigned",
            TaskEvent::Started { .. } => "started",
            TaskEvent::Progressed { .. } => "progressed",
            TaskEvent::Completed { .. } => "completed",
            TaskEvent::Failed { .. } => "failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_event_exposes_task_id() {
        let task_id = Uuid::new_v4();
        let events = vec![
            TaskEvent::Created {
                task_id,
                description: "demo".to_string(),
            },
            TaskEvent::Assigned {
                task_id,
                agents: BTreeSet::from(["backend-api".to_string()]),
            },
            TaskEvent::Started { task_id },
            TaskEvent::Progressed {
                task_id,
                progress: 40,
            },
            TaskEvent::Completed { task_id },
            TaskEvent::Failed {
                task_id,
                reason: "timeout".to_string(),
            },
        ];

        for event in events {
            assert_eq!(event.task_id(), task_id);
        }
    }

    #[test]
    fn event_names() {
        let task_id = Uuid::new_v4();
        assert_eq!(TaskEvent::Started { task_id }.name(), "started");
        assert_eq!(TaskEvent::Completed { task_id }.name(), "completed");
    }
}
