use super::events::TaskEvent;
use super::value_objects::{Priority, TaskStatus};
use crate::errors::{CoordinatorError, CoordinatorResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Task aggregate root
///
/// A unit of work handed to one or more agents.
///
/// # Invariants
/// - Description cannot be empty
/// - Status transitions follow [`TaskStatus::can_transition_to`]
/// - `results` is empty until completion, then keyed exactly by `assigned_agents`
/// - Progress stays within 0..=100
///
/// # Example
/// ```
/// use agent_state_coordinator::domain::task::{Priority, Task, TaskStatus};
///
/// let (task, event) = Task::new("demo".to_string(), Priority::High, Default::default())
///     .expect("valid task");
///
/// assert_eq!(task.status(), TaskStatus::Pending);
/// assert_eq!(event.task_id(), task.id());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    task_id: Uuid,
    description: String,
    status: TaskStatus,
    priority: Priority,
    assigned_agents: BTreeSet<String>,
    progress: u8,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    results: BTreeMap<String, String>,
    #[serde(default)]
    failure_reason: Option<String>,
    #[serde(default)]
    required_capabilities: BTreeSet<String>,
}

impl Task {
    /// Creates a new pending Task
    ///
    /// # Business Rules Enforced
    /// - Description must not be empty
    /// - Initial status is always Pending with no assignment
    pub fn new(
        description: String,
        priority: Priority,
        required_capabilities: BTreeSet<String>,
    ) -> CoordinatorResult<(Self, TaskEvent)> {
        if description.trim().is_empty() {
            return Err(CoordinatorError::InvalidArgument(
                "Task description cannot be empty".to_string(),
            ));
        }

        let task = Self {
            task_id: Uuid::new_v4(),
            description,
            status: TaskStatus::Pending,
            priority,
            assigned_agents: BTreeSet::new(),
            progress: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            results: BTreeMap::new(),
            failure_reason: None,
            required_capabilities,
        };

        let event = TaskEvent::Created {
            task_id: task.task_id,
            description: task.description.clone(),
        };

        Ok((task, event))
    }

    fn ensure_transition(&self, next: TaskStatus) -> CoordinatorResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(CoordinatorError::invalid_transition(
                "task",
                self.status,
                next,
            ));
        }
        Ok(())
    }

    /// Binds a non-empty set of agents to a pending task
    pub fn assign(&mut self, agents: BTreeSet<String>) -> CoordinatorResult<TaskEvent> {
        self.ensure_transition(TaskStatus::Assigned)?;
        if agents.is_empty() {
            return Err(CoordinatorError::InvalidArgument(
                "A task must be assigned to at least one agent".to_string(),
            ));
        }

        self.status = TaskStatus::Assigned;
        self.assigned_agents = agents.clone();

        Ok(TaskEvent::Assigned {
            task_id: self.task_id,
            agents,
        })
    }

    /// Marks an assigned task as being worked on
    pub fn start(&mut self) -> CoordinatorResult<TaskEvent> {
        self.ensure_transition(TaskStatus::InProgress)?;

        self.status = TaskStatus::InProgress;
        self.started_at = Some(Utc::now());

        Ok(TaskEvent::Started {
            task_id: self.task_id,
        })
    }

    /// Records progress, starting the task on its first report
    ///
    /// Values above 100 are clamped.
    pub fn update_progress(&mut self, progress: u8) -> CoordinatorResult<Vec<TaskEvent>> {
        let mut events = Vec::new();
        match self.status {
            TaskStatus::Assigned => events.push(self.start()?),
            TaskStatus::InProgress => {}
            other => {
                return Err(CoordinatorError::invalid_transition(
                    "task",
                    other,
                    TaskStatus::InProgress,
                ))
            }
        }

        self.progress = progress.min(100);
        events.push(TaskEvent::Progressed {
            task_id: self.task_id,
            progress: self.progress,
        });

        Ok(events)
    }

    /// Completes the task with one result per assigned agent
    ///
    /// # Business Rules
    /// - Task must be Assigned or InProgress
    /// - `results` keys must equal `assigned_agents` exactly
    pub fn complete(&mut self, results: BTreeMap<String, String>) -> CoordinatorResult<TaskEvent> {
        self.ensure_transition(TaskStatus::Completed)?;

        let missing: Vec<String> = self
            .assigned_agents
            .iter()
            .filter(|agent| !results.contains_key(*agent))
            .cloned()
            .collect();
        let unexpected: Vec<String> = results
            .keys()
            .filter(|agent| !self.assigned_agents.contains(*agent))
            .cloned()
            .collect();

        if !missing.is_empty() || !unexpected.is_empty() {
            return Err(CoordinatorError::MissingResults {
                task_id: self.task_id,
                missing,
                unexpected,
            });
        }

        self.status = TaskStatus::Completed;
        self.results = results;
        self.progress = 100;
        self.completed_at = Some(Utc::now());

        Ok(TaskEvent::Completed {
            task_id: self.task_id,
        })
    }

    /// Marks the task failed, leaving results empty
    pub fn fail(&mut self, reason: String) -> CoordinatorResult<TaskEvent> {
        self.ensure_transition(TaskStatus::Failed)?;

        self.status = TaskStatus::Failed;
        self.failure_reason = Some(reason.clone());
        self.completed_at = Some(Utc::now());

        Ok(TaskEvent::Failed {
            task_id: self.task_id,
            reason,
        })
    }

    // ===== Getters =====

    pub fn id(&self) -> Uuid {
        self.task_id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn assigned_agents(&self) -> &BTreeSet<String> {
        &self.assigned_agents
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn results(&self) -> &BTreeMap<String, String> {
        &self.results
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn required_capabilities(&self) -> &BTreeSet<String> {
        &self.required_capabilities
    }

    /// Reconstructs a Task from persistence layer data
    ///
    /// This bypasses business rules validation since the data was
    /// validated before it was stored.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persistence(
        task_id: Uuid,
        description: String,
        status: TaskStatus,
        priority: Priority,
        assigned_agents: BTreeSet<String>,
        progress: u8,
        created_at: DateTime<Utc>,
        started_at: Option<DateTime<Utc>>,
        completed_at: Option<DateTime<Utc>>,
        results: BTreeMap<String, String>,
        failure_reason: Option<String>,
        required_capabilities: BTreeSet<String>,
    ) -> Self {
        Self {
            task_id,
            description,
            status,
            priority,
            assigned_agents,
            progress,
            created_at,
            started_at,
            completed_at,
            results,
            failure_reason,
            required_capabilities,
        }
    }
}
