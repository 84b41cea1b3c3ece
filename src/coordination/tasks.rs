use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use super::messaging::{MessageBus, SYSTEM_SENDER};
use crate::domain::agent::AgentStatus;
use crate::domain::message::Message;
use crate::domain::state::SystemState;
use crate::domain::task::{Priority, Task, TaskEvent, TaskStatus};
use crate::errors::{CoordinatorError, CoordinatorResult};

/// Task lifecycle over a borrowed SystemState
///
/// Every operation validates first and mutates second, so an error leaves
/// the state untouched.
#[derive(Debug, Clone)]
pub struct TaskLifecycleManager {
    bus: MessageBus,
}

impl TaskLifecycleManager {
    pub fn new(bus: MessageBus) -> Self {
        Self { bus }
    }

    /// Creates a pending task and makes it the focus task
    pub fn create_task(
        &self,
        state: &mut SystemState,
        description: &str,
        priority: Priority,
        required_capabilities: BTreeSet<String>,
    ) -> CoordinatorResult<Task> {
        let (task, event) = Task::new(description.to_string(), priority, required_capabilities)?;
        log_event(&event);
        state.set_focus(task.clone());
        Ok(task)
    }

    /// Creates a pending task at the back of the queue
    pub fn add_task(
        &self,
        state: &mut SystemState,
        description: &str,
        priority: Priority,
        required_capabilities: BTreeSet<String>,
    ) -> CoordinatorResult<Task> {
        let (task, event) = Task::new(description.to_string(), priority, required_capabilities)?;
        log_event(&event);
        state.enqueue(task.clone());
        Ok(task)
    }

    /// Binds agents to a pending task and marks them busy
    ///
    /// # Business Rules
    /// - Task must exist and be pending
    /// - Every agent must be registered and idle
    pub fn assign_task(
        &self,
        state: &mut SystemState,
        outbox: &mut Vec<Message>,
        task_id: Uuid,
        agent_ids: BTreeSet<String>,
    ) -> CoordinatorResult<Task> {
        let task = state
            .task(task_id)
            .ok_or(CoordinatorError::UnknownTask(task_id))?;
        if !task.status().can_transition_to(TaskStatus::Assigned) {
            return Err(CoordinatorError::invalid_transition(
                "task",
                task.status(),
                TaskStatus::Assigned,
            ));
        }
        for agent_id in &agent_ids {
            let agent = state
                .agent(agent_id)
                .ok_or_else(|| CoordinatorError::UnknownAgent(agent_id.clone()))?;
            if agent.status() != AgentStatus::Idle {
                return Err(CoordinatorError::invalid_transition(
                    "agent",
                    agent.status(),
                    AgentStatus::Busy,
                ));
            }
        }

        let task = state
            .task_mut(task_id)
            .ok_or(CoordinatorError::UnknownTask(task_id))?;
        let event = task.assign(agent_ids.clone())?;
        let description = task.description().to_string();
        let priority = task.priority();
        log_event(&event);

        for agent_id in &agent_ids {
            if let Some(agent) = state.agent_mut(agent_id) {
                agent.begin_task(task_id)?;
            }
        }
        state.promote_if_unfocused(task_id);

        for agent_id in &agent_ids {
            self.bus.send(
                state,
                outbox,
                SYSTEM_SENDER,
                agent_id,
                &format!("New task assigned to you: {} [{}]", description, task_id),
                Some("task assigned".to_string()),
                priority,
            )?;
        }

        state
            .task(task_id)
            .cloned()
            .ok_or(CoordinatorError::UnknownTask(task_id))
    }

    pub fn start_task(&self, state: &mut SystemState, task_id: Uuid) -> CoordinatorResult<Task> {
        let task = state
            .task_mut(task_id)
            .ok_or(CoordinatorError::UnknownTask(task_id))?;
        let event = task.start()?;
        log_event(&event);
        Ok(task.clone())
    }

    pub fn update_progress(
        &self,
        state: &mut SystemState,
        task_id: Uuid,
        progress: u8,
    ) -> CoordinatorResult<Task> {
        let task = state
            .task_mut(task_id)
            .ok_or(CoordinatorError::UnknownTask(task_id))?;
        for event in task.update_progress(progress)? {
            log_event(&event);
        }
        Ok(task.clone())
    }

    /// Completes a task with one result per assigned agent
    ///
    /// Completing an already completed task returns it unchanged.
    pub fn complete_task(
        &self,
        state: &mut SystemState,
        outbox: &mut Vec<Message>,
        task_id: Uuid,
        results: BTreeMap<String, String>,
    ) -> CoordinatorResult<Task> {
        let task = state
            .task_mut(task_id)
            .ok_or(CoordinatorError::UnknownTask(task_id))?;
        if task.status() == TaskStatus::Completed {
            tracing::debug!(task_id = %task_id, "Task already completed");
            return Ok(task.clone());
        }

        let event = task.complete(results)?;
        let completed = task.clone();
        log_event(&event);

        self.release_agents(state, &completed);
        self.hand_over_focus(state);
        for agent_id in completed.assigned_agents() {
            self.bus.send(
                state,
                outbox,
                SYSTEM_SENDER,
                agent_id,
                &format!("Task completed: {} [{}]", completed.description(), task_id),
                Some("task completed".to_string()),
                completed.priority(),
            )?;
        }

        Ok(completed)
    }

    /// Fails a task; pending tasks may be failed to cancel them
    ///
    /// Failing an already failed task returns it unchanged.
    pub fn fail_task(
        &self,
        state: &mut SystemState,
        outbox: &mut Vec<Message>,
        task_id: Uuid,
        reason: &str,
    ) -> CoordinatorResult<Task> {
        let task = state
            .task_mut(task_id)
            .ok_or(CoordinatorError::UnknownTask(task_id))?;
        if task.status() == TaskStatus::Failed {
            tracing::debug!(task_id = %task_id, "Task already failed");
            return Ok(task.clone());
        }

        let event = task.fail(reason.to_string())?;
        let failed = task.clone();
        log_event(&event);

        self.release_agents(state, &failed);
        self.hand_over_focus(state);
        for agent_id in failed.assigned_agents() {
            self.bus.send(
                state,
                outbox,
                SYSTEM_SENDER,
                agent_id,
                &format!("Task failed: {} [{}]: {}", failed.description(), task_id, reason),
                Some("task failed".to_string()),
                failed.priority(),
            )?;
        }

        Ok(failed)
    }

    fn hand_over_focus(&self, state: &mut SystemState) {
        if let Some(next) = state.promote_next_active() {
            tracing::info!(task_id = %next, "Queued task promoted to focus");
        }
    }

    fn release_agents(&self, state: &mut SystemState, task: &Task) {
        for agent_id in task.assigned_agents() {
            if let Some(agent) = state.agent_mut(agent_id) {
                if agent.finish_task(task.id()) {
                    tracing::info!(agent_id = %agent_id, task_id = %task.id(), "Agent released");
                }
            }
        }
    }
}

fn log_event(event: &TaskEvent) {
    match event {
        TaskEvent::Progressed { task_id, progress } => {
            tracing::debug!(task_id = %task_id, progress = *progress, "Task progressed")
        }
        TaskEvent::Failed { task_id, reason } => {
            tracing::info!(task_id = %task_id, reason = %reason, "Task failed")
        }
        other => tracing::info!(task_id = %other.task_id(), event = other.name(), "Task event"),
    }
}
