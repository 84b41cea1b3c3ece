use super::agent::Agent;
use super::message::Inbox;
use super::task::{Task, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use uuid::Uuid;

/// Overall health flag of the coordinated system
///
/// Set explicitly by operators and recovery tools; never derived from
/// agent statuses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemStatus {
    #[default]
    Idle,
    Busy,
    Degraded,
}

impl SystemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemStatus::Idle => "idle",
            SystemStatus::Busy => "busy",
            SystemStatus::Degraded => "degraded",
        }
    }
}

impl std::fmt::Display for SystemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SystemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(SystemStatus::Idle),
            "busy" => Ok(SystemStatus::Busy),
            "degraded" => Ok(SystemStatus::Degraded),
            other => Err(format!("Unknown system status: {}", other)),
        }
    }
}

/// Aggregate root holding every coordinated entity
///
/// One focus task lives in `current_task`; all other tasks, pending or
/// finished, live in `task_queue` in insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemState {
    pub(crate) system_status: SystemStatus,
    pub(crate) current_task: Option<Task>,
    #[serde(default)]
    pub(crate) task_queue: Vec<Task>,
    pub(crate) agents: BTreeMap<String, Agent>,
    #[serde(default)]
    pub(crate) inboxes: BTreeMap<String, Inbox>,
    pub(crate) last_updated: DateTime<Utc>,
}

impl Default for SystemState {
    fn default() -> Self {
        Self {
            system_status: SystemStatus::Idle,
            current_task: None,
            task_queue: Vec::new(),
            agents: BTreeMap::new(),
            inboxes: BTreeMap::new(),
            last_updated: Utc::now(),
        }
    }
}

impl SystemState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn system_status(&self) -> SystemStatus {
        self.system_status
    }

    pub fn current_task(&self) -> Option<&Task> {
        self.current_task.as_ref()
    }

    pub fn task_queue(&self) -> &[Task] {
        &self.task_queue
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    pub fn agents(&self) -> &BTreeMap<String, Agent> {
        &self.agents
    }

    pub fn agent(&self, agent_id: &str) -> Option<&Agent> {
        self.agents.get(agent_id)
    }

    pub(crate) fn agent_mut(&mut self, agent_id: &str) -> Option<&mut Agent> {
        self.agents.get_mut(agent_id)
    }

    pub fn inboxes(&self) -> &BTreeMap<String, Inbox> {
        &self.inboxes
    }

    pub fn inbox(&self, agent_id: &str) -> Option<&Inbox> {
        self.inboxes.get(agent_id)
    }

    pub(crate) fn inbox_mut(&mut self, agent_id: &str) -> &mut Inbox {
        self.inboxes.entry(agent_id.to_string()).or_default()
    }

    /// All tasks, focus task first
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.current_task.iter().chain(self.task_queue.iter())
    }

    pub fn task(&self, task_id: Uuid) -> Option<&Task> {
        self.tasks().find(|t| t.id() == task_id)
    }

    pub(crate) fn task_mut(&mut self, task_id: Uuid) -> Option<&mut Task> {
        if self.current_task.as_ref().map(Task::id) == Some(task_id) {
            return self.current_task.as_mut();
        }
        self.task_queue.iter_mut().find(|t| t.id() == task_id)
    }

    /// Makes `task` the focus task, moving any previous focus to the queue
    pub(crate) fn set_focus(&mut self, task: Task) {
        if let Some(previous) = self.current_task.replace(task) {
            self.task_queue.push(previous);
        }
    }

    pub(crate) fn enqueue(&mut self, task: Task) {
        self.task_queue.push(task);
    }

    /// Moves a queued task into the focus slot when the slot is free
    ///
    /// The slot is free when empty or holding a finished task.
    pub(crate) fn promote_if_unfocused(&mut self, task_id: Uuid) {
        let slot_free = self
            .current_task
            .as_ref()
            .map_or(true, |t| t.status().is_terminal());
        if !slot_free {
            return;
        }
        if let Some(pos) = self.task_queue.iter().position(|t| t.id() == task_id) {
            let task = self.task_queue.remove(pos);
            self.set_focus(task);
        }
    }

    /// Fills a free focus slot with the oldest queued task that has agents
    ///
    /// Returns the promoted task id. Pending tasks are never promoted.
    pub(crate) fn promote_next_active(&mut self) -> Option<Uuid> {
        let slot_free = self
            .current_task
            .as_ref()
            .map_or(true, |t| t.status().is_terminal());
        if !slot_free {
            return None;
        }
        let pos = self
            .task_queue
            .iter()
            .position(|t| matches!(t.status(), TaskStatus::Assigned | TaskStatus::InProgress))?;
        let task = self.task_queue.remove(pos);
        let task_id = task.id();
        self.set_focus(task);
        Some(task_id)
    }

    pub(crate) fn touch(&mut self) {
        self.last_updated = Utc::now();
    }

    /// Reconstructs the aggregate from persistence layer data
    pub fn from_persistence(
        system_status: SystemStatus,
        current_task: Option<Task>,
        task_queue: Vec<Task>,
        agents: BTreeMap<String, Agent>,
        inboxes: BTreeMap<String, Inbox>,
        last_updated: DateTime<Utc>,
    ) -> Self {
        Self {
            system_status,
            current_task,
            task_queue,
            agents,
            inboxes,
            last_updated,
        }
    }
}
