use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::classifier::MessageClassifier;
use super::decision::DecisionEngine;
use super::messaging::MessageBus;
use super::notifier::NotificationDispatcher;
use super::registry::AgentRegistry;
use super::tasks::TaskLifecycleManager;
use crate::config::CoordinatorConfig;
use crate::domain::agent::{Agent, AgentStatus};
use crate::domain::message::{Inbox, Message, MessageType};
use crate::domain::repositories::StateStore;
use crate::domain::state::{SystemState, SystemStatus};
use crate::domain::task::{Priority, Task, TaskStatus};
use crate::domain::terminal::TerminalDriver;
use crate::errors::{CoordinatorError, CoordinatorResult};
use crate::infrastructure::repositories::open_store;
use crate::infrastructure::terminal::LogTerminal;

/// Counts describing agents and tasks
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemStats {
    pub system_status: SystemStatus,
    pub total_agents: usize,
    pub active_agents: usize,
    pub agents_by_status: BTreeMap<String, usize>,
    pub total_tasks: usize,
    pub tasks_by_status: BTreeMap<String, usize>,
    pub completed_tasks: usize,
    pub current_task: Option<Uuid>,
}

/// Counts describing inbox traffic
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessagingStats {
    pub total_agents: usize,
    pub total_messages: usize,
    pub unread_messages: usize,
    /// Distinct sender/recipient pairs with a message inside the window
    pub active_conversations: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assignment {
    pub task_id: Uuid,
    pub agents: BTreeSet<String>,
}

/// Outcome of one automatic assignment pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AssignmentReport {
    pub assigned: Vec<Assignment>,
    pub unmatched: Vec<Uuid>,
}

/// Single entry point for every read and write of the shared state
///
/// Mutations are serialized by an async mutex. Each one hands the change
/// to [`StateStore::update`], which applies it to the latest stored
/// snapshot and persists the result; only then is the copy published. Terminal notifications produced by
/// a mutation are dispatched after the lock is released.
pub struct SharedStateManager {
    store: Arc<dyn StateStore>,
    state: Mutex<SystemState>,
    registry: AgentRegistry,
    classifier: Arc<MessageClassifier>,
    bus: MessageBus,
    tasks: TaskLifecycleManager,
    decision: DecisionEngine,
    dispatcher: NotificationDispatcher,
    conversation_window: Duration,
}

impl SharedStateManager {
    /// Creates a manager over `store`, loading the latest snapshot
    pub async fn new(
        store: Arc<dyn StateStore>,
        config: &CoordinatorConfig,
        driver: Arc<dyn TerminalDriver>,
    ) -> CoordinatorResult<Self> {
        let initial = store.load().await?.unwrap_or_default();
        tracing::info!(
            store = store.name(),
            agents = initial.agents().len(),
            tasks = initial.tasks().count(),
            "Shared state loaded"
        );

        let classifier = Arc::new(MessageClassifier::new());
        let bus = MessageBus::new(classifier.clone());

        Ok(Self {
            store,
            state: Mutex::new(initial),
            registry: AgentRegistry::new(config.heartbeat_max_age),
            classifier,
            tasks: TaskLifecycleManager::new(bus.clone()),
            bus,
            decision: DecisionEngine::new(),
            dispatcher: NotificationDispatcher::new(driver, config.notification_delay),
            conversation_window: config.conversation_window,
        })
    }

    /// Opens the configured store with the logging terminal driver
    pub async fn open(config: &CoordinatorConfig) -> CoordinatorResult<Self> {
        let store = open_store(&config.backend).await?;
        Self::new(store, config, Arc::new(LogTerminal::new())).await
    }

    pub fn store_name(&self) -> &str {
        self.store.name()
    }

    /// Applies `op` to the latest state and persists the result
    ///
    /// Returns the operation's value plus the messages it created. Message
    /// types are counted only once the result is stored.
    async fn commit<T, F>(&self, op: &'static str, f: F) -> CoordinatorResult<(T, Vec<Message>)>
    where
        T: Send,
        F: FnOnce(&mut SystemState, &mut Vec<Message>) -> CoordinatorResult<T> + Send,
    {
        let mut cache = self.state.lock().await;

        let fallback: &SystemState = &cache;
        let mut op_fn = Some(f);
        let mut produced = None;
        let updated = self
            .store
            .update(&mut |latest| {
                let f = op_fn
                    .take()
                    .ok_or_else(|| CoordinatorError::persistence("state update replayed"))?;
                let mut working = latest.unwrap_or_else(|| fallback.clone());
                let mut outbox = Vec::new();
                let value = f(&mut working, &mut outbox)?;
                working.touch();
                produced = Some((value, outbox));
                Ok(working)
            })
            .await;

        let working = match updated {
            Ok(working) => working,
            Err(e) => {
                if produced.is_some() {
                    tracing::error!(op, store = self.store.name(), error = %e, "Failed to persist state");
                }
                return Err(e);
            }
        };
        let (value, outbox) = produced
            .ok_or_else(|| CoordinatorError::persistence("state update produced no result"))?;
        tracing::debug!(op, store = self.store.name(), "State persisted");

        *cache = working;
        for message in &outbox {
            self.classifier.record(message.message_type());
        }
        Ok((value, outbox))
    }

    async fn mutate<T, F>(&self, op: &'static str, f: F) -> CoordinatorResult<T>
    where
        T: Send,
        F: FnOnce(&mut SystemState, &mut Vec<Message>) -> CoordinatorResult<T> + Send,
    {
        let (value, outbox) = self.commit(op, f).await?;
        self.dispatch(outbox).await;
        Ok(value)
    }

    async fn dispatch(&self, outbox: Vec<Message>) {
        if outbox.is_empty() {
            return;
        }

        let mut delivered = Vec::new();
        for message in &outbox {
            match self
                .dispatcher
                .send_terminal_notification(message.recipient_id(), message)
                .await
            {
                Ok(()) => delivered.push((message.recipient_id().to_string(), message.id())),
                Err(e) => tracing::warn!(
                    agent_id = %message.recipient_id(),
                    message_id = %message.id(),
                    error = %e,
                    "Notification delivery failed"
                ),
            }
        }

        if delivered.is_empty() {
            return;
        }
        let result = self
            .commit("mark_delivered", |state, _| {
                for (agent_id, message_id) in &delivered {
                    self.bus.mark_delivered(state, agent_id, *message_id);
                }
                Ok(())
            })
            .await;
        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to record deliveries");
        }
    }

    /// Latest persisted snapshot
    pub async fn snapshot(&self) -> CoordinatorResult<SystemState> {
        match self.store.load().await? {
            Some(state) => Ok(state),
            None => Ok(self.state.lock().await.clone()),
        }
    }

    // ===== Agents =====

    pub async fn register_agent(
        &self,
        agent_id: &str,
        capabilities: BTreeSet<String>,
    ) -> CoordinatorResult<Agent> {
        self.mutate("register_agent", |state, _| {
            self.registry.register(state, agent_id, capabilities)
        })
        .await
    }

    pub async fn heartbeat(&self, agent_id: &str) -> CoordinatorResult<()> {
        self.mutate("heartbeat", |state, _| self.registry.heartbeat(state, agent_id))
            .await
    }

    pub async fn update_agent_status(
        &self,
        agent_id: &str,
        status: AgentStatus,
        error_message: Option<String>,
    ) -> CoordinatorResult<Agent> {
        self.mutate("update_agent_status", |state, _| {
            self.registry
                .update_status(state, agent_id, status, error_message)
        })
        .await
    }

    pub async fn is_agent_active(&self, agent_id: &str) -> CoordinatorResult<bool> {
        let state = self.snapshot().await?;
        self.registry
            .is_active(&state, agent_id, self.registry.max_age())
    }

    pub async fn stale_agents(&self) -> CoordinatorResult<Vec<String>> {
        let state = self.snapshot().await?;
        Ok(self.registry.stale_agents(&state))
    }

    /// Manual override of the overall status flag
    pub async fn set_system_status(&self, status: SystemStatus) -> CoordinatorResult<()> {
        self.mutate("set_system_status", |state, _| {
            state.system_status = status;
            tracing::info!(status = %status, "System status set");
            Ok(())
        })
        .await
    }

    // ===== Tasks =====

    pub async fn create_task(
        &self,
        description: &str,
        priority: Priority,
        required_capabilities: BTreeSet<String>,
    ) -> CoordinatorResult<Task> {
        self.mutate("create_task", |state, _| {
            self.tasks
                .create_task(state, description, priority, required_capabilities)
        })
        .await
    }

    pub async fn add_task(
        &self,
        description: &str,
        priority: Priority,
        required_capabilities: BTreeSet<String>,
    ) -> CoordinatorResult<Task> {
        self.mutate("add_task", |state, _| {
            self.tasks
                .add_task(state, description, priority, required_capabilities)
        })
        .await
    }

    pub async fn assign_task(
        &self,
        task_id: Uuid,
        agent_ids: BTreeSet<String>,
    ) -> CoordinatorResult<Task> {
        self.mutate("assign_task", |state, outbox| {
            self.tasks.assign_task(state, outbox, task_id, agent_ids)
        })
        .await
    }

    pub async fn start_task(&self, task_id: Uuid) -> CoordinatorResult<Task> {
        self.mutate("start_task", |state, _| self.tasks.start_task(state, task_id))
            .await
    }

    pub async fn update_task_progress(&self, task_id: Uuid, progress: u8) -> CoordinatorResult<Task> {
        self.mutate("update_task_progress", |state, _| {
            self.tasks.update_progress(state, task_id, progress)
        })
        .await
    }

    pub async fn complete_task(
        &self,
        task_id: Uuid,
        results: BTreeMap<String, String>,
    ) -> CoordinatorResult<Task> {
        self.mutate("complete_task", |state, outbox| {
            self.tasks.complete_task(state, outbox, task_id, results)
        })
        .await
    }

    pub async fn fail_task(&self, task_id: Uuid, reason: &str) -> CoordinatorResult<Task> {
        self.mutate("fail_task", |state, outbox| {
            self.tasks.fail_task(state, outbox, task_id, reason)
        })
        .await
    }

    /// Assigns every pending task that some idle agents can cover
    ///
    /// Tasks are visited by priority (highest first), then age.
    pub async fn auto_assign_pending(&self) -> CoordinatorResult<AssignmentReport> {
        let report = self
            .mutate("auto_assign_pending", |state, outbox| {
                let mut pending: Vec<&Task> = state
                    .tasks()
                    .filter(|t| t.status() == TaskStatus::Pending)
                    .collect();
                pending.sort_by(|a, b| {
                    b.priority()
                        .cmp(&a.priority())
                        .then_with(|| a.created_at().cmp(&b.created_at()))
                });
                let order: Vec<Uuid> = pending.into_iter().map(Task::id).collect();

                let mut report = AssignmentReport::default();
                for task_id in order {
                    let Some(task) = state.task(task_id).cloned() else {
                        continue;
                    };
                    let agents = self.decision.select_agents(&task, state);
                    if agents.is_empty() {
                        report.unmatched.push(task_id);
                        continue;
                    }
                    self.tasks
                        .assign_task(state, outbox, task_id, agents.clone())?;
                    report.assigned.push(Assignment { task_id, agents });
                }
                Ok(report)
            })
            .await?;
        self.decision.record_unmatched(report.unmatched.len());

        tracing::info!(
            assigned = report.assigned.len(),
            unmatched = report.unmatched.len(),
            "Auto-assignment finished"
        );
        Ok(report)
    }

    // ===== Messaging =====

    pub async fn send_agent_message(
        &self,
        sender: &str,
        recipient: &str,
        content: &str,
        subject: Option<String>,
        priority: Priority,
    ) -> CoordinatorResult<Uuid> {
        self.mutate("send_agent_message", |state, outbox| {
            self.bus
                .send(state, outbox, sender, recipient, content, subject, priority)
        })
        .await
    }

    pub async fn broadcast_agent_message(
        &self,
        sender: &str,
        content: &str,
        subject: Option<String>,
        priority: Priority,
    ) -> CoordinatorResult<Vec<Uuid>> {
        self.mutate("broadcast_agent_message", |state, outbox| {
            self.bus
                .broadcast(state, outbox, sender, content, subject, priority)
        })
        .await
    }

    pub async fn get_agent_inbox(&self, agent_id: &str) -> CoordinatorResult<Inbox> {
        let state = self.snapshot().await?;
        self.bus.get_inbox(&state, agent_id)
    }

    pub async fn mark_agent_message_read(
        &self,
        agent_id: &str,
        message_id: Uuid,
    ) -> CoordinatorResult<bool> {
        self.mutate("mark_agent_message_read", |state, _| {
            self.bus.mark_read(state, agent_id, message_id)
        })
        .await
    }

    // ===== Stats =====

    pub async fn get_system_stats(&self) -> CoordinatorResult<SystemStats> {
        let state = self.snapshot().await?;

        let mut agents_by_status: BTreeMap<String, usize> = [
            AgentStatus::Idle,
            AgentStatus::Busy,
            AgentStatus::Error,
        ]
        .iter()
        .map(|s| (s.as_str().to_string(), 0))
        .collect();
        for agent in state.agents().values() {
            *agents_by_status
                .entry(agent.status().as_str().to_string())
                .or_insert(0) += 1;
        }

        let mut tasks_by_status: BTreeMap<String, usize> = BTreeMap::new();
        for task in state.tasks() {
            *tasks_by_status
                .entry(task.status().as_str().to_string())
                .or_insert(0) += 1;
        }

        Ok(SystemStats {
            system_status: state.system_status(),
            total_agents: state.agents().len(),
            active_agents: self.registry.active_count(&state),
            agents_by_status,
            total_tasks: state.tasks().count(),
            completed_tasks: state
                .tasks()
                .filter(|t| t.status() == TaskStatus::Completed)
                .count(),
            tasks_by_status,
            current_task: state.current_task().map(Task::id),
        })
    }

    pub async fn get_messaging_stats(&self) -> CoordinatorResult<MessagingStats> {
        let state = self.snapshot().await?;
        // a window reaching past the representable range counts every message
        let cutoff = chrono::Duration::from_std(self.conversation_window)
            .ok()
            .and_then(|window| Utc::now().checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let mut total_messages = 0;
        let mut unread_messages = 0;
        let mut conversations: BTreeSet<(String, String)> = BTreeSet::new();
        for inbox in state.inboxes().values() {
            total_messages += inbox.len();
            unread_messages += inbox.unread_count();
            for message in inbox.messages() {
                if message.timestamp() >= cutoff {
                    let (a, b) = (message.sender_id(), message.recipient_id());
                    let pair = if a <= b { (a, b) } else { (b, a) };
                    conversations.insert((pair.0.to_string(), pair.1.to_string()));
                }
            }
        }

        Ok(MessagingStats {
            total_agents: state.agents().len(),
            total_messages,
            unread_messages,
            active_conversations: conversations.len(),
        })
    }

    /// Per-type classification counts observed by this process
    pub fn get_classification_stats(&self) -> BTreeMap<MessageType, u64> {
        self.classifier.get_classification_stats()
    }

    /// Tasks the decision engine could not staff since start
    pub fn unmatched_task_count(&self) -> u64 {
        self.decision.unmatched_count()
    }
}

impl std::fmt::Debug for SharedStateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedStateManager")
            .field("store", &self.store.name())
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreBackend;
    use crate::infrastructure::repositories::MemoryStateStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FlakyStore {
        inner: MemoryStateStore,
        fail_saves: AtomicBool,
    }

    #[async_trait]
    impl StateStore for FlakyStore {
        async fn load(&self) -> CoordinatorResult<Option<SystemState>> {
            self.inner.load().await
        }

        async fn save(&self, state: &SystemState) -> CoordinatorResult<()> {
            if self.fail_saves.load(Ordering::SeqCst) {
                return Err(CoordinatorError::persistence("disk full"));
            }
            self.inner.save(state).await
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }

    fn config() -> CoordinatorConfig {
        CoordinatorConfig {
            backend: StoreBackend::Memory,
            ..Default::default()
        }
    }

    fn set(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    async fn manager() -> SharedStateManager {
        SharedStateManager::open(&config()).await.unwrap()
    }

    #[tokio::test]
    async fn test_failed_save_leaves_state_unchanged() {
        let store = Arc::new(FlakyStore {
            inner: MemoryStateStore::new(),
            fail_saves: AtomicBool::new(false),
        });
        let manager = SharedStateManager::new(store.clone(), &config(), Arc::new(LogTerminal::new()))
            .await
            .unwrap();
        manager.register_agent("a", BTreeSet::new()).await.unwrap();
        let before = manager.snapshot().await.unwrap();

        store.fail_saves.store(true, Ordering::SeqCst);
        let result = manager.register_agent("b", BTreeSet::new()).await;
        assert!(matches!(result, Err(CoordinatorError::Persistence(_))));

        assert_eq!(manager.snapshot().await.unwrap(), before);
        assert_eq!(*manager.state.lock().await, before);
    }

    #[tokio::test]
    async fn test_counters_skip_operations_that_fail_to_persist() {
        let store = Arc::new(FlakyStore {
            inner: MemoryStateStore::new(),
            fail_saves: AtomicBool::new(false),
        });
        let manager = SharedStateManager::new(store.clone(), &config(), Arc::new(LogTerminal::new()))
            .await
            .unwrap();
        manager.register_agent("a", BTreeSet::new()).await.unwrap();
        manager.register_agent("b", BTreeSet::new()).await.unwrap();
        manager
            .add_task("Draw logo", Priority::Normal, set(&["figma"]))
            .await
            .unwrap();

        store.fail_saves.store(true, Ordering::SeqCst);
        assert!(manager
            .send_agent_message("a", "b", "why is CI red?", None, Priority::Normal)
            .await
            .is_err());
        assert!(manager.auto_assign_pending().await.is_err());

        assert!(manager.get_classification_stats().values().all(|&n| n == 0));
        assert_eq!(manager.unmatched_task_count(), 0);

        store.fail_saves.store(false, Ordering::SeqCst);
        manager
            .send_agent_message("a", "b", "why is CI red?", None, Priority::Normal)
            .await
            .unwrap();
        assert_eq!(manager.get_classification_stats()[&MessageType::Question], 1);
    }

    #[tokio::test]
    async fn test_rejected_operation_does_not_persist() {
        let manager = manager().await;
        manager.register_agent("a", BTreeSet::new()).await.unwrap();
        let before = manager.snapshot().await.unwrap();

        let result = manager
            .send_agent_message("a", "ghost", "hi", None, Priority::Normal)
            .await;

        assert!(matches!(result, Err(CoordinatorError::UnknownRecipient(_))));
        assert_eq!(manager.snapshot().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_dispatch_marks_messages_delivered() {
        let manager = manager().await;
        manager.register_agent("a", BTreeSet::new()).await.unwrap();
        manager.register_agent("b", BTreeSet::new()).await.unwrap();

        let id = manager
            .send_agent_message("a", "b", "ping", None, Priority::Normal)
            .await
            .unwrap();

        let inbox = manager.get_agent_inbox("b").await.unwrap();
        assert_eq!(
            inbox.get(id).unwrap().status(),
            crate::domain::message::MessageStatus::Delivered
        );
        assert_eq!(inbox.unread_count(), 1);
    }

    #[tokio::test]
    async fn test_auto_assign_by_priority_and_capability() {
        let manager = manager().await;
        manager.register_agent("db", set(&["sql"])).await.unwrap();
        manager.register_agent("web", set(&["react"])).await.unwrap();

        let low = manager
            .add_task("Tune sql queries", Priority::Low, BTreeSet::new())
            .await
            .unwrap();
        let urgent = manager
            .add_task("Fix sql outage", Priority::Urgent, BTreeSet::new())
            .await
            .unwrap();
        let design = manager
            .add_task("Draw logo", Priority::Normal, set(&["figma"]))
            .await
            .unwrap();

        let report = manager.auto_assign_pending().await.unwrap();

        assert_eq!(
            report.assigned,
            vec![Assignment {
                task_id: urgent.id(),
                agents: set(&["db"])
            }]
        );
        assert!(report.unmatched.contains(&design.id()));
        assert!(report.unmatched.contains(&low.id()));
        assert_eq!(manager.unmatched_task_count(), 2);
    }

    #[tokio::test]
    async fn test_system_stats_counts() {
        let manager = manager().await;
        manager.register_agent("a", BTreeSet::new()).await.unwrap();
        manager.register_agent("b", BTreeSet::new()).await.unwrap();
        let task = manager
            .create_task("demo", Priority::High, BTreeSet::new())
            .await
            .unwrap();
        manager.assign_task(task.id(), set(&["a"])).await.unwrap();

        let stats = manager.get_system_stats().await.unwrap();
        assert_eq!(stats.total_agents, 2);
        assert_eq!(stats.active_agents, 2);
        assert_eq!(stats.agents_by_status["busy"], 1);
        assert_eq!(stats.agents_by_status["idle"], 1);
        assert_eq!(stats.agents_by_status["error"], 0);
        assert_eq!(stats.tasks_by_status["assigned"], 1);
        assert_eq!(stats.current_task, Some(task.id()));
        assert_eq!(stats.system_status, SystemStatus::Idle);
    }

    #[tokio::test]
    async fn test_messaging_stats_counts_conversations() {
        let manager = manager().await;
        for id in ["a", "b", "c"] {
            manager.register_agent(id, BTreeSet::new()).await.unwrap();
        }
        manager
            .send_agent_message("a", "b", "ping", None, Priority::Normal)
            .await
            .unwrap();
        let reply = manager
            .send_agent_message("b", "a", "pong", None, Priority::Normal)
            .await
            .unwrap();
        manager
            .send_agent_message("c", "a", "hello", None, Priority::Normal)
            .await
            .unwrap();
        manager.mark_agent_message_read("a", reply).await.unwrap();

        let stats = manager.get_messaging_stats().await.unwrap();
        assert_eq!(stats.total_agents, 3);
        assert_eq!(stats.total_messages, 3);
        assert_eq!(stats.unread_messages, 2);
        assert_eq!(stats.active_conversations, 2);

        let kinds = manager.get_classification_stats();
        assert_eq!(kinds.values().sum::<u64>(), 3);
    }

    #[tokio::test]
    async fn test_unbounded_conversation_window_counts_everything() {
        let config = CoordinatorConfig {
            conversation_window: Duration::from_secs(u64::MAX),
            ..config()
        };
        let manager = SharedStateManager::new(
            Arc::new(MemoryStateStore::new()),
            &config,
            Arc::new(LogTerminal::new()),
        )
        .await
        .unwrap();
        manager.register_agent("a", BTreeSet::new()).await.unwrap();
        manager.register_agent("b", BTreeSet::new()).await.unwrap();
        manager
            .send_agent_message("a", "b", "ping", None, Priority::Normal)
            .await
            .unwrap();

        let stats = manager.get_messaging_stats().await.unwrap();
        assert_eq!(stats.active_conversations, 1);
    }

    #[tokio::test]
    async fn test_set_system_status_is_manual() {
        let manager = manager().await;
        manager.register_agent("a", BTreeSet::new()).await.unwrap();
        manager
            .update_agent_status("a", AgentStatus::Error, Some("oom".to_string()))
            .await
            .unwrap();
        assert_eq!(
            manager.snapshot().await.unwrap().system_status(),
            SystemStatus::Idle
        );

        manager
            .set_system_status(SystemStatus::Degraded)
            .await
            .unwrap();
        assert_eq!(
            manager.snapshot().await.unwrap().system_status(),
            SystemStatus::Degraded
        );
    }
}
