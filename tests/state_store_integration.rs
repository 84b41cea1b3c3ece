//! Integration tests for the StateStore backends
//!
//! These tests verify that both persistent backends reproduce a snapshot
//! exactly and that separate store handles see each other's writes.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use agent_state_coordinator::config::{CoordinatorConfig, StoreBackend};
use agent_state_coordinator::coordination::SharedStateManager;
use agent_state_coordinator::domain::repositories::StateStore;
use agent_state_coordinator::domain::state::SystemState;
use agent_state_coordinator::domain::agent::AgentStatus;
use agent_state_coordinator::domain::task::{Priority, TaskStatus};
use agent_state_coordinator::infrastructure::repositories::{JsonStateStore, SqliteStateStore};
use agent_state_coordinator::infrastructure::terminal::LogTerminal;
use uuid::Uuid;

fn temp_path(extension: &str) -> PathBuf {
    std::env::temp_dir()
        .join(format!("coordinator-test-{}", Uuid::new_v4()))
        .join(format!("shared_state.{}", extension))
}

fn config() -> CoordinatorConfig {
    CoordinatorConfig {
        backend: StoreBackend::Memory,
        ..Default::default()
    }
}

/// Builds a populated snapshot through the manager, then returns it
async fn populate(store: Arc<dyn StateStore>) -> SystemState {
    let manager = SharedStateManager::new(store, &config(), Arc::new(LogTerminal::new()))
        .await
        .expect("manager");

    manager
        .register_agent("backend-api", BTreeSet::from(["rust".to_string()]))
        .await
        .expect("register backend");
    manager
        .register_agent("frontend", BTreeSet::from(["react".to_string()]))
        .await
        .expect("register frontend");

    let task = manager
        .create_task("demo", Priority::High, BTreeSet::new())
        .await
        .expect("create task");
    manager
        .add_task("later", Priority::Low, BTreeSet::from(["react".to_string()]))
        .await
        .expect("add task");
    manager
        .assign_task(task.id(), BTreeSet::from(["backend-api".to_string()]))
        .await
        .expect("assign");
    manager
        .update_task_progress(task.id(), 50)
        .await
        .expect("progress");

    let question = manager
        .send_agent_message(
            "frontend",
            "backend-api",
            "Which port does the API use?",
            Some("ports".to_string()),
            Priority::Normal,
        )
        .await
        .expect("send");
    manager
        .mark_agent_message_read("backend-api", question)
        .await
        .expect("mark read");

    manager.snapshot().await.expect("snapshot")
}

#[tokio::test]
async fn test_json_store_round_trip() {
    let path = temp_path("json");
    let store = Arc::new(JsonStateStore::new(path.clone()));

    let expected = populate(store.clone()).await;

    let reopened = JsonStateStore::new(path.clone());
    let loaded = reopened.load().await.expect("load").expect("snapshot");
    assert_eq!(loaded, expected);

    let _ = std::fs::remove_dir_all(path.parent().expect("parent"));
}

#[tokio::test]
async fn test_sqlite_store_round_trip() {
    let path = temp_path("db");
    let url = format!("sqlite://{}", path.display());
    let store = Arc::new(SqliteStateStore::connect(&url).await.expect("connect"));

    let expected = populate(store.clone()).await;

    let reopened = SqliteStateStore::connect(&url).await.expect("reconnect");
    let loaded = reopened.load().await.expect("load").expect("snapshot");
    assert_eq!(loaded, expected);
    assert_eq!(loaded.task_queue().len(), 1);
    assert_eq!(
        loaded.inbox("backend-api").expect("inbox").unread_count(),
        1,
        "task notice stays unread, question was read"
    );

    let _ = std::fs::remove_dir_all(path.parent().expect("parent"));
}

#[tokio::test]
async fn test_sqlite_save_replaces_previous_snapshot() {
    let store = SqliteStateStore::connect("sqlite::memory:")
        .await
        .expect("connect");

    let populated = populate(Arc::new(store.clone())).await;
    assert!(!populated.agents().is_empty());

    let empty = SystemState::from_persistence(
        Default::default(),
        None,
        Vec::new(),
        BTreeMap::new(),
        BTreeMap::new(),
        chrono::Utc::now(),
    );
    store.save(&empty).await.expect("save empty");

    let loaded = store.load().await.expect("load").expect("snapshot");
    assert!(loaded.agents().is_empty());
    assert!(loaded.tasks().next().is_none());
}

#[tokio::test]
async fn test_managers_sharing_a_file_see_each_other() {
    let path = temp_path("json");
    let backend = StoreBackend::Json { path: path.clone() };
    let config = CoordinatorConfig {
        backend,
        ..Default::default()
    };

    let first = SharedStateManager::open(&config).await.expect("first");
    let second = SharedStateManager::open(&config).await.expect("second");

    first
        .register_agent("a", BTreeSet::new())
        .await
        .expect("register a");
    second
        .register_agent("b", BTreeSet::new())
        .await
        .expect("register b");

    let seen_by_first = first.snapshot().await.expect("snapshot");
    assert!(seen_by_first.agent("a").is_some());
    assert!(seen_by_first.agent("b").is_some());

    let _ = std::fs::remove_dir_all(path.parent().expect("parent"));
}

/// Checks relationships that only hold in a snapshot from a single commit
fn assert_consistent(state: &SystemState) {
    for agent_id in state.inboxes().keys() {
        assert!(
            state.agent(agent_id).is_some(),
            "inbox for unregistered agent {}",
            agent_id
        );
    }
    for task in state.tasks().filter(|t| t.status() == TaskStatus::Assigned) {
        for agent_id in task.assigned_agents() {
            let agent = state.agent(agent_id).expect("assigned agent registered");
            assert_eq!(agent.status(), AgentStatus::Busy);
            assert_eq!(agent.current_task(), Some(task.id()));
        }
    }
}

async fn run_writer(url: &str, prefix: &str, rounds: usize, finished: &AtomicUsize) {
    let store = Arc::new(SqliteStateStore::connect(url).await.expect("writer connect"));
    let manager = SharedStateManager::new(store, &config(), Arc::new(LogTerminal::new()))
        .await
        .expect("writer manager");

    for n in 0..rounds {
        let agent_id = format!("{}-{}", prefix, n);
        manager
            .register_agent(&agent_id, BTreeSet::new())
            .await
            .expect("register");
        let task = manager
            .add_task(&format!("work for {}", agent_id), Priority::Normal, BTreeSet::new())
            .await
            .expect("add task");
        manager
            .assign_task(task.id(), BTreeSet::from([agent_id.clone()]))
            .await
            .expect("assign");
    }
    finished.fetch_add(1, Ordering::SeqCst);
}

#[tokio::test]
async fn test_sqlite_handles_never_observe_partial_snapshots() {
    let path = temp_path("db");
    let url = format!("sqlite://{}", path.display());
    let reader = SqliteStateStore::connect(&url).await.expect("reader connect");
    let rounds = 8;
    let finished = AtomicUsize::new(0);

    let read_loop = async {
        let mut reads = 0;
        while finished.load(Ordering::SeqCst) < 2 {
            if let Some(state) = reader.load().await.expect("load") {
                assert_consistent(&state);
                reads += 1;
            }
            tokio::task::yield_now().await;
        }
        reads
    };

    let (_, _, reads) = tokio::join!(
        run_writer(&url, "left", rounds, &finished),
        run_writer(&url, "right", rounds, &finished),
        read_loop,
    );
    assert!(reads > 0);

    // interleaved writers must not drop each other's updates
    let last = reader.load().await.expect("load").expect("snapshot");
    assert_consistent(&last);
    assert_eq!(last.agents().len(), 2 * rounds);
    assert_eq!(last.tasks().count(), 2 * rounds);
    assert!(last
        .agents()
        .values()
        .all(|agent| agent.status() == AgentStatus::Busy));

    let _ = std::fs::remove_dir_all(path.parent().expect("parent"));
}
