use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteRow,
};
use sqlx::Row;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::agent::Agent;
use crate::domain::message::{Inbox, Message};
use crate::domain::repositories::StateStore;
use crate::domain::state::SystemState;
use crate::domain::task::Task;
use crate::errors::{CoordinatorError, CoordinatorResult};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS system_state (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        system_status TEXT NOT NULL CHECK (system_status IN ('idle', 'busy', 'degraded')),
        current_task_id TEXT,
        last_updated TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS agents (
        agent_id TEXT PRIMARY KEY,
        status TEXT NOT NULL CHECK (status IN ('idle', 'busy', 'error')),
        current_task TEXT,
        error_message TEXT,
        capabilities TEXT NOT NULL DEFAULT '[]',
        registered_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS heartbeats (
        agent_id TEXT PRIMARY KEY REFERENCES agents (agent_id) ON DELETE CASCADE,
        last_activity TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tasks (
        task_id TEXT PRIMARY KEY,
        position INTEGER NOT NULL,
        description TEXT NOT NULL,
        status TEXT NOT NULL
            CHECK (status IN ('pending', 'assigned', 'in_progress', 'completed', 'failed')),
        priority TEXT NOT NULL CHECK (priority IN ('LOW', 'NORMAL', 'HIGH', 'URGENT')),
        assigned_agents TEXT NOT NULL DEFAULT '[]',
        progress INTEGER NOT NULL DEFAULT 0 CHECK (progress BETWEEN 0 AND 100),
        created_at TEXT NOT NULL,
        started_at TEXT,
        completed_at TEXT,
        results TEXT NOT NULL DEFAULT '{}',
        failure_reason TEXT,
        required_capabilities TEXT NOT NULL DEFAULT '[]'
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS messages (
        message_id TEXT PRIMARY KEY,
        seq INTEGER NOT NULL,
        sender_id TEXT NOT NULL,
        recipient_id TEXT NOT NULL,
        subject TEXT,
        content TEXT NOT NULL,
        priority TEXT NOT NULL CHECK (priority IN ('LOW', 'NORMAL', 'HIGH', 'URGENT')),
        message_type TEXT NOT NULL CHECK (message_type IN (
            'status_report', 'tool_use_notice', 'question',
            'error_report', 'task_update', 'generic'
        )),
        status TEXT NOT NULL CHECK (status IN ('sent', 'delivered', 'read')),
        timestamp TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_messages_recipient ON messages (recipient_id, seq)",
];

/// SQLite implementation of StateStore
///
/// Mirrors the snapshot into relational tables. A save rewrites every
/// table inside one transaction and a load reads them inside one, so
/// readers never see a half-applied snapshot. `update` keeps the write
/// lock across the read and the write.
#[derive(Clone)]
pub struct SqliteStateStore {
    pool: SqlitePool,
}

impl SqliteStateStore {
    /// Connects to `database_url` and creates the tables if needed
    ///
    /// Accepts `sqlite://path/to/file.db` and `sqlite::memory:`. Parent
    /// directories of file databases are created on demand.
    pub async fn connect(database_url: &str) -> CoordinatorResult<Self> {
        if let Some(path) = database_file(database_url) {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    tokio::fs::create_dir_all(parent).await?;
                    tracing::info!(path = %parent.display(), "Created database directory");
                }
            }
        }

        let in_memory = database_url.contains(":memory:");
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| CoordinatorError::Config(format!("Invalid database URL: {}", e)))?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));
        let options = if in_memory {
            options
        } else {
            options.journal_mode(SqliteJournalMode::Wal)
        };

        // every connection to :memory: is a separate database
        let max_connections = if in_memory { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }

        tracing::info!(url = %database_url, "State database initialized");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn load(&self) -> CoordinatorResult<Option<SystemState>> {
        // one read transaction pins every SELECT to the same commit
        let mut tx = self.pool.begin().await?;
        let state = read_snapshot(&mut *tx).await?;
        tx.commit().await?;
        Ok(state)
    }

    async fn save(&self, state: &SystemState) -> CoordinatorResult<()> {
        let mut tx = self.pool.begin().await?;
        write_snapshot(&mut *tx, state).await?;
        tx.commit().await?;

        tracing::debug!(
            agents = state.agents().len(),
            tasks = state.tasks().count(),
            "Snapshot committed to database"
        );
        Ok(())
    }

    /// Holds the database write lock from the read through the write
    ///
    /// `BEGIN IMMEDIATE` makes writers in other processes wait (up to the
    /// busy timeout) instead of interleaving their own read-modify-write.
    async fn update(
        &self,
        apply: &mut (dyn FnMut(Option<SystemState>) -> CoordinatorResult<SystemState> + Send),
    ) -> CoordinatorResult<SystemState> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let outcome: CoordinatorResult<SystemState> = async {
            let latest = read_snapshot(&mut *conn).await?;
            let next = apply(latest)?;
            write_snapshot(&mut *conn, &next).await?;
            Ok(next)
        }
        .await;

        let finish = if outcome.is_ok() { "COMMIT" } else { "ROLLBACK" };
        if let Err(e) = sqlx::query(finish).execute(&mut *conn).await {
            if outcome.is_ok() {
                if let Err(rollback) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                    tracing::warn!(error = %rollback, "Rollback after failed commit failed");
                }
                return Err(e.into());
            }
            tracing::warn!(error = %e, "Rollback failed");
        }

        let next = outcome?;
        tracing::debug!(
            agents = next.agents().len(),
            tasks = next.tasks().count(),
            "Snapshot updated under write lock"
        );
        Ok(next)
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

async fn read_snapshot(conn: &mut SqliteConnection) -> CoordinatorResult<Option<SystemState>> {
    let header = sqlx::query(
        "SELECT system_status, current_task_id, last_updated FROM system_state WHERE id = 1",
    )
    .fetch_optional(&mut *conn)
    .await?;

    let Some(header) = header else {
        return Ok(None);
    };

    let system_status = parse_enum(&header.try_get::<String, _>("system_status")?)?;
    let current_task_id = parse_optional_uuid(header.try_get("current_task_id")?)?;
    let last_updated = parse_time(&header.try_get::<String, _>("last_updated")?)?;

    let agents = read_agents(conn).await?;
    let inboxes = read_inboxes(conn, &agents).await?;

    let mut current_task = None;
    let mut task_queue = Vec::new();
    for task in read_tasks(conn).await? {
        if Some(task.id()) == current_task_id {
            current_task = Some(task);
        } else {
            task_queue.push(task);
        }
    }

    Ok(Some(SystemState::from_persistence(
        system_status,
        current_task,
        task_queue,
        agents,
        inboxes,
        last_updated,
    )))
}

async fn read_agents(conn: &mut SqliteConnection) -> CoordinatorResult<BTreeMap<String, Agent>> {
    let rows = sqlx::query(
        r#"
        SELECT a.agent_id, a.status, a.current_task, a.error_message,
               a.capabilities, a.registered_at, h.last_activity
        FROM agents a
        LEFT JOIN heartbeats h ON h.agent_id = a.agent_id
        ORDER BY a.agent_id
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;

    let mut agents = BTreeMap::new();
    for row in rows {
        let agent_id: String = row.try_get("agent_id")?;
        let registered_at = parse_time(&row.try_get::<String, _>("registered_at")?)?;
        let last_activity = match row.try_get::<Option<String>, _>("last_activity")? {
            Some(raw) => parse_time(&raw)?,
            None => registered_at,
        };
        let agent = Agent::from_persistence(
            agent_id.clone(),
            parse_enum(&row.try_get::<String, _>("status")?)?,
            parse_optional_uuid(row.try_get("current_task")?)?,
            last_activity,
            row.try_get("error_message")?,
            serde_json::from_str(&row.try_get::<String, _>("capabilities")?)?,
            registered_at,
        );
        agents.insert(agent_id, agent);
    }
    Ok(agents)
}

async fn read_tasks(conn: &mut SqliteConnection) -> CoordinatorResult<Vec<Task>> {
    let rows = sqlx::query(
        r#"
        SELECT task_id, description, status, priority, assigned_agents, progress,
               created_at, started_at, completed_at, results, failure_reason,
               required_capabilities
        FROM tasks
        ORDER BY position
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(task_from_row).collect()
}

async fn read_inboxes(
    conn: &mut SqliteConnection,
    agents: &BTreeMap<String, Agent>,
) -> CoordinatorResult<BTreeMap<String, Inbox>> {
    let rows = sqlx::query(
        r#"
        SELECT message_id, sender_id, recipient_id, subject, content, priority,
               message_type, status, timestamp
        FROM messages
        ORDER BY recipient_id, seq
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;

    let mut grouped: BTreeMap<String, Vec<Message>> = agents
        .keys()
        .map(|id| (id.clone(), Vec::new()))
        .collect();
    for row in &rows {
        let message = message_from_row(row)?;
        grouped
            .entry(message.recipient_id().to_string())
            .or_default()
            .push(message);
    }

    Ok(grouped
        .into_iter()
        .map(|(id, messages)| (id, Inbox::from_persistence(messages)))
        .collect())
}

/// Rewrites every table from `state`; the caller owns the transaction
async fn write_snapshot(conn: &mut SqliteConnection, state: &SystemState) -> CoordinatorResult<()> {
    for table in ["messages", "heartbeats", "agents", "tasks"] {
        sqlx::query(&format!("DELETE FROM {}", table))
            .execute(&mut *conn)
            .await?;
    }

    sqlx::query(
        r#"
        INSERT INTO system_state (id, system_status, current_task_id, last_updated)
        VALUES (1, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            system_status = excluded.system_status,
            current_task_id = excluded.current_task_id,
            last_updated = excluded.last_updated
        "#,
    )
    .bind(state.system_status().as_str())
    .bind(state.current_task().map(|t| t.id().to_string()))
    .bind(format_time(state.last_updated()))
    .execute(&mut *conn)
    .await?;

    for agent in state.agents().values() {
        sqlx::query(
            r#"
            INSERT INTO agents (
                agent_id, status, current_task, error_message, capabilities, registered_at
            )
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(agent.agent_id())
        .bind(agent.status().as_str())
        .bind(agent.current_task().map(|id| id.to_string()))
        .bind(agent.error_message())
        .bind(serde_json::to_string(agent.capabilities())?)
        .bind(format_time(agent.registered_at()))
        .execute(&mut *conn)
        .await?;

        sqlx::query("INSERT INTO heartbeats (agent_id, last_activity) VALUES (?, ?)")
            .bind(agent.agent_id())
            .bind(format_time(agent.last_activity()))
            .execute(&mut *conn)
            .await?;
    }

    // focus task sorts before the queue
    let ordered = state
        .current_task()
        .map(|t| (-1_i64, t))
        .into_iter()
        .chain(state.task_queue().iter().enumerate().map(|(i, t)| (i as i64, t)));
    for (position, task) in ordered {
        sqlx::query(
            r#"
            INSERT INTO tasks (
                task_id, position, description, status, priority, assigned_agents,
                progress, created_at, started_at, completed_at, results,
                failure_reason, required_capabilities
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(task.id().to_string())
        .bind(position)
        .bind(task.description())
        .bind(task.status().as_str())
        .bind(task.priority().as_str())
        .bind(serde_json::to_string(task.assigned_agents())?)
        .bind(i64::from(task.progress()))
        .bind(format_time(task.created_at()))
        .bind(task.started_at().map(format_time))
        .bind(task.completed_at().map(format_time))
        .bind(serde_json::to_string(task.results())?)
        .bind(task.failure_reason())
        .bind(serde_json::to_string(task.required_capabilities())?)
        .execute(&mut *conn)
        .await?;
    }

    for inbox in state.inboxes().values() {
        for (seq, message) in inbox.messages().iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO messages (
                    message_id, seq, sender_id, recipient_id, subject, content,
                    priority, message_type, status, timestamp
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(message.id().to_string())
            .bind(seq as i64)
            .bind(message.sender_id())
            .bind(message.recipient_id())
            .bind(message.subject())
            .bind(message.content())
            .bind(message.priority().as_str())
            .bind(message.message_type().as_str())
            .bind(message.status().as_str())
            .bind(format_time(message.timestamp()))
            .execute(&mut *conn)
            .await?;
        }
    }

    Ok(())
}

fn task_from_row(row: &SqliteRow) -> CoordinatorResult<Task> {
    let progress: i64 = row.try_get("progress")?;
    Ok(Task::from_persistence(
        parse_uuid(&row.try_get::<String, _>("task_id")?)?,
        row.try_get("description")?,
        parse_enum(&row.try_get::<String, _>("status")?)?,
        parse_enum(&row.try_get::<String, _>("priority")?)?,
        serde_json::from_str::<BTreeSet<String>>(&row.try_get::<String, _>("assigned_agents")?)?,
        progress.clamp(0, 100) as u8,
        parse_time(&row.try_get::<String, _>("created_at")?)?,
        parse_optional_time(row.try_get("started_at")?)?,
        parse_optional_time(row.try_get("completed_at")?)?,
        serde_json::from_str::<BTreeMap<String, String>>(&row.try_get::<String, _>("results")?)?,
        row.try_get("failure_reason")?,
        serde_json::from_str::<BTreeSet<String>>(
            &row.try_get::<String, _>("required_capabilities")?,
        )?,
    ))
}

fn message_from_row(row: &SqliteRow) -> CoordinatorResult<Message> {
    Ok(Message::from_persistence(
        parse_uuid(&row.try_get::<String, _>("message_id")?)?,
        row.try_get("sender_id")?,
        row.try_get("recipient_id")?,
        row.try_get("subject")?,
        row.try_get("content")?,
        parse_enum(&row.try_get::<String, _>("priority")?)?,
        parse_enum(&row.try_get::<String, _>("message_type")?)?,
        parse_time(&row.try_get::<String, _>("timestamp")?)?,
        parse_enum(&row.try_get::<String, _>("status")?)?,
    ))
}

/// Extracts the file path from a SQLite URL, if it names a file
fn database_file(database_url: &str) -> Option<PathBuf> {
    if database_url.contains(":memory:") {
        return None;
    }
    let rest = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or(rest);
    if path.is_empty() {
        None
    } else {
        Some(PathBuf::from(path))
    }
}

fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_time(raw: &str) -> CoordinatorResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| CoordinatorError::persistence(format!("Invalid timestamp {}: {}", raw, e)))
}

fn parse_optional_time(raw: Option<String>) -> CoordinatorResult<Option<DateTime<Utc>>> {
    raw.as_deref().map(parse_time).transpose()
}

fn parse_uuid(raw: &str) -> CoordinatorResult<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|e| CoordinatorError::persistence(format!("Invalid id {}: {}", raw, e)))
}

fn parse_optional_uuid(raw: Option<String>) -> CoordinatorResult<Option<Uuid>> {
    raw.as_deref().map(parse_uuid).transpose()
}

fn parse_enum<T: FromStr<Err = String>>(raw: &str) -> CoordinatorResult<T> {
    raw.parse().map_err(CoordinatorError::Persistence)
}
