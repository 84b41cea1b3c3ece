use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};
use tokio::sync::watch;
use uuid::Uuid;

use crate::config::PollConfig;
use crate::coordination::{PollScheduler, SharedStateManager};
use crate::domain::agent::AgentStatus;
use crate::domain::state::SystemStatus;
use crate::domain::task::Priority;
use crate::errors::{CoordinatorError, CoordinatorResult};
use crate::recovery;

#[derive(Parser, Debug)]
#[command(name = "agentctl")]
#[command(author, version, about = "Shared state and messaging for cooperating agents", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Register an agent (or refresh an existing registration)
    Register {
        agent_id: String,

        /// Capability tag, repeatable
        #[arg(short, long = "capability")]
        capabilities: Vec<String>,
    },

    /// Refresh an agent's liveness timestamp
    Heartbeat { agent_id: String },

    /// Set an agent's status
    AgentStatus {
        agent_id: String,

        #[arg(value_enum)]
        status: StatusArg,

        /// Error message (for status=error)
        #[arg(long)]
        message: Option<String>,
    },

    /// Create a task and make it the current task
    CreateTask {
        description: String,

        #[arg(long, value_enum, default_value = "normal")]
        priority: PriorityArg,

        /// Required capability tag, repeatable
        #[arg(short, long = "require")]
        requires: Vec<String>,
    },

    /// Append a pending task to the queue
    AddTask {
        description: String,

        #[arg(long, value_enum, default_value = "normal")]
        priority: PriorityArg,

        #[arg(short, long = "require")]
        requires: Vec<String>,
    },

    /// Assign a pending task to one or more idle agents
    Assign {
        task_id: Uuid,

        #[arg(required = true)]
        agents: Vec<String>,
    },

    /// Mark an assigned task as started
    Start { task_id: Uuid },

    /// Report task progress (0-100)
    Progress { task_id: Uuid, progress: u8 },

    /// Complete a task with one result per assigned agent
    Complete {
        task_id: Uuid,

        /// Result as AGENT=TEXT, repeatable
        #[arg(short, long = "result", value_parser = parse_result)]
        results: Vec<(String, String)>,
    },

    /// Fail (or cancel) a task
    Fail { task_id: Uuid, reason: String },

    /// Send a message to one agent
    Send {
        sender: String,
        recipient: String,
        content: String,

        #[arg(long)]
        subject: Option<String>,

        #[arg(long, value_enum, default_value = "normal")]
        priority: PriorityArg,
    },

    /// Send a message to every agent except the sender
    Broadcast {
        sender: String,
        content: String,

        #[arg(long)]
        subject: Option<String>,

        #[arg(long, value_enum, default_value = "normal")]
        priority: PriorityArg,
    },

    /// Show an agent's inbox
    Inbox {
        agent_id: String,

        /// Only unread messages
        #[arg(long)]
        unread: bool,
    },

    /// Mark a message read
    Read { agent_id: String, message_id: Uuid },

    /// Assign every pending task that idle agents can cover
    AutoAssign,

    /// Agent and task counts
    Stats,

    /// Message counts and classification stats
    MessagingStats,

    /// Override the overall system status
    SystemStatus {
        #[arg(value_enum)]
        status: SystemStatusArg,
    },

    /// Force-complete the current task with synthetic results
    CompleteCurrent,

    /// Reset agents stuck on finished or missing tasks
    ResetStuck,

    /// Poll an agent's inbox until interrupted
    Watch {
        agent_id: String,

        /// Mark printed messages read
        #[arg(long)]
        mark_read: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PriorityArg {
    Low,
    Normal,
    High,
    Urgent,
}

impl From<PriorityArg> for Priority {
    fn from(arg: PriorityArg) -> Self {
        match arg {
            PriorityArg::Low => Self::Low,
            PriorityArg::Normal => Self::Normal,
            PriorityArg::High => Self::High,
            PriorityArg::Urgent => Self::Urgent,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StatusArg {
    Idle,
    Busy,
    Error,
}

impl From<StatusArg> for AgentStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Idle => Self::Idle,
            StatusArg::Busy => Self::Busy,
            StatusArg::Error => Self::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SystemStatusArg {
    Idle,
    Busy,
    Degraded,
}

impl From<SystemStatusArg> for SystemStatus {
    fn from(arg: SystemStatusArg) -> Self {
        match arg {
            SystemStatusArg::Idle => Self::Idle,
            SystemStatusArg::Busy => Self::Busy,
            SystemStatusArg::Degraded => Self::Degraded,
        }
    }
}

fn parse_result(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((agent, text)) if !agent.trim().is_empty() => {
            Ok((agent.trim().to_string(), text.to_string()))
        }
        _ => Err(format!("expected AGENT=TEXT, got '{}'", raw)),
    }
}

/// Runs one command and returns its JSON output
pub async fn execute(
    command: Commands,
    manager: Arc<SharedStateManager>,
    poll: &PollConfig,
) -> CoordinatorResult<Value> {
    let value = match command {
        Commands::Register {
            agent_id,
            capabilities,
        } => to_json(
            &manager
                .register_agent(&agent_id, capabilities.into_iter().collect())
                .await?,
        )?,
        Commands::Heartbeat { agent_id } => {
            manager.heartbeat(&agent_id).await?;
            let active = manager.is_agent_active(&agent_id).await?;
            json!({ "agent_id": agent_id, "active": active })
        }
        Commands::AgentStatus {
            agent_id,
            status,
            message,
        } => to_json(
            &manager
                .update_agent_status(&agent_id, status.into(), message)
                .await?,
        )?,
        Commands::CreateTask {
            description,
            priority,
            requires,
        } => to_json(
            &manager
                .create_task(&description, priority.into(), requires.into_iter().collect())
                .await?,
        )?,
        Commands::AddTask {
            description,
            priority,
            requires,
        } => to_json(
            &manager
                .add_task(&description, priority.into(), requires.into_iter().collect())
                .await?,
        )?,
        Commands::Assign { task_id, agents } => to_json(
            &manager
                .assign_task(task_id, agents.into_iter().collect::<BTreeSet<_>>())
                .await?,
        )?,
        Commands::Start { task_id } => to_json(&manager.start_task(task_id).await?)?,
        Commands::Progress { task_id, progress } => {
            to_json(&manager.update_task_progress(task_id, progress).await?)?
        }
        Commands::Complete { task_id, results } => to_json(
            &manager
                .complete_task(task_id, results.into_iter().collect::<BTreeMap<_, _>>())
                .await?,
        )?,
        Commands::Fail { task_id, reason } => to_json(&manager.fail_task(task_id, &reason).await?)?,
        Commands::Send {
            sender,
            recipient,
            content,
            subject,
            priority,
        } => {
            let id = manager
                .send_agent_message(&sender, &recipient, &content, subject, priority.into())
                .await?;
            json!({ "message_id": id })
        }
        Commands::Broadcast {
            sender,
            content,
            subject,
            priority,
        } => {
            let ids = manager
                .broadcast_agent_message(&sender, &content, subject, priority.into())
                .await?;
            json!({ "message_ids": ids })
        }
        Commands::Inbox { agent_id, unread } => {
            let inbox = manager.get_agent_inbox(&agent_id).await?;
            let messages: Vec<_> = if unread {
                inbox.unread().collect()
            } else {
                inbox.messages().iter().collect()
            };
            json!({
                "agent_id": agent_id,
                "unread_count": inbox.unread_count(),
                "messages": to_json(&messages)?,
            })
        }
        Commands::Read {
            agent_id,
            message_id,
        } => {
            let changed = manager
                .mark_agent_message_read(&agent_id, message_id)
                .await?;
            json!({ "message_id": message_id, "changed": changed })
        }
        Commands::AutoAssign => to_json(&manager.auto_assign_pending().await?)?,
        Commands::Stats => to_json(&manager.get_system_stats().await?)?,
        Commands::MessagingStats => json!({
            "messaging": to_json(&manager.get_messaging_stats().await?)?,
            "classification": to_json(&manager.get_classification_stats())?,
        }),
        Commands::SystemStatus { status } => {
            let status: SystemStatus = status.into();
            manager.set_system_status(status).await?;
            json!({ "system_status": status })
        }
        Commands::CompleteCurrent => to_json(&recovery::complete_current_task(&manager).await?)?,
        Commands::ResetStuck => {
            json!({ "reset": recovery::reset_stuck_agents(&manager).await? })
        }
        Commands::Watch {
            agent_id,
            mark_read,
        } => {
            watch_inbox(manager, &agent_id, mark_read, poll).await?;
            Value::Null
        }
    };
    Ok(value)
}

fn to_json<T: serde::Serialize>(value: &T) -> CoordinatorResult<Value> {
    Ok(serde_json::to_value(value)?)
}

/// Heartbeats and prints new inbox messages on every poll tick
async fn watch_inbox(
    manager: Arc<SharedStateManager>,
    agent_id: &str,
    mark_read: bool,
    poll: &PollConfig,
) -> CoordinatorResult<()> {
    // fail fast on an unknown agent
    manager.get_agent_inbox(agent_id).await?;

    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = tx.send(true);
        }
    });

    let seen: Arc<Mutex<BTreeSet<Uuid>>> = Arc::new(Mutex::new(BTreeSet::new()));
    let scheduler = PollScheduler::from_config(poll);
    tracing::info!(agent_id = %agent_id, interval_secs = poll.interval.as_secs(), "Watching inbox");

    scheduler
        .run(rx, || {
            let manager = manager.clone();
            let seen = seen.clone();
            let agent_id = agent_id.to_string();
            async move {
                manager.heartbeat(&agent_id).await?;
                let inbox = manager.get_agent_inbox(&agent_id).await?;

                let fresh: Vec<_> = {
                    let mut seen = seen
                        .lock()
                        .map_err(|_| CoordinatorError::persistence("watch state poisoned"))?;
                    inbox
                        .unread()
                        .filter(|m| seen.insert(m.id()))
                        .cloned()
                        .collect()
                };

                for message in fresh {
                    println!("{}", serde_json::to_string(&message)?);
                    if mark_read {
                        manager.mark_agent_message_read(&agent_id, message.id()).await?;
                    }
                }
                Ok(())
            }
        })
        .await;

    Ok(())
}
