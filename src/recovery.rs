//! Operator recovery actions
//!
//! Both actions go through the manager like any other caller and can be
//! run repeatedly.

use std::collections::BTreeMap;

use crate::coordination::SharedStateManager;
use crate::domain::agent::AgentStatus;
use crate::domain::state::SystemStatus;
use crate::domain::task::{Task, TaskStatus};
use crate::errors::CoordinatorResult;

/// Result recorded for every agent of a force-completed task
pub const RECOVERED_RESULT: &str = "recovered";

/// Force-completes the focus task
///
/// Returns `None` when there is no focus task or it cannot be completed
/// (already finished, or never assigned). Finishing the focus promotes the
/// next assigned queued task, so repeated runs drain the backlog.
pub async fn complete_current_task(manager: &SharedStateManager) -> CoordinatorResult<Option<Task>> {
    let state = manager.snapshot().await?;
    let Some(task) = state.current_task() else {
        tracing::info!("No current task to complete");
        return Ok(None);
    };

    match task.status() {
        TaskStatus::Assigned | TaskStatus::InProgress => {}
        other => {
            tracing::info!(task_id = %task.id(), status = %other, "Current task not completable");
            return Ok(None);
        }
    }

    let results: BTreeMap<String, String> = task
        .assigned_agents()
        .iter()
        .map(|agent| (agent.clone(), RECOVERED_RESULT.to_string()))
        .collect();
    let completed = manager.complete_task(task.id(), results).await?;

    tracing::info!(task_id = %completed.id(), "Current task force-completed");
    Ok(Some(completed))
}

/// Returns busy or errored agents with no live task to idle
///
/// An agent is stuck when its current task is missing, finished, or it is
/// in error. The system status is set to idle afterwards.
pub async fn reset_stuck_agents(manager: &SharedStateManager) -> CoordinatorResult<Vec<String>> {
    let state = manager.snapshot().await?;

    let stuck: Vec<String> = state
        .agents()
        .values()
        .filter(|agent| match agent.status() {
            AgentStatus::Idle => false,
            AgentStatus::Error => true,
            AgentStatus::Busy => agent
                .current_task()
                .and_then(|id| state.task(id))
                .map_or(true, |task| task.status().is_terminal()),
        })
        .map(|agent| agent.agent_id().to_string())
        .collect();

    for agent_id in &stuck {
        manager
            .update_agent_status(agent_id, AgentStatus::Idle, None)
            .await?;
        tracing::info!(agent_id = %agent_id, "Stuck agent reset");
    }
    manager.set_system_status(SystemStatus::Idle).await?;

    Ok(stuck)
}
