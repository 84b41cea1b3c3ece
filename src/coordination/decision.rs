use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::domain::agent::{Agent, AgentStatus};
use crate::domain::state::SystemState;
use crate::domain::task::Task;

/// Exhaustive search stops being tried above this many candidates
const EXHAUSTIVE_LIMIT: usize = 16;

/// Capability-based agent selection
///
/// Picks the smallest set of idle agents whose combined capabilities cover
/// the task's requirements. Among equally small sets the lexically first
/// one (by agent id) wins.
#[derive(Debug, Default)]
pub struct DecisionEngine {
    unmatched: AtomicU64,
}

impl DecisionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tags a task needs covered
    ///
    /// Declared requirements win. Otherwise every capability known to the
    /// state that appears as a word of the description counts.
    pub fn required_tags(&self, task: &Task, state: &SystemState) -> BTreeSet<String> {
        if !task.required_capabilities().is_empty() {
            return task.required_capabilities().clone();
        }

        let words: BTreeSet<String> = task
            .description()
            .split(|c: char| !(c.is_alphanumeric() || c == '-' || c == '_'))
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect();

        state
            .agents()
            .values()
            .flat_map(|agent| agent.capabilities().iter())
            .filter(|tag| words.contains(&tag.to_lowercase()))
            .cloned()
            .collect()
    }

    /// Chooses agents for `task`; an empty set means nobody fits
    pub fn select_agents(&self, task: &Task, state: &SystemState) -> BTreeSet<String> {
        let idle: Vec<&Agent> = state
            .agents()
            .values()
            .filter(|agent| agent.status() == AgentStatus::Idle)
            .collect();

        let required = self.required_tags(task, state);
        if required.is_empty() {
            return match idle.first() {
                Some(agent) => BTreeSet::from([agent.agent_id().to_string()]),
                None => self.unmatched(task),
            };
        }

        let candidates: Vec<&Agent> = idle
            .into_iter()
            .filter(|agent| required.iter().any(|tag| agent.can_cover(tag)))
            .collect();

        let coverable = required
            .iter()
            .all(|tag| candidates.iter().any(|agent| agent.can_cover(tag)));
        if !coverable {
            return self.unmatched(task);
        }

        let chosen = if candidates.len() <= EXHAUSTIVE_LIMIT {
            minimal_cover(&candidates, &required)
        } else {
            greedy_cover(&candidates, &required)
        };

        match chosen {
            Some(ids) => {
                tracing::debug!(
                    task_id = %task.id(),
                    agents = ?ids,
                    "Agents selected"
                );
                ids
            }
            None => self.unmatched(task),
        }
    }

    /// Tasks that found no covering agent set since start
    pub fn unmatched_count(&self) -> u64 {
        self.unmatched.load(Ordering::Relaxed)
    }

    /// Adds `count` unstaffed tasks from a stored assignment pass
    pub fn record_unmatched(&self, count: usize) {
        self.unmatched.fetch_add(count as u64, Ordering::Relaxed);
    }

    fn unmatched(&self, task: &Task) -> BTreeSet<String> {
        tracing::debug!(task_id = %task.id(), "No agent set covers task");
        BTreeSet::new()
    }
}

fn covers(agents: &[&Agent], required: &BTreeSet<String>) -> bool {
    required
        .iter()
        .all(|tag| agents.iter().any(|agent| agent.can_cover(tag)))
}

fn ids(agents: &[&Agent]) -> BTreeSet<String> {
    agents.iter().map(|a| a.agent_id().to_string()).collect()
}

/// Tries subsets by increasing size in lexical combination order
fn minimal_cover(candidates: &[&Agent], required: &BTreeSet<String>) -> Option<BTreeSet<String>> {
    let n = candidates.len();
    for size in 1..=n {
        let mut indices: Vec<usize> = (0..size).collect();
        loop {
            let subset: Vec<&Agent> = indices.iter().map(|&i| candidates[i]).collect();
            if covers(&subset, required) {
                return Some(ids(&subset));
            }

            // advance to the next combination
            let mut i = size;
            while i > 0 && indices[i - 1] == n - size + i - 1 {
                i -= 1;
            }
            if i == 0 {
                break;
            }
            indices[i - 1] += 1;
            for j in i..size {
                indices[j] = indices[j - 1] + 1;
            }
        }
    }
    None
}

fn greedy_cover(candidates: &[&Agent], required: &BTreeSet<String>) -> Option<BTreeSet<String>> {
    let mut uncovered = required.clone();
    let mut chosen: Vec<&Agent> = Vec::new();

    while !uncovered.is_empty() {
        let mut best: Option<(&Agent, usize)> = None;
        for agent in candidates {
            if chosen.iter().any(|c| c.agent_id() == agent.agent_id()) {
                continue;
            }
            let gain = uncovered.iter().filter(|tag| agent.can_cover(tag)).count();
            if gain > best.map_or(0, |(_, g)| g) {
                best = Some((agent, gain));
            }
        }

        let (agent, _) = best?;
        uncovered.retain(|tag| !agent.can_cover(tag));
        chosen.push(agent);
    }

    Some(ids(&chosen))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::task::Priority;
    use uuid::Uuid;

    fn tags(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn state_with(agents: &[(&str, &[&str])]) -> SystemState {
        let mut state = SystemState::new();
        for (id, caps) in agents {
            state
                .agents
                .insert(id.to_string(), Agent::new(*id, tags(caps)));
        }
        state
    }

    fn task(description: &str, required: &[&str]) -> Task {
        Task::new(description.to_string(), Priority::Normal, tags(required))
            .unwrap()
            .0
    }

    #[test]
    fn single_agent_covering_everything_wins() {
        let state = state_with(&[
            ("alpha", &["rust"]),
            ("beta", &["sql"]),
            ("gamma", &["rust", "sql"]),
        ]);
        let engine = DecisionEngine::new();

        let chosen = engine.select_agents(&task("migrate", &["rust", "sql"]), &state);
        assert_eq!(chosen, tags(&["gamma"]));
    }

    #[test]
    fn pair_is_chosen_when_no_single_agent_covers() {
        let state = state_with(&[
            ("alpha", &["rust"]),
            ("beta", &["sql"]),
            ("delta", &["rust"]),
        ]);
        let engine = DecisionEngine::new();

        let chosen = engine.select_agents(&task("migrate", &["rust", "sql"]), &state);
        assert_eq!(chosen, tags(&["alpha", "beta"]));
    }

    #[test]
    fn ties_break_by_lexical_agent_id() {
        let state = state_with(&[("zeta", &["docs"]), ("eta", &["docs"])]);
        let engine = DecisionEngine::new();

        let chosen = engine.select_agents(&task("write", &["docs"]), &state);
        assert_eq!(chosen, tags(&["eta"]));
    }

    #[test]
    fn busy_agents_are_skipped() {
        let mut state = state_with(&[("alpha", &["rust"]), ("beta", &["rust"])]);
        state
            .agent_mut("alpha")
            .unwrap()
            .begin_task(Uuid::new_v4())
            .unwrap();
        let engine = DecisionEngine::new();

        let chosen = engine.select_agents(&task("build", &["rust"]), &state);
        assert_eq!(chosen, tags(&["beta"]));
    }

    #[test]
    fn requirements_are_derived_from_description() {
        let state = state_with(&[("front", &["react"]), ("back", &["postgres"])]);
        let engine = DecisionEngine::new();
        let t = task("Add a Postgres index for the search page", &[]);

        assert_eq!(engine.required_tags(&t, &state), tags(&["postgres"]));
        assert_eq!(engine.select_agents(&t, &state), tags(&["back"]));
    }

    #[test]
    fn no_requirements_picks_first_idle_agent() {
        let state = state_with(&[("b", &[]), ("a", &[])]);
        let engine = DecisionEngine::new();

        let chosen = engine.select_agents(&task("anything", &[]), &state);
        assert_eq!(chosen, tags(&["a"]));
    }

    #[test]
    fn uncoverable_task_yields_empty_set() {
        let state = state_with(&[("alpha", &["rust"])]);
        let engine = DecisionEngine::new();

        let chosen = engine.select_agents(&task("design", &["figma"]), &state);
        assert!(chosen.is_empty());
        assert_eq!(engine.unmatched_count(), 0, "selection alone records nothing");

        engine.record_unmatched(1);
        assert_eq!(engine.unmatched_count(), 1);
    }

    #[test]
    fn greedy_cover_handles_large_pools() {
        let mut pool: Vec<(String, Vec<&str>)> = (0..20)
            .map(|i| (format!("agent-{:02}", i), vec!["rust"]))
            .collect();
        pool.push(("agent-99".to_string(), vec!["rust", "sql"]));

        let mut state = SystemState::new();
        for (id, caps) in &pool {
            state
                .agents
                .insert(id.clone(), Agent::new(id.clone(), tags(caps)));
        }
        let engine = DecisionEngine::new();

        let chosen = engine.select_agents(&task("migrate", &["rust", "sql"]), &state);
        assert_eq!(chosen, tags(&["agent-99"]));
    }
}
