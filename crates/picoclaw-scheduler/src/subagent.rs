use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use picoclaw_core::types::ChannelOrigin;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Lifecycle of an in-flight subagent task (spec.md §4.6 state machine:
/// running -> completed|failed, terminal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubagentStatus {
    Running,
    Completed,
    Failed,
}

/// spec.md §3 "Subagent task": in-memory record of a nested tool-call loop.
/// Destroyed on process exit — no persistence by design, unlike
/// [`crate::store::JobStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubagentTask {
    pub id: String,
    pub task_prompt: String,
    pub label: String,
    pub agent_type: String,
    pub origin: ChannelOrigin,
    pub status: SubagentStatus,
    pub result_text: Option<String>,
    pub iterations: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl SubagentTask {
    fn new(task_prompt: String, label: String, agent_type: String, origin: ChannelOrigin) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            task_prompt,
            label,
            agent_type,
            origin,
            status: SubagentStatus::Running,
            result_text: None,
            iterations: 0,
            started_at: Utc::now(),
            finished_at: None,
        }
    }
}

/// Outcome a spawned subagent loop reports back to the manager.
pub struct SubagentOutcome {
    pub result_text: String,
    pub iterations: usize,
    pub failed: bool,
}

/// Spawner for isolated nested tool-call loops (spec.md §4.6 "Subagent
/// manager"). The task table is a `DashMap` guarded internally per entry,
/// matching the teacher's `AppState::active_operations: DashMap<String,
/// CancellationToken>` sharding rather than one coarse lock.
///
/// Subagents are rooted at the scheduler's cancellation scope, not the
/// request that spawned them (spec.md §5): they outlive the parent loop and
/// publish their outcome on the bus instead of being awaited by the caller.
pub struct SubagentManager {
    tasks: DashMap<String, SubagentTask>,
    root_cancel: CancellationToken,
}

impl SubagentManager {
    pub fn new(root_cancel: CancellationToken) -> Self {
        Self {
            tasks: DashMap::new(),
            root_cancel,
        }
    }

    /// Register a new subagent task and hand back its id plus a derived
    /// cancellation token (rooted at the manager's scope) and an updater
    /// closure the caller's background task uses to report completion.
    ///
    /// `run` is spawned on the Tokio runtime immediately; this call returns
    /// without waiting for it, matching the "caller returns immediately"
    /// contract of an async [`picoclaw_skills::ToolResult`].
    pub fn spawn<F, Fut>(
        self: &Arc<Self>,
        task_prompt: impl Into<String>,
        label: impl Into<String>,
        agent_type: impl Into<String>,
        origin: ChannelOrigin,
        run: F,
    ) -> String
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = SubagentOutcome> + Send + 'static,
    {
        let task = SubagentTask::new(task_prompt.into(), label.into(), agent_type.into(), origin);
        let id = task.id.clone();
        self.tasks.insert(id.clone(), task);

        let manager = Arc::clone(self);
        let cancel = self.root_cancel.child_token();
        let spawn_id = id.clone();

        tokio::spawn(async move {
            info!(subagent_id = %spawn_id, "subagent started");
            let outcome = run(cancel).await;
            manager.finish(&spawn_id, outcome);
        });

        id
    }

    fn finish(&self, id: &str, outcome: SubagentOutcome) {
        if let Some(mut entry) = self.tasks.get_mut(id) {
            entry.status = if outcome.failed {
                SubagentStatus::Failed
            } else {
                SubagentStatus::Completed
            };
            entry.result_text = Some(outcome.result_text);
            entry.iterations = outcome.iterations;
            entry.finished_at = Some(Utc::now());
            debug!(subagent_id = %id, status = ?entry.status, "subagent finished");
        } else {
            warn!(subagent_id = %id, "subagent finished but its task row is gone");
        }
    }

    pub fn get(&self, id: &str) -> Option<SubagentTask> {
        self.tasks.get(id).map(|e| e.value().clone())
    }

    pub fn list(&self) -> Vec<SubagentTask> {
        self.tasks.iter().map(|e| e.value().clone()).collect()
    }

    pub fn running_count(&self) -> usize {
        self.tasks.iter().filter(|e| e.status == SubagentStatus::Running).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawn_registers_running_task_then_completes() {
        let manager = Arc::new(SubagentManager::new(CancellationToken::new()));
        let id = manager.spawn(
            "research the weather",
            "weather-check",
            "research",
            ChannelOrigin::internal(),
            |_cancel| async {
                SubagentOutcome {
                    result_text: "sunny".to_string(),
                    iterations: 2,
                    failed: false,
                }
            },
        );

        // Poll briefly for the spawned task to land — deterministic enough
        // for a unit test since the future above has no await points.
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let task = manager.get(&id).unwrap();
        assert_eq!(task.status, SubagentStatus::Completed);
        assert_eq!(task.result_text.as_deref(), Some("sunny"));
        assert_eq!(task.iterations, 2);
    }

    #[tokio::test]
    async fn failed_outcome_marks_task_failed() {
        let manager = Arc::new(SubagentManager::new(CancellationToken::new()));
        let id = manager.spawn(
            "task",
            "label",
            "general",
            ChannelOrigin::internal(),
            |_cancel| async {
                SubagentOutcome {
                    result_text: "boom".to_string(),
                    iterations: 1,
                    failed: true,
                }
            },
        );
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(manager.get(&id).unwrap().status, SubagentStatus::Failed);
    }

    #[test]
    fn unknown_id_returns_none() {
        let manager = SubagentManager::new(CancellationToken::new());
        assert!(manager.get("nope").is_none());
    }
}
