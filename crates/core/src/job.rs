//! Conversion job model and status state machine.
//!
//! A job binds one validated plan to one project and carries all runtime
//! state: status, progress, per-task statuses, and accumulated results.
//! The engine's job manager is the only writer of this state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::plan::{ConversionPlan, TaskStatus};
use crate::result::TaskResult;
use crate::types::{JobId, ProjectId, TaskId, Timestamp};

/// Lifecycle status of a conversion job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Completed and Cancelled admit no further transitions; Failed may
    /// be restarted explicitly.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Paused => "paused",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Job status state machine.
///
/// Failed -> Running models an explicit user retry of a failed job; the
/// other terminal states admit nothing.
pub mod state_machine {
    use super::JobStatus;

    /// Returns the set of valid target statuses reachable from `from`.
    ///
    /// Cancel applies to running and paused jobs only; a pending job that
    /// should never run is deleted, not cancelled.
    pub fn valid_transitions(from: JobStatus) -> &'static [JobStatus] {
        match from {
            JobStatus::Pending => &[JobStatus::Running],
            JobStatus::Running => &[
                JobStatus::Paused,
                JobStatus::Completed,
                JobStatus::Failed,
                JobStatus::Cancelled,
            ],
            JobStatus::Paused => &[JobStatus::Running, JobStatus::Cancelled],
            JobStatus::Failed => &[JobStatus::Running],
            JobStatus::Completed | JobStatus::Cancelled => &[],
        }
    }

    /// Check whether a transition from `from` to `to` is valid.
    pub fn can_transition(from: JobStatus, to: JobStatus) -> bool {
        valid_transitions(from).contains(&to)
    }
}

/// A runtime instance of executing one plan against one project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionJob {
    pub id: JobId,
    pub project_id: ProjectId,
    pub plan: ConversionPlan,
    pub status: JobStatus,
    /// 0..=100. Monotonically non-decreasing while the job is running.
    pub progress: u8,
    /// Human-readable label of what the job is currently doing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_activity: Option<String>,
    /// Runtime status of every task in the plan, keyed by task id.
    pub task_statuses: BTreeMap<TaskId, TaskStatus>,
    /// Results of executed and skipped tasks, in completion order.
    #[serde(default)]
    pub results: Vec<TaskResult>,
    /// First unrecoverable failure, once the job has failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Timestamp>,
}

impl ConversionJob {
    /// Create a pending job for a plan. Every task starts Pending.
    pub fn new(project_id: ProjectId, plan: ConversionPlan) -> Self {
        let task_statuses = plan
            .tasks
            .iter()
            .map(|t| (t.id.clone(), TaskStatus::Pending))
            .collect();

        Self {
            id: uuid::Uuid::now_v7(),
            project_id,
            plan,
            status: JobStatus::Pending,
            progress: 0,
            current_activity: None,
            task_statuses,
            results: Vec::new(),
            error_message: None,
            created_at: chrono::Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Status of a single task. Unknown ids report Pending; the validator
    /// guarantees the engine never asks for one.
    pub fn task_status(&self, task_id: &str) -> TaskStatus {
        self.task_statuses
            .get(task_id)
            .copied()
            .unwrap_or(TaskStatus::Pending)
    }

    /// True when no task is Pending or Running.
    pub fn all_tasks_settled(&self) -> bool {
        self.task_statuses.values().all(|s| s.is_terminal())
    }

    /// True when at least one task ended Failed.
    pub fn any_task_failed(&self) -> bool {
        self.task_statuses
            .values()
            .any(|s| *s == TaskStatus::Failed)
    }
}
