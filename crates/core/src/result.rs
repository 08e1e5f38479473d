//! Task execution outcomes.

use serde::{Deserialize, Serialize};

use crate::plan::TaskStatus;
use crate::types::TaskId;

/// How a produced file relates to the source tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
}

/// One file produced (or removed) by a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub change: ChangeKind,
    /// Content before the change, when the service provides it (updates
    /// and deletes).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
    /// Content after the change (creates and updates).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
}

/// Classification of a task failure. Transient kinds are eligible for
/// retry with backoff; permanent kinds fail the task immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskErrorKind {
    /// The per-task timeout elapsed before the service answered.
    Timeout,
    /// The conversion service rejected the call with a rate limit.
    RateLimited,
    /// The conversion service was unreachable or returned a server error.
    Unavailable,
    /// The request could not be transported (DNS, TLS, connection reset).
    Network,
    /// The service answered with output the engine cannot use.
    MalformedOutput,
    /// The task input itself is unusable; retrying cannot help.
    InvalidInput,
}

impl TaskErrorKind {
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            TaskErrorKind::Timeout
                | TaskErrorKind::RateLimited
                | TaskErrorKind::Unavailable
                | TaskErrorKind::Network
        )
    }
}

/// A classified task failure with a human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskError {
    pub kind: TaskErrorKind,
    pub message: String,
}

impl TaskError {
    pub fn new(kind: TaskErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for TaskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Outcome of one executed (or skipped) task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: TaskId,
    pub status: TaskStatus,
    #[serde(default)]
    pub files: Vec<FileChange>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    /// Number of execution attempts, including the successful or final
    /// failed one. Zero for skipped tasks.
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
}

impl TaskResult {
    /// Result for a task that was never dispatched because a dependency
    /// failed or was itself skipped.
    pub fn skipped(task_id: impl Into<TaskId>, dependency: &str) -> Self {
        Self {
            task_id: task_id.into(),
            status: TaskStatus::Skipped,
            files: vec![],
            warnings: vec![format!("skipped: dependency \"{dependency}\" did not complete")],
            suggestions: vec![],
            attempts: 0,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_kinds() {
        assert!(TaskErrorKind::Timeout.is_transient());
        assert!(TaskErrorKind::RateLimited.is_transient());
        assert!(TaskErrorKind::Unavailable.is_transient());
        assert!(TaskErrorKind::Network.is_transient());
    }

    #[test]
    fn permanent_kinds() {
        assert!(!TaskErrorKind::MalformedOutput.is_transient());
        assert!(!TaskErrorKind::InvalidInput.is_transient());
    }

    #[test]
    fn skipped_result_names_the_dependency() {
        let result = TaskResult::skipped("t2", "t1");
        assert_eq!(result.status, TaskStatus::Skipped);
        assert_eq!(result.attempts, 0);
        assert!(result.warnings[0].contains("t1"));
    }
}
