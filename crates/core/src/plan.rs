//! Conversion plan and task definitions.
//!
//! A [`ConversionPlan`] is a directed acyclic graph of [`ConversionTask`]s
//! describing one source-to-target stack conversion. Plans are produced by
//! the (external) analysis capability, checked by [`crate::validator`], and
//! never mutated afterwards; all runtime state lives on the job.

use serde::{Deserialize, Serialize};

use crate::types::TaskId;

/// The kind of work a single conversion task performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Inspect source files and summarize structure for later tasks.
    Analysis,
    /// Generate target-stack code from source excerpts.
    CodeGeneration,
    /// Rewrite dependency manifests for the target stack.
    DependencyUpdate,
    /// Translate build/runtime configuration files.
    ConfigUpdate,
    /// Check generated output for consistency.
    Validation,
    /// Wire converted pieces together.
    Integration,
}

/// Runtime status of a single task within a job.
///
/// `Skipped` is assigned to tasks whose dependencies failed; they are never
/// dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl TaskStatus {
    /// Completed, Failed, and Skipped are terminal; a terminal task is
    /// never dispatched again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Skipped
        )
    }
}

/// One unit of conversion work.
///
/// `priority` breaks ties among simultaneously-ready tasks: a lower value
/// dispatches first. `estimated_secs` is a progress-weighting hint only,
/// never a deadline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionTask {
    /// Unique within the owning plan.
    pub id: TaskId,
    pub kind: TaskKind,
    pub description: String,
    /// Glob patterns selecting the source files this task reads.
    #[serde(default)]
    pub input_patterns: Vec<String>,
    /// Glob patterns describing the files this task produces.
    #[serde(default)]
    pub output_patterns: Vec<String>,
    /// Ids of tasks that must reach a terminal state before this one runs.
    #[serde(default)]
    pub depends_on: Vec<TaskId>,
    /// Dispatch tie-break among ready tasks. Lower value runs first.
    #[serde(default)]
    pub priority: i32,
    /// Positive duration estimate used for progress weighting.
    pub estimated_secs: f64,
    /// Free-form context handed to the conversion service.
    #[serde(default = "empty_object")]
    pub context: serde_json::Value,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

/// Coarse classification of how involved a conversion is expected to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanComplexity {
    Low,
    Moderate,
    High,
    Severe,
}

/// An immutable-once-validated DAG of conversion tasks plus plan-level
/// metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionPlan {
    pub id: uuid::Uuid,
    /// Detected stack of the source project (e.g. `"express/javascript"`).
    pub source_stack: String,
    /// Stack the project is being rewritten into.
    pub target_stack: String,
    pub tasks: Vec<ConversionTask>,
    pub complexity: PlanComplexity,
    /// Whether the analysis capability considers the conversion feasible.
    pub feasible: bool,
    /// Non-fatal warnings raised during plan construction.
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl ConversionPlan {
    /// Sum of all task duration estimates.
    pub fn estimated_total_secs(&self) -> f64 {
        self.tasks.iter().map(|t| t.estimated_secs).sum()
    }

    /// Look up a task by id.
    pub fn task(&self, id: &str) -> Option<&ConversionTask> {
        self.tasks.iter().find(|t| t.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, secs: f64) -> ConversionTask {
        ConversionTask {
            id: id.into(),
            kind: TaskKind::CodeGeneration,
            description: format!("convert {id}"),
            input_patterns: vec![],
            output_patterns: vec![],
            depends_on: vec![],
            priority: 0,
            estimated_secs: secs,
            context: serde_json::json!({}),
        }
    }

    #[test]
    fn total_duration_sums_task_estimates() {
        let plan = ConversionPlan {
            id: uuid::Uuid::nil(),
            source_stack: "express/javascript".into(),
            target_stack: "axum/rust".into(),
            tasks: vec![task("a", 10.0), task("b", 20.0), task("c", 5.0)],
            complexity: PlanComplexity::Moderate,
            feasible: true,
            warnings: vec![],
        };
        assert_eq!(plan.estimated_total_secs(), 35.0);
    }

    #[test]
    fn task_lookup_by_id() {
        let plan = ConversionPlan {
            id: uuid::Uuid::nil(),
            source_stack: "s".into(),
            target_stack: "t".into(),
            tasks: vec![task("a", 1.0)],
            complexity: PlanComplexity::Low,
            feasible: true,
            warnings: vec![],
        };
        assert!(plan.task("a").is_some());
        assert!(plan.task("missing").is_none());
    }

    #[test]
    fn task_kind_serializes_snake_case() {
        let json = serde_json::to_string(&TaskKind::DependencyUpdate).unwrap();
        assert_eq!(json, "\"dependency_update\"");
    }

    #[test]
    fn terminal_task_statuses() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Skipped.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
    }
}
