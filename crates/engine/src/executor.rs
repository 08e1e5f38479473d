//! Single-attempt task execution against the conversion service.
//!
//! The executor owns exactly one concern: turn a task plus its
//! accumulated context into one conversion service call, bounded by a
//! timeout, and map the outcome into a [`TaskResult`]. It never touches
//! job state and never retries; retry policy belongs to the scheduler.

use std::sync::Arc;
use std::time::Duration;

use restack_convert::{ConvertRequest, ConvertResponse, ConvertService};
use restack_core::plan::{ConversionPlan, ConversionTask, TaskStatus};
use restack_core::result::{FileChange, TaskError, TaskErrorKind, TaskResult};

/// Conversion responses below this confidence get a warning attached.
const LOW_CONFIDENCE_THRESHOLD: f64 = 0.5;

/// Executes one task attempt with an enforced timeout.
pub struct TaskExecutor {
    service: Arc<dyn ConvertService>,
    timeout: Duration,
}

impl TaskExecutor {
    pub fn new(service: Arc<dyn ConvertService>, timeout: Duration) -> Self {
        Self { service, timeout }
    }

    /// Run one attempt of `task` and return its result.
    ///
    /// The timeout is enforced here, independent of whatever the service
    /// client does internally; an elapsed timeout is a transient failure.
    /// `attempts` is recorded verbatim on the result so the scheduler's
    /// retry loop can thread the attempt count through.
    pub async fn execute(
        &self,
        plan: &ConversionPlan,
        task: &ConversionTask,
        context: serde_json::Value,
        attempts: u32,
    ) -> TaskResult {
        let request = ConvertRequest {
            task_kind: task.kind,
            description: task.description.clone(),
            source_stack: plan.source_stack.clone(),
            target_stack: plan.target_stack.clone(),
            input_patterns: task.input_patterns.clone(),
            context,
        };

        let outcome = tokio::time::timeout(self.timeout, self.service.convert(&request)).await;

        match outcome {
            Ok(Ok(response)) => success_result(task, response, attempts),
            Ok(Err(e)) => {
                let error = TaskError::new(e.task_error_kind(), e.to_string());
                failure_result(task, error, attempts)
            }
            Err(_) => {
                let error = TaskError::new(
                    TaskErrorKind::Timeout,
                    format!(
                        "conversion did not finish within {}s",
                        self.timeout.as_secs()
                    ),
                );
                failure_result(task, error, attempts)
            }
        }
    }
}

fn success_result(task: &ConversionTask, response: ConvertResponse, attempts: u32) -> TaskResult {
    let files = response
        .files
        .into_iter()
        .map(|f| FileChange {
            path: f.path,
            change: f.change,
            before: f.previous,
            after: f.content,
        })
        .collect();

    let mut warnings = response.warnings;
    if response.confidence < LOW_CONFIDENCE_THRESHOLD {
        warnings.push(format!(
            "low conversion confidence: {:.2}",
            response.confidence
        ));
    }

    TaskResult {
        task_id: task.id.clone(),
        status: TaskStatus::Completed,
        files,
        warnings,
        suggestions: response.suggestions,
        attempts,
        error: None,
    }
}

fn failure_result(task: &ConversionTask, error: TaskError, attempts: u32) -> TaskResult {
    TaskResult {
        task_id: task.id.clone(),
        status: TaskStatus::Failed,
        files: vec![],
        warnings: vec![],
        suggestions: vec![],
        attempts,
        error: Some(error),
    }
}
