//! Duration-weighted job progress aggregation.

use std::collections::BTreeMap;

use crate::plan::{ConversionTask, TaskStatus};
use crate::types::TaskId;

/// Compute job progress as `round(100 * credited / total)` where task
/// durations are the weights.
///
/// While the job is running only Completed tasks are credited. Once the
/// job has reached a terminal state (`job_finished`), Failed and Skipped
/// tasks are credited too: a failed job with no remaining work reports
/// 100, which is what the progress bar should show when nothing further
/// will happen.
pub fn job_progress(
    tasks: &[ConversionTask],
    statuses: &BTreeMap<TaskId, TaskStatus>,
    job_finished: bool,
) -> u8 {
    let total: f64 = tasks.iter().map(|t| t.estimated_secs).sum();
    if total <= 0.0 {
        return if job_finished { 100 } else { 0 };
    }

    let credited: f64 = tasks
        .iter()
        .filter(|t| {
            let status = statuses
                .get(&t.id)
                .copied()
                .unwrap_or(TaskStatus::Pending);
            match status {
                TaskStatus::Completed => true,
                TaskStatus::Failed | TaskStatus::Skipped => job_finished,
                TaskStatus::Pending | TaskStatus::Running => false,
            }
        })
        .map(|t| t.estimated_secs)
        .sum();

    ((100.0 * credited / total).round() as u8).min(100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::TaskKind;

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

    fn statuses(pairs: &[(&str, TaskStatus)]) -> BTreeMap<TaskId, TaskStatus> {
        pairs
            .iter()
            .map(|(id, s)| (id.to_string(), *s))
            .collect()
    }

    #[test]
    fn no_completed_tasks_is_zero() {
        let tasks = vec![task("a", 10.0), task("b", 10.0)];
        let s = statuses(&[("a", TaskStatus::Pending), ("b", TaskStatus::Running)]);
        assert_eq!(job_progress(&tasks, &s, false), 0);
    }

    #[test]
    fn half_by_duration_weight() {
        let tasks = vec![task("a", 30.0), task("b", 10.0)];
        let s = statuses(&[("a", TaskStatus::Completed), ("b", TaskStatus::Pending)]);
        assert_eq!(job_progress(&tasks, &s, false), 75);
    }

    #[test]
    fn failed_task_not_credited_while_running() {
        let tasks = vec![task("a", 10.0), task("b", 10.0)];
        let s = statuses(&[("a", TaskStatus::Failed), ("b", TaskStatus::Completed)]);
        assert_eq!(job_progress(&tasks, &s, false), 50);
    }

    #[test]
    fn failed_and_skipped_credited_once_finished() {
        let tasks = vec![task("a", 10.0), task("b", 10.0), task("c", 20.0)];
        let s = statuses(&[
            ("a", TaskStatus::Failed),
            ("b", TaskStatus::Skipped),
            ("c", TaskStatus::Completed),
        ]);
        assert_eq!(job_progress(&tasks, &s, true), 100);
    }

    #[test]
    fn all_completed_is_exactly_100() {
        let tasks = vec![task("a", 7.0), task("b", 13.0)];
        let s = statuses(&[("a", TaskStatus::Completed), ("b", TaskStatus::Completed)]);
        assert_eq!(job_progress(&tasks, &s, false), 100);
    }

    #[test]
    fn rounds_to_nearest_percent() {
        let tasks = vec![task("a", 1.0), task("b", 2.0)];
        let s = statuses(&[("a", TaskStatus::Completed), ("b", TaskStatus::Pending)]);
        // 1/3 of the weight -> 33.33 -> 33
        assert_eq!(job_progress(&tasks, &s, false), 33);
    }

    #[test]
    fn missing_status_counts_as_pending() {
        let tasks = vec![task("a", 10.0)];
        assert_eq!(job_progress(&tasks, &BTreeMap::new(), false), 0);
    }
}
