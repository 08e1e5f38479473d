//! Per-job dispatch loop.
//!
//! One scheduler task runs per started job. Each iteration reads the
//! job's status under its lock (the job manager is the only other
//! writer), computes the ready set, and dispatches up to the configured
//! concurrency limit of tasks into a [`JoinSet`]. Completions, pause and
//! cancel signals, and retry backoff all flow through the same select
//! loop, so one slow task never blocks siblings that could proceed.
//!
//! The loop derives everything from job state; the manager's wake channel
//! is only a change notification, which keeps pause/resume/cancel free of
//! lost-signal races.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use restack_core::job::{ConversionJob, JobStatus};
use restack_core::job_events::{
    EVENT_JOB_COMPLETED, EVENT_JOB_FAILED, EVENT_JOB_PROGRESS, EVENT_TASK_COMPLETED,
    EVENT_TASK_FAILED, EVENT_TASK_SKIPPED, EVENT_TASK_STARTED,
};
use restack_core::plan::{ConversionPlan, ConversionTask, TaskStatus};
use restack_core::progress::job_progress;
use restack_core::result::TaskResult;
use restack_core::retry::RetryConfig;
use restack_core::store::JobStore;
use restack_core::types::{JobId, TaskId};
use restack_events::{EngineEvent, EventBus, ProgressHub, ProgressSnapshot};

use crate::config::EngineConfig;
use crate::executor::TaskExecutor;
use crate::manager::JobEntry;

/// Everything a scheduler task needs, captured at spawn time.
pub(crate) struct SchedulerCtx {
    pub(crate) job_id: JobId,
    pub(crate) entry: Arc<JobEntry>,
    pub(crate) store: Arc<dyn JobStore>,
    pub(crate) bus: Arc<EventBus>,
    pub(crate) hub: Arc<ProgressHub>,
    pub(crate) executor: Arc<TaskExecutor>,
    pub(crate) config: EngineConfig,
    pub(crate) wake: watch::Receiver<()>,
    pub(crate) cancel: CancellationToken,
}

/// What the loop decided to do after inspecting job state.
enum Step {
    /// The job reached a terminal status; the loop exits.
    Exit,
    /// Nothing to dispatch right now; wait for a completion or a signal.
    Wait,
    /// The job paused with hard-cancel configured; abort in-flight work.
    AbortInFlight,
    /// Dispatch these tasks (already marked Running under the lock).
    Dispatch(Vec<ConversionTask>),
}

/// Run the dispatch loop for one job until it reaches a terminal state.
pub(crate) async fn run(ctx: SchedulerCtx) {
    let cancel = ctx.cancel.clone();
    let mut wake = ctx.wake.clone();

    let (plan, mut dep_context) = {
        let job = ctx.entry.state.lock().await;
        (Arc::new(job.plan.clone()), seed_dep_context(&job))
    };

    let mut join_set: JoinSet<TaskResult> = JoinSet::new();

    tracing::info!(
        job_id = %ctx.job_id,
        task_count = plan.tasks.len(),
        max_concurrent = ctx.config.max_concurrent,
        "Scheduler started",
    );

    loop {
        if cancel.is_cancelled() {
            break;
        }

        match ctx.plan_step(join_set.len()).await {
            Step::Exit => break,
            Step::AbortInFlight => {
                join_set.abort_all();
                while join_set.join_next().await.is_some() {}
                ctx.reset_running_tasks().await;
                continue;
            }
            Step::Dispatch(tasks) => {
                for task in tasks {
                    let request_context = build_request_context(&task, &dep_context);
                    let executor = Arc::clone(&ctx.executor);
                    let retry = ctx.config.retry.clone();
                    let task_cancel = cancel.clone();
                    let task_plan = Arc::clone(&plan);
                    join_set.spawn(async move {
                        run_task(
                            executor,
                            retry,
                            task_cancel,
                            task_plan,
                            task,
                            request_context,
                        )
                        .await
                    });
                }
            }
            Step::Wait => {}
        }

        if join_set.is_empty() {
            // Parked: paused, or terminal-check pending. Wake on signal.
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = wake.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        } else {
            tokio::select! {
                _ = cancel.cancelled() => break,
                joined = join_set.join_next() => {
                    match joined {
                        Some(Ok(result)) => ctx.record(result, &mut dep_context).await,
                        Some(Err(e)) if e.is_panic() => {
                            tracing::error!(job_id = %ctx.job_id, error = %e, "Task panicked");
                        }
                        _ => {}
                    }
                }
                changed = wake.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
    }

    // Dropping the JoinSet aborts whatever is still in flight; results of
    // aborted calls are discarded, which is the contract for cancellation.
    tracing::info!(job_id = %ctx.job_id, "Scheduler stopped");
}

impl SchedulerCtx {
    /// Inspect job state under the lock and decide the next step.
    async fn plan_step(&self, in_flight: usize) -> Step {
        let mut job = self.entry.state.lock().await;

        match job.status {
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => Step::Exit,
            JobStatus::Paused => {
                if self.config.hard_cancel_on_pause && in_flight > 0 {
                    Step::AbortInFlight
                } else {
                    Step::Wait
                }
            }
            // A scheduler only exists for started jobs; Pending here means
            // the manager is mid-transition. Wait for the next signal.
            JobStatus::Pending => Step::Wait,
            JobStatus::Running => self.plan_running_step(&mut job, in_flight).await,
        }
    }

    /// The Running-status arm of [`plan_step`]: propagate skips, finalize
    /// if nothing remains, otherwise fill free dispatch slots.
    async fn plan_running_step(&self, job: &mut ConversionJob, in_flight: usize) -> Step {
        let skipped = propagate_skips(job);
        if !skipped.is_empty() {
            for (task_id, dependency) in &skipped {
                job.results.push(TaskResult::skipped(task_id.clone(), dependency));
                tracing::info!(
                    job_id = %self.job_id,
                    task_id = %task_id,
                    dependency = %dependency,
                    "Task skipped: dependency did not complete",
                );
            }
            self.persist(job).await;
            for (task_id, dependency) in &skipped {
                self.bus.publish(
                    EngineEvent::new(EVENT_TASK_SKIPPED, self.job_id)
                        .with_payload(json!({ "task_id": task_id, "dependency": dependency })),
                );
            }
            self.publish_progress(job).await;
        }

        let unfinished = job.task_statuses.values().any(|s| !s.is_terminal());
        if !unfinished && in_flight == 0 {
            self.finalize(job).await;
            return Step::Exit;
        }

        let slots = self.config.max_concurrent.saturating_sub(in_flight);
        if slots == 0 {
            return Step::Wait;
        }

        let mut ready = compute_ready(job);
        ready.truncate(slots);
        if ready.is_empty() {
            return Step::Wait;
        }

        for task in &ready {
            job.task_statuses
                .insert(task.id.clone(), TaskStatus::Running);
        }
        job.current_activity = Some(ready[0].description.clone());
        self.persist(job).await;

        for task in &ready {
            tracing::info!(job_id = %self.job_id, task_id = %task.id, "Task dispatched");
            self.bus.publish(
                EngineEvent::new(EVENT_TASK_STARTED, self.job_id)
                    .with_payload(json!({ "task_id": task.id })),
            );
        }
        self.publish_progress(job).await;

        Step::Dispatch(ready)
    }

    /// Fold a finished task back into job state.
    async fn record(&self, result: TaskResult, dep_context: &mut HashMap<TaskId, serde_json::Value>) {
        let mut job = self.entry.state.lock().await;

        // The job left the running/paused family while this task was in
        // flight; its result is discarded per the cancellation contract.
        if job.status == JobStatus::Cancelled {
            tracing::debug!(
                job_id = %self.job_id,
                task_id = %result.task_id,
                "Discarding result for cancelled job",
            );
            return;
        }

        let task_id = result.task_id.clone();
        let status = result.status;
        job.task_statuses.insert(task_id.clone(), status);

        match status {
            TaskStatus::Completed => {
                dep_context.insert(task_id.clone(), fold_output(&result));
                tracing::info!(
                    job_id = %self.job_id,
                    task_id = %task_id,
                    attempts = result.attempts,
                    files = result.files.len(),
                    "Task completed",
                );
            }
            TaskStatus::Failed => {
                let message = result
                    .error
                    .as_ref()
                    .map(|e| e.message.clone())
                    .unwrap_or_else(|| "unknown task failure".to_string());
                tracing::warn!(
                    job_id = %self.job_id,
                    task_id = %task_id,
                    attempts = result.attempts,
                    error = %message,
                    "Task failed",
                );
                // The job reports the first unrecoverable failure.
                if job.error_message.is_none() {
                    job.error_message = Some(format!("task \"{task_id}\" failed: {message}"));
                }
            }
            _ => {}
        }

        let progress = job_progress(&job.plan.tasks, &job.task_statuses, false);
        job.progress = job.progress.max(progress);
        job.results.push(result);

        self.persist(&job).await;
        let event_type = match status {
            TaskStatus::Completed => EVENT_TASK_COMPLETED,
            _ => EVENT_TASK_FAILED,
        };
        self.bus.publish(
            EngineEvent::new(event_type, self.job_id).with_payload(json!({ "task_id": task_id })),
        );
        self.publish_progress(&job).await;
    }

    /// Close out a job in which every task reached a terminal state.
    async fn finalize(&self, job: &mut ConversionJob) {
        let failed = job.any_task_failed();
        job.status = if failed {
            JobStatus::Failed
        } else {
            JobStatus::Completed
        };
        job.progress = job_progress(&job.plan.tasks, &job.task_statuses, true);
        job.completed_at = Some(chrono::Utc::now());
        job.current_activity = None;

        self.persist(job).await;

        let event_type = if failed {
            EVENT_JOB_FAILED
        } else {
            EVENT_JOB_COMPLETED
        };
        self.bus.publish(
            EngineEvent::new(event_type, self.job_id)
                .with_payload(json!({ "error": job.error_message })),
        );
        self.publish_progress(job).await;

        tracing::info!(
            job_id = %self.job_id,
            status = %job.status,
            progress = job.progress,
            "Job finished",
        );
    }

    /// Return hard-cancelled in-flight tasks to the pending pool so they
    /// re-run after resume.
    async fn reset_running_tasks(&self) {
        let mut job = self.entry.state.lock().await;
        for status in job.task_statuses.values_mut() {
            if *status == TaskStatus::Running {
                *status = TaskStatus::Pending;
            }
        }
        self.persist(&job).await;
    }

    async fn persist(&self, job: &ConversionJob) {
        if let Err(e) = self.store.save(job).await {
            tracing::error!(job_id = %self.job_id, error = %e, "Failed to persist job");
        }
    }

    async fn publish_progress(&self, job: &ConversionJob) {
        self.hub.publish(ProgressSnapshot::of(job)).await;
        self.bus.publish(
            EngineEvent::new(EVENT_JOB_PROGRESS, self.job_id).with_payload(json!({
                "progress": job.progress,
                "status": job.status,
                "current_activity": job.current_activity,
            })),
        );
    }
}

/// One dispatched task: attempt, classify, back off, retry.
///
/// Transient failures are retried up to `retry.max_retries` times with
/// exponential backoff; permanent failures return immediately. The final
/// result carries the total attempt count.
async fn run_task(
    executor: Arc<TaskExecutor>,
    retry: RetryConfig,
    cancel: CancellationToken,
    plan: Arc<ConversionPlan>,
    task: ConversionTask,
    context: serde_json::Value,
) -> TaskResult {
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        let result = executor
            .execute(&plan, &task, context.clone(), attempts)
            .await;

        let Some(error) = result.error.as_ref() else {
            return result;
        };

        if !error.kind.is_transient() || attempts > retry.max_retries {
            return result;
        }

        let delay = retry.delay_for_attempt(attempts - 1);
        tracing::warn!(
            task_id = %task.id,
            attempt = attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Transient task failure, retrying",
        );

        tokio::select! {
            _ = cancel.cancelled() => return result,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Pending tasks whose dependencies are all completed, ordered by
/// priority (lower first) then task id as a stable tie-break.
fn compute_ready(job: &ConversionJob) -> Vec<ConversionTask> {
    let mut ready: Vec<ConversionTask> = job
        .plan
        .tasks
        .iter()
        .filter(|t| job.task_status(&t.id) == TaskStatus::Pending)
        .filter(|t| {
            t.depends_on
                .iter()
                .all(|dep| job.task_status(dep) == TaskStatus::Completed)
        })
        .cloned()
        .collect();

    ready.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
    ready
}

/// Mark every pending task with a failed or skipped dependency as
/// skipped, to a fixpoint so skip chains settle in one pass. Returns
/// `(task, blocking dependency)` pairs.
fn propagate_skips(job: &mut ConversionJob) -> Vec<(TaskId, TaskId)> {
    let mut skipped = Vec::new();

    loop {
        let next: Vec<(TaskId, TaskId)> = job
            .plan
            .tasks
            .iter()
            .filter(|t| job.task_status(&t.id) == TaskStatus::Pending)
            .filter_map(|t| {
                t.depends_on
                    .iter()
                    .find(|dep| {
                        matches!(
                            job.task_status(dep),
                            TaskStatus::Failed | TaskStatus::Skipped
                        )
                    })
                    .map(|dep| (t.id.clone(), dep.clone()))
            })
            .collect();

        if next.is_empty() {
            break;
        }
        for (task_id, dep) in next {
            job.task_statuses
                .insert(task_id.clone(), TaskStatus::Skipped);
            skipped.push((task_id, dep));
        }
    }

    skipped
}

/// Fold a completed task's outputs into the context visible to its
/// dependents.
fn fold_output(result: &TaskResult) -> serde_json::Value {
    json!({
        "files": result.files.iter().map(|f| f.path.clone()).collect::<Vec<_>>(),
        "warnings": result.warnings,
    })
}

/// Rebuild the dependency context from already-recorded results, so a
/// scheduler attached to a partially-complete job (resume, retry) sees
/// the same context as the original run.
fn seed_dep_context(job: &ConversionJob) -> HashMap<TaskId, serde_json::Value> {
    job.results
        .iter()
        .filter(|r| r.status == TaskStatus::Completed)
        .map(|r| (r.task_id.clone(), fold_output(r)))
        .collect()
}

/// The task's own context plus a `dependencies` object keyed by
/// dependency task id.
fn build_request_context(
    task: &ConversionTask,
    dep_context: &HashMap<TaskId, serde_json::Value>,
) -> serde_json::Value {
    let deps: serde_json::Map<String, serde_json::Value> = task
        .depends_on
        .iter()
        .filter_map(|dep| dep_context.get(dep).map(|v| (dep.clone(), v.clone())))
        .collect();

    let mut merged = task.context.clone();
    match &mut merged {
        serde_json::Value::Object(map) => {
            map.insert("dependencies".into(), serde_json::Value::Object(deps));
        }
        _ => {
            merged = json!({ "dependencies": deps });
        }
    }
    merged
}
