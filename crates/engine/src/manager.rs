//! Job lifecycle management.
//!
//! [`JobManager`] owns every [`ConversionJob`] and is the only writer of
//! job and task status. Each job's state sits behind its own async mutex,
//! so concurrent pause/resume/cancel/progress updates on one job
//! serialize while distinct jobs never contend. Storage, the conversion
//! service, and the event channels are injected, so tests run any number
//! of independent managers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::{watch, Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use restack_convert::ConvertService;
use restack_core::error::EngineError;
use restack_core::job::{ConversionJob, JobStatus};
use restack_core::job_events::{
    EVENT_JOB_CANCELLED, EVENT_JOB_CREATED, EVENT_JOB_PAUSED, EVENT_JOB_RESUMED,
    EVENT_JOB_STARTED,
};
use restack_core::plan::{ConversionPlan, TaskStatus};
use restack_core::progress::job_progress;
use restack_core::store::JobStore;
use restack_core::types::{JobId, ProjectId, TaskId};
use restack_core::validator::validate;
use restack_events::{EngineEvent, EventBus, ProgressHub, ProgressSnapshot};

use crate::config::EngineConfig;
use crate::executor::TaskExecutor;
use crate::scheduler::{self, SchedulerCtx};

/// How long `delete` and `shutdown` wait for a scheduler task to wind
/// down after cancellation.
const SCHEDULER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-job bookkeeping: the state itself plus the handles needed to
/// signal its scheduler.
pub(crate) struct JobEntry {
    pub(crate) state: Mutex<ConversionJob>,
    pub(crate) runtime: Mutex<Option<JobRuntime>>,
}

/// Handles for a live scheduler task.
pub(crate) struct JobRuntime {
    wake: watch::Sender<()>,
    cancel: CancellationToken,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl JobEntry {
    fn new(job: ConversionJob) -> Self {
        Self {
            state: Mutex::new(job),
            runtime: Mutex::new(None),
        }
    }

    /// Nudge the scheduler to re-read job state.
    async fn notify(&self) {
        if let Some(runtime) = self.runtime.lock().await.as_ref() {
            let _ = runtime.wake.send(());
        }
    }
}

/// Owns conversion jobs and drives their lifecycle.
pub struct JobManager {
    jobs: RwLock<HashMap<JobId, Arc<JobEntry>>>,
    store: Arc<dyn JobStore>,
    bus: Arc<EventBus>,
    hub: Arc<ProgressHub>,
    executor: Arc<TaskExecutor>,
    config: EngineConfig,
}

impl JobManager {
    /// Create a manager with injected storage, conversion service, and
    /// event channels.
    pub fn new(
        store: Arc<dyn JobStore>,
        service: Arc<dyn ConvertService>,
        bus: Arc<EventBus>,
        hub: Arc<ProgressHub>,
        config: EngineConfig,
    ) -> Self {
        let executor = Arc::new(TaskExecutor::new(service, config.task_timeout));
        Self {
            jobs: RwLock::new(HashMap::new()),
            store,
            bus,
            hub,
            executor,
            config,
        }
    }

    /// The bus this manager publishes lifecycle events on.
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Validate a plan and create a pending job for it.
    pub async fn create(
        &self,
        project_id: ProjectId,
        plan: ConversionPlan,
    ) -> Result<ConversionJob, EngineError> {
        let validated = validate(plan)?;
        let job = ConversionJob::new(project_id, validated.into_inner());

        self.store
            .save(&job)
            .await
            .map_err(|e| EngineError::Store(e.to_string()))?;

        let snapshot = job.clone();
        self.jobs
            .write()
            .await
            .insert(snapshot.id, Arc::new(JobEntry::new(job)));

        self.hub.publish(ProgressSnapshot::of(&snapshot)).await;
        self.bus.publish(
            EngineEvent::new(EVENT_JOB_CREATED, snapshot.id)
                .with_payload(json!({ "project_id": project_id })),
        );
        tracing::info!(
            job_id = %snapshot.id,
            project_id,
            task_count = snapshot.plan.tasks.len(),
            "Conversion job created",
        );

        Ok(snapshot)
    }

    /// Start a pending job, or restart a failed one.
    ///
    /// Restarting a failed job returns its failed and skipped tasks to
    /// the pending pool; completed tasks are not re-run.
    pub async fn start(&self, job_id: JobId) -> Result<(), EngineError> {
        let entry = self.entry(job_id).await?;

        {
            let mut job = entry.state.lock().await;
            if !matches!(job.status, JobStatus::Pending | JobStatus::Failed) {
                return Err(EngineError::InvalidTransition {
                    job_id,
                    from: job.status,
                    to: JobStatus::Running,
                });
            }

            if job.status == JobStatus::Failed {
                let retryable: Vec<TaskId> = job
                    .task_statuses
                    .iter()
                    .filter(|(_, s)| matches!(**s, TaskStatus::Failed | TaskStatus::Skipped))
                    .map(|(id, _)| id.clone())
                    .collect();
                for id in retryable {
                    job.task_statuses.insert(id, TaskStatus::Pending);
                }
                job.error_message = None;
                job.completed_at = None;
                job.progress = job_progress(&job.plan.tasks, &job.task_statuses, false);
                tracing::info!(job_id = %job_id, "Restarting failed job");
            }

            job.status = JobStatus::Running;
            if job.started_at.is_none() {
                job.started_at = Some(chrono::Utc::now());
            }
            job.current_activity = Some("Starting conversion".to_string());

            self.persist(&job).await;
            self.bus.publish(EngineEvent::new(EVENT_JOB_STARTED, job_id));
            self.hub.publish(ProgressSnapshot::of(&job)).await;
        }

        self.spawn_scheduler(job_id, entry).await;
        tracing::info!(job_id = %job_id, "Job started");
        Ok(())
    }

    /// Pause a running job.
    ///
    /// The scheduler stops dispatching immediately; tasks already in
    /// flight drain to completion unless hard-cancel-on-pause is
    /// configured.
    pub async fn pause(&self, job_id: JobId) -> Result<(), EngineError> {
        let entry = self.entry(job_id).await?;

        {
            let mut job = entry.state.lock().await;
            if job.status != JobStatus::Running {
                return Err(EngineError::InvalidTransition {
                    job_id,
                    from: job.status,
                    to: JobStatus::Paused,
                });
            }
            job.status = JobStatus::Paused;
            job.current_activity = Some("Paused".to_string());

            self.persist(&job).await;
            self.bus.publish(EngineEvent::new(EVENT_JOB_PAUSED, job_id));
            self.hub.publish(ProgressSnapshot::of(&job)).await;
        }

        entry.notify().await;
        tracing::info!(job_id = %job_id, "Job paused");
        Ok(())
    }

    /// Resume a paused job from the first not-yet-dispatched ready task.
    pub async fn resume(&self, job_id: JobId) -> Result<(), EngineError> {
        let entry = self.entry(job_id).await?;

        {
            let mut job = entry.state.lock().await;
            if job.status != JobStatus::Paused {
                return Err(EngineError::InvalidTransition {
                    job_id,
                    from: job.status,
                    to: JobStatus::Running,
                });
            }
            job.status = JobStatus::Running;
            job.current_activity = Some("Resuming conversion".to_string());

            self.persist(&job).await;
            self.bus.publish(EngineEvent::new(EVENT_JOB_RESUMED, job_id));
            self.hub.publish(ProgressSnapshot::of(&job)).await;
        }

        // The parked scheduler picks the job back up; if none is attached
        // (paused job rehydrated from the store), spawn a fresh one.
        let has_runtime = entry.runtime.lock().await.is_some();
        if has_runtime {
            entry.notify().await;
        } else {
            self.spawn_scheduler(job_id, entry).await;
        }
        tracing::info!(job_id = %job_id, "Job resumed");
        Ok(())
    }

    /// Cancel a running or paused job.
    ///
    /// Cancellation is cooperative: in-flight conversion calls are not
    /// forcibly interrupted, but their results are discarded.
    pub async fn cancel(&self, job_id: JobId) -> Result<(), EngineError> {
        let entry = self.entry(job_id).await?;

        {
            let mut job = entry.state.lock().await;
            if !matches!(job.status, JobStatus::Running | JobStatus::Paused) {
                return Err(EngineError::InvalidTransition {
                    job_id,
                    from: job.status,
                    to: JobStatus::Cancelled,
                });
            }
            job.status = JobStatus::Cancelled;
            job.completed_at = Some(chrono::Utc::now());
            job.current_activity = None;
            // In-flight tasks never finished; their results are discarded.
            for status in job.task_statuses.values_mut() {
                if *status == TaskStatus::Running {
                    *status = TaskStatus::Pending;
                }
            }

            self.persist(&job).await;
            self.bus
                .publish(EngineEvent::new(EVENT_JOB_CANCELLED, job_id));
            self.hub.publish(ProgressSnapshot::of(&job)).await;
        }

        if let Some(runtime) = entry.runtime.lock().await.as_ref() {
            runtime.cancel.cancel();
            let _ = runtime.wake.send(());
        }
        tracing::info!(job_id = %job_id, "Job cancelled");
        Ok(())
    }

    /// Fetch a snapshot of a job.
    pub async fn get_status(&self, job_id: JobId) -> Result<ConversionJob, EngineError> {
        let entry = self.entry(job_id).await?;
        let job = entry.state.lock().await;
        Ok(job.clone())
    }

    /// List jobs, optionally filtered by project, newest-first.
    pub async fn list_jobs(&self, project_id: Option<ProjectId>) -> Vec<ConversionJob> {
        let entries: Vec<Arc<JobEntry>> = self.jobs.read().await.values().cloned().collect();

        let mut jobs = Vec::with_capacity(entries.len());
        for entry in entries {
            let job = entry.state.lock().await;
            if project_id.map_or(true, |p| p == job.project_id) {
                jobs.push(job.clone());
            }
        }
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    /// Delete a job. Terminal jobs are removed directly; a running or
    /// paused job is cancelled first.
    pub async fn delete(&self, job_id: JobId) -> Result<(), EngineError> {
        let entry = self.entry(job_id).await?;

        let status = entry.state.lock().await.status;
        if matches!(status, JobStatus::Running | JobStatus::Paused) {
            self.cancel(job_id).await?;
            let handle = entry
                .runtime
                .lock()
                .await
                .as_mut()
                .and_then(|rt| rt.handle.take());
            if let Some(handle) = handle {
                let _ = tokio::time::timeout(SCHEDULER_DRAIN_TIMEOUT, handle).await;
            }
        }

        self.jobs.write().await.remove(&job_id);
        self.store
            .delete(job_id)
            .await
            .map_err(|e| EngineError::Store(e.to_string()))?;
        self.hub.remove(job_id).await;

        tracing::info!(job_id = %job_id, "Job deleted");
        Ok(())
    }

    /// Subscribe to a job's coalesced progress stream.
    ///
    /// The receiver immediately holds the latest snapshot; consumers that
    /// need a complete picture reconcile via [`JobManager::get_status`].
    pub async fn subscribe_progress(
        &self,
        job_id: JobId,
    ) -> Result<watch::Receiver<ProgressSnapshot>, EngineError> {
        let entry = self.entry(job_id).await?;

        if let Some(rx) = self.hub.subscribe(job_id).await {
            return Ok(rx);
        }

        // First subscriber to a job that has not published yet (e.g. one
        // rehydrated at recovery): publish its current state first.
        let snapshot = ProgressSnapshot::of(&*entry.state.lock().await);
        self.hub.publish(snapshot).await;
        self.hub
            .subscribe(job_id)
            .await
            .ok_or_else(|| EngineError::Store("progress channel unavailable".to_string()))
    }

    /// Rehydrate jobs from the store after a process restart.
    ///
    /// Jobs persisted as running or paused were interrupted mid-flight;
    /// they are marked failed rather than silently lost, and the user can
    /// restart them explicitly. Returns the number of interrupted jobs.
    pub async fn recover(&self) -> Result<usize, EngineError> {
        let stored = self
            .store
            .list_all()
            .await
            .map_err(|e| EngineError::Store(e.to_string()))?;

        let mut interrupted = 0;
        let mut map = self.jobs.write().await;

        for mut job in stored {
            if map.contains_key(&job.id) {
                continue;
            }

            if matches!(job.status, JobStatus::Running | JobStatus::Paused) {
                job.status = JobStatus::Failed;
                job.error_message = Some("conversion interrupted by process restart".to_string());
                job.completed_at = Some(chrono::Utc::now());
                job.current_activity = None;
                for status in job.task_statuses.values_mut() {
                    if *status == TaskStatus::Running {
                        *status = TaskStatus::Pending;
                    }
                }
                self.persist(&job).await;
                interrupted += 1;
                tracing::warn!(
                    job_id = %job.id,
                    "Job was active at shutdown, marked failed",
                );
            }

            map.insert(job.id, Arc::new(JobEntry::new(job)));
        }

        tracing::info!(
            total = map.len(),
            interrupted,
            "Job recovery complete",
        );
        Ok(interrupted)
    }

    /// Adopt pending jobs created by other processes.
    ///
    /// Loads store rows this manager does not know yet and returns the
    /// ids of the newly adopted pending jobs so the caller can enqueue
    /// them. Jobs in other states belong to the process driving them and
    /// are left alone.
    pub async fn sync_from_store(&self) -> Result<Vec<JobId>, EngineError> {
        let stored = self
            .store
            .list_all()
            .await
            .map_err(|e| EngineError::Store(e.to_string()))?;

        let mut adopted = Vec::new();
        let mut map = self.jobs.write().await;
        for job in stored {
            if map.contains_key(&job.id) || job.status != JobStatus::Pending {
                continue;
            }
            adopted.push(job.id);
            map.insert(job.id, Arc::new(JobEntry::new(job)));
        }
        Ok(adopted)
    }

    /// Gracefully stop all schedulers.
    ///
    /// Cancels every live scheduler task, then waits up to
    /// [`SCHEDULER_DRAIN_TIMEOUT`] per task for a clean exit. Job state
    /// stays persisted; interrupted jobs surface through
    /// [`JobManager::recover`] on the next start.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down job manager");

        let entries: Vec<Arc<JobEntry>> = self.jobs.read().await.values().cloned().collect();
        for entry in entries {
            let handle = {
                let mut runtime = entry.runtime.lock().await;
                match runtime.as_mut() {
                    Some(rt) => {
                        rt.cancel.cancel();
                        let _ = rt.wake.send(());
                        rt.handle.take()
                    }
                    None => None,
                }
            };
            if let Some(handle) = handle {
                let _ = tokio::time::timeout(SCHEDULER_DRAIN_TIMEOUT, handle).await;
            }
        }

        tracing::info!("Job manager shut down complete");
    }

    // ---- private helpers ----

    async fn entry(&self, job_id: JobId) -> Result<Arc<JobEntry>, EngineError> {
        self.jobs
            .read()
            .await
            .get(&job_id)
            .cloned()
            .ok_or(EngineError::JobNotFound(job_id))
    }

    async fn spawn_scheduler(&self, job_id: JobId, entry: Arc<JobEntry>) {
        let (wake_tx, wake_rx) = watch::channel(());
        let cancel = CancellationToken::new();

        let ctx = SchedulerCtx {
            job_id,
            entry: Arc::clone(&entry),
            store: Arc::clone(&self.store),
            bus: Arc::clone(&self.bus),
            hub: Arc::clone(&self.hub),
            executor: Arc::clone(&self.executor),
            config: self.config.clone(),
            wake: wake_rx,
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(scheduler::run(ctx));

        *entry.runtime.lock().await = Some(JobRuntime {
            wake: wake_tx,
            cancel,
            handle: Some(handle),
        });
    }

    async fn persist(&self, job: &ConversionJob) {
        if let Err(e) = self.store.save(job).await {
            tracing::error!(job_id = %job.id, error = %e, "Failed to persist job");
        }
    }
}
