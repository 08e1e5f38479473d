//! Background job dispatcher.
//!
//! Polls the job store every `poll_interval` for pending jobs created by
//! other processes (the HTTP front-end) and hands them to the queue,
//! where a [`crate::queue::QueueWorker`] picks them up. Single-process
//! deployments that call `start` directly do not need it.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use restack_core::error::EngineError;

use crate::manager::JobManager;
use crate::queue::JobQueue;

/// Default polling interval for the dispatcher loop.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Polls for pending jobs and enqueues them for execution.
///
/// A single long-lived Tokio task per worker process.
pub struct JobDispatcher {
    manager: Arc<JobManager>,
    queue: Arc<dyn JobQueue>,
    poll_interval: Duration,
}

impl JobDispatcher {
    /// Create a dispatcher with the default 1-second poll interval.
    pub fn new(manager: Arc<JobManager>, queue: Arc<dyn JobQueue>) -> Self {
        Self {
            manager,
            queue,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the polling interval (tests use a short one).
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Run the dispatcher loop until the cancellation token is triggered.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        tracing::info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Job dispatcher started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Job dispatcher shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.try_dispatch().await {
                        tracing::error!(error = %e, "Dispatch cycle failed");
                    }
                }
            }
        }
    }

    /// One dispatch cycle: adopt newly stored pending jobs and enqueue
    /// them.
    async fn try_dispatch(&self) -> Result<(), EngineError> {
        let adopted = self.manager.sync_from_store().await?;

        for job_id in adopted {
            tracing::info!(job_id = %job_id, "Pending job claimed for dispatch");
            self.queue.enqueue(job_id).await?;
        }

        Ok(())
    }
}
