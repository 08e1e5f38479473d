//! Durable queue handoff for multi-process deployments.
//!
//! A front-end process validates and creates jobs, then enqueues their
//! ids; a worker process consumes the queue and drives each job's
//! dispatch loop. The engine only requires enqueue/receive with
//! ack/nack; [`MemoryQueue`] covers single-process deployments and
//! tests, and an external broker can implement [`JobQueue`] without
//! touching the engine.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use restack_core::error::EngineError;
use restack_core::types::JobId;

use crate::manager::JobManager;

/// A delivered queue message. Consumers must `ack` after handling or
/// `nack` to redeliver; dropping the message without either is treated
/// as an ack.
pub struct QueueMessage {
    pub job_id: JobId,
    redeliver: mpsc::UnboundedSender<JobId>,
}

impl QueueMessage {
    /// Acknowledge successful handling.
    pub fn ack(self) {}

    /// Return the message to the queue for redelivery.
    pub fn nack(self) {
        let _ = self.redeliver.send(self.job_id);
    }
}

/// Minimal queue contract the engine depends on.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a job id for a worker to pick up.
    async fn enqueue(&self, job_id: JobId) -> Result<(), EngineError>;

    /// Receive the next message, or `None` once the queue is closed.
    async fn recv(&self) -> Option<QueueMessage>;
}

/// In-process queue over an unbounded mpsc channel.
pub struct MemoryQueue {
    tx: mpsc::UnboundedSender<JobId>,
    rx: Mutex<mpsc::UnboundedReceiver<JobId>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn enqueue(&self, job_id: JobId) -> Result<(), EngineError> {
        self.tx
            .send(job_id)
            .map_err(|e| EngineError::Queue(e.to_string()))
    }

    async fn recv(&self) -> Option<QueueMessage> {
        let job_id = self.rx.lock().await.recv().await?;
        Some(QueueMessage {
            job_id,
            redeliver: self.tx.clone(),
        })
    }
}

/// Consumes queued job ids and starts each job on the manager.
///
/// A single long-lived task, run until the cancellation token is
/// triggered or the queue closes.
pub struct QueueWorker {
    queue: Arc<dyn JobQueue>,
    manager: Arc<JobManager>,
}

impl QueueWorker {
    pub fn new(queue: Arc<dyn JobQueue>, manager: Arc<JobManager>) -> Self {
        Self { queue, manager }
    }

    /// Run the consume loop until cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!("Queue worker started");

        loop {
            let message = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Queue worker shutting down");
                    break;
                }
                message = self.queue.recv() => match message {
                    Some(m) => m,
                    None => {
                        tracing::info!("Queue closed, worker exiting");
                        break;
                    }
                },
            };

            let job_id = message.job_id;
            match self.manager.start(job_id).await {
                Ok(()) => {
                    tracing::info!(job_id = %job_id, "Queued job started");
                    message.ack();
                }
                // A stale or double-delivered message cannot succeed on
                // redelivery; drop it.
                Err(e @ (EngineError::JobNotFound(_) | EngineError::InvalidTransition { .. })) => {
                    tracing::warn!(job_id = %job_id, error = %e, "Dropping stale queue message");
                    message.ack();
                }
                Err(e) => {
                    tracing::error!(job_id = %job_id, error = %e, "Failed to start queued job");
                    message.nack();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enqueue_then_receive() {
        let queue = MemoryQueue::new();
        let job_id = uuid::Uuid::now_v7();

        queue.enqueue(job_id).await.unwrap();
        let message = queue.recv().await.expect("message");
        assert_eq!(message.job_id, job_id);
        message.ack();
    }

    #[tokio::test]
    async fn nack_redelivers() {
        let queue = MemoryQueue::new();
        let job_id = uuid::Uuid::now_v7();

        queue.enqueue(job_id).await.unwrap();
        queue.recv().await.expect("first delivery").nack();

        let redelivered = queue.recv().await.expect("redelivery");
        assert_eq!(redelivered.job_id, job_id);
    }
}
