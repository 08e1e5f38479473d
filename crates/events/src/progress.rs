//! Per-job progress snapshots with last-value-wins delivery.
//!
//! Each job gets a `tokio::sync::watch` channel holding its most recent
//! [`ProgressSnapshot`]. Publishing overwrites the previous value, so
//! rapid updates coalesce and subscribers are only guaranteed to see the
//! latest value, not every intermediate percentage. Consumers that need a
//! complete picture reconcile through the job manager's status query.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, RwLock};

use restack_core::job::{ConversionJob, JobStatus};
use restack_core::types::{JobId, Timestamp};

/// Point-in-time view of a job's progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub job_id: JobId,
    pub status: JobStatus,
    /// 0..=100.
    pub progress: u8,
    pub current_activity: Option<String>,
    pub timestamp: Timestamp,
}

impl ProgressSnapshot {
    /// Snapshot the progress-relevant fields of a job.
    pub fn of(job: &ConversionJob) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            progress: job.progress,
            current_activity: job.current_activity.clone(),
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Registry of per-job progress channels.
///
/// Thread-safe via interior `RwLock`; designed to be wrapped in `Arc` and
/// shared between the engine and its consumers.
pub struct ProgressHub {
    channels: RwLock<HashMap<JobId, watch::Sender<ProgressSnapshot>>>,
}

impl ProgressHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Publish a snapshot, creating the job's channel on first use.
    ///
    /// Existing subscribers observe the new value; if none are listening
    /// the value is still retained for future subscribers.
    pub async fn publish(&self, snapshot: ProgressSnapshot) {
        let job_id = snapshot.job_id;

        {
            let channels = self.channels.read().await;
            if let Some(tx) = channels.get(&job_id) {
                // send_replace never fails: the hub holds the sender.
                tx.send_replace(snapshot);
                return;
            }
        }

        let mut channels = self.channels.write().await;
        // Re-check under the write lock: a concurrent publish may have
        // created the channel between the two lock acquisitions.
        match channels.get(&job_id) {
            Some(tx) => {
                tx.send_replace(snapshot);
            }
            None => {
                let (tx, _) = watch::channel(snapshot);
                channels.insert(job_id, tx);
            }
        }
    }

    /// Subscribe to a job's progress.
    ///
    /// The receiver immediately holds the most recent snapshot. Returns
    /// `None` for jobs that have never published. Dropping the receiver
    /// unsubscribes.
    pub async fn subscribe(&self, job_id: JobId) -> Option<watch::Receiver<ProgressSnapshot>> {
        self.channels.read().await.get(&job_id).map(|tx| tx.subscribe())
    }

    /// Drop a job's channel once the job has been deleted.
    pub async fn remove(&self, job_id: JobId) {
        self.channels.write().await.remove(&job_id);
    }

    /// Number of jobs with a live progress channel.
    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
