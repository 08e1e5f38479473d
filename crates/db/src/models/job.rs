//! Row model for the `conversion_jobs` table.

use std::collections::BTreeMap;

use sqlx::FromRow;

use restack_core::job::ConversionJob;
use restack_core::plan::{ConversionPlan, TaskStatus};
use restack_core::result::TaskResult;
use restack_core::types::{ProjectId, TaskId, Timestamp};

use super::status::{job_status_from_id, job_status_id, StatusId};

/// A row from the `conversion_jobs` table.
///
/// Plan, per-task statuses, and results are JSONB snapshots of the
/// corresponding serde types in `restack-core`.
#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    pub id: uuid::Uuid,
    pub project_id: ProjectId,
    pub status_id: StatusId,
    pub progress_percent: i16,
    pub current_activity: Option<String>,
    pub plan: serde_json::Value,
    pub task_statuses: serde_json::Value,
    pub results: serde_json::Value,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub updated_at: Timestamp,
}

/// A row could not be converted back into a domain job.
#[derive(Debug, thiserror::Error)]
pub enum JobRowError {
    #[error("unknown status id {0}")]
    UnknownStatus(StatusId),

    #[error("invalid JSONB payload: {0}")]
    Payload(#[from] serde_json::Error),
}

impl JobRow {
    /// Snapshot a domain job into row form.
    ///
    /// Serialization of the plan and results cannot fail for the domain
    /// types (plain structs, no non-string map keys), so this is
    /// infallible.
    pub fn from_job(job: &ConversionJob) -> Self {
        Self {
            id: job.id,
            project_id: job.project_id,
            status_id: job_status_id(job.status),
            progress_percent: job.progress as i16,
            current_activity: job.current_activity.clone(),
            plan: serde_json::to_value(&job.plan).unwrap_or(serde_json::Value::Null),
            task_statuses: serde_json::to_value(&job.task_statuses)
                .unwrap_or(serde_json::Value::Null),
            results: serde_json::to_value(&job.results).unwrap_or(serde_json::Value::Null),
            error_message: job.error_message.clone(),
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            updated_at: chrono::Utc::now(),
        }
    }

    /// Rehydrate the domain job from a row.
    pub fn into_job(self) -> Result<ConversionJob, JobRowError> {
        let status =
            job_status_from_id(self.status_id).ok_or(JobRowError::UnknownStatus(self.status_id))?;
        let plan: ConversionPlan = serde_json::from_value(self.plan)?;
        let task_statuses: BTreeMap<TaskId, TaskStatus> =
            serde_json::from_value(self.task_statuses)?;
        let results: Vec<TaskResult> = serde_json::from_value(self.results)?;

        Ok(ConversionJob {
            id: self.id,
            project_id: self.project_id,
            plan,
            status,
            progress: self.progress_percent.clamp(0, 100) as u8,
            current_activity: self.current_activity,
            task_statuses,
            results,
            error_message: self.error_message,
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
        })
    }
}
