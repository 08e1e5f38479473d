//! Engine-level error taxonomy.

use crate::job::JobStatus;
use crate::types::JobId;
use crate::validator::PlanValidationError;

/// Errors surfaced by the engine's public operations.
///
/// Task-level failures are not represented here: they are classified as
/// [`crate::result::TaskError`]s, retried or recorded by the scheduler,
/// and only reach the job as its `error_message` once unrecoverable.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The plan failed validation and never reached the scheduler.
    #[error(transparent)]
    Validation(#[from] PlanValidationError),

    /// The requested lifecycle operation is not legal from the job's
    /// current status. Both states are named so callers can report the
    /// rejected attempt precisely.
    #[error("invalid state transition for job {job_id}: {from} -> {to}")]
    InvalidTransition {
        job_id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    /// No job with the given id exists.
    #[error("job not found: {0}")]
    JobNotFound(JobId),

    /// The persistent job store failed.
    #[error("store error: {0}")]
    Store(String),

    /// The durable queue backend failed.
    #[error("queue error: {0}")]
    Queue(String),
}
