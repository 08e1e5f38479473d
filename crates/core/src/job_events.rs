//! Event name constants for job lifecycle events.
//!
//! Used by the engine when publishing to the event bus and by consumers
//! (progress dashboards, polling fallbacks) when filtering the stream.

/// A job was created and is pending.
pub const EVENT_JOB_CREATED: &str = "job_created";

/// A job transitioned to running.
pub const EVENT_JOB_STARTED: &str = "job_started";

/// Progress update during job execution (percentage + current activity).
pub const EVENT_JOB_PROGRESS: &str = "job_progress";

/// A running job was paused.
pub const EVENT_JOB_PAUSED: &str = "job_paused";

/// A paused job resumed running.
pub const EVENT_JOB_RESUMED: &str = "job_resumed";

/// A job finished with every required task completed.
pub const EVENT_JOB_COMPLETED: &str = "job_completed";

/// A job finished with at least one unrecoverable task failure.
pub const EVENT_JOB_FAILED: &str = "job_failed";

/// A job was cancelled (by user or system).
pub const EVENT_JOB_CANCELLED: &str = "job_cancelled";

/// A task was dispatched to the conversion service.
pub const EVENT_TASK_STARTED: &str = "task_started";

/// A task completed successfully.
pub const EVENT_TASK_COMPLETED: &str = "task_completed";

/// A task failed permanently or exhausted its retries.
pub const EVENT_TASK_FAILED: &str = "task_failed";

/// A task was skipped because a dependency did not complete.
pub const EVENT_TASK_SKIPPED: &str = "task_skipped";
