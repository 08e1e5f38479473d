/// Unique identifier of a conversion job.
pub type JobId = uuid::Uuid;

/// Project primary keys are BIGSERIAL in the external store.
pub type ProjectId = i64;

/// Task identifiers are strings, unique within their plan.
pub type TaskId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
