//! Persistent job store contract.
//!
//! The engine keeps authoritative job state in memory and mirrors every
//! mutation into a [`JobStore`] so jobs survive process restarts.
//! Implementations: Postgres (`restack-db`) and in-memory
//! (`restack-engine`, for tests and single-process deployments).

use async_trait::async_trait;

use crate::job::ConversionJob;
use crate::types::{JobId, ProjectId};

/// A storage failure, wrapped as a string so `core` stays free of any
/// particular database dependency.
#[derive(Debug, thiserror::Error)]
#[error("store error: {0}")]
pub struct StoreError(pub String);

/// Durable storage for conversion jobs.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert or fully replace a job snapshot.
    async fn save(&self, job: &ConversionJob) -> Result<(), StoreError>;

    /// Fetch one job by id.
    async fn find(&self, job_id: JobId) -> Result<Option<ConversionJob>, StoreError>;

    /// All jobs for a project, newest-first.
    async fn find_by_project(
        &self,
        project_id: ProjectId,
    ) -> Result<Vec<ConversionJob>, StoreError>;

    /// All jobs, newest-first.
    async fn list_all(&self) -> Result<Vec<ConversionJob>, StoreError>;

    /// Jobs persisted as running or paused. Consulted on startup so work
    /// interrupted by a crash is surfaced instead of silently lost.
    async fn list_active(&self) -> Result<Vec<ConversionJob>, StoreError>;

    /// Remove a job. Removing an unknown id is not an error.
    async fn delete(&self, job_id: JobId) -> Result<(), StoreError>;
}
