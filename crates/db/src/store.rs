//! Postgres-backed implementation of the job store contract.

use async_trait::async_trait;
use sqlx::PgPool;

use restack_core::job::ConversionJob;
use restack_core::store::{JobStore, StoreError};
use restack_core::types::{JobId, ProjectId};

use crate::models::job::{JobRow, JobRowError};
use crate::repositories::JobRepo;

/// Durable job storage over a Postgres pool.
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn rows_to_jobs(rows: Vec<JobRow>) -> Result<Vec<ConversionJob>, StoreError> {
        rows.into_iter()
            .map(|row| row.into_job().map_err(store_err))
            .collect()
    }
}

fn store_err(e: impl std::fmt::Display) -> StoreError {
    StoreError(e.to_string())
}

impl From<JobRowError> for StoreError {
    fn from(e: JobRowError) -> Self {
        StoreError(e.to_string())
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn save(&self, job: &ConversionJob) -> Result<(), StoreError> {
        let row = JobRow::from_job(job);
        JobRepo::upsert(&self.pool, &row).await.map_err(store_err)
    }

    async fn find(&self, job_id: JobId) -> Result<Option<ConversionJob>, StoreError> {
        let row = JobRepo::find_by_id(&self.pool, job_id)
            .await
            .map_err(store_err)?;
        row.map(|r| r.into_job().map_err(StoreError::from))
            .transpose()
    }

    async fn find_by_project(
        &self,
        project_id: ProjectId,
    ) -> Result<Vec<ConversionJob>, StoreError> {
        let rows = JobRepo::list_by_project(&self.pool, project_id)
            .await
            .map_err(store_err)?;
        Self::rows_to_jobs(rows)
    }

    async fn list_all(&self) -> Result<Vec<ConversionJob>, StoreError> {
        let rows = JobRepo::list_all(&self.pool).await.map_err(store_err)?;
        Self::rows_to_jobs(rows)
    }

    async fn list_active(&self) -> Result<Vec<ConversionJob>, StoreError> {
        let rows = JobRepo::list_active(&self.pool).await.map_err(store_err)?;
        Self::rows_to_jobs(rows)
    }

    async fn delete(&self, job_id: JobId) -> Result<(), StoreError> {
        JobRepo::delete(&self.pool, job_id)
            .await
            .map(|_| ())
            .map_err(store_err)
    }
}
