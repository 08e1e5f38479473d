//! Repository for the `conversion_jobs` table.
//!
//! Uses the status mappings from `models::status` for all status
//! literals. No magic numbers in queries.

use sqlx::PgPool;

use restack_core::job::JobStatus;
use restack_core::types::{JobId, ProjectId};

use crate::models::job::JobRow;
use crate::models::status::job_status_id;

/// Column list for `conversion_jobs` queries.
const COLUMNS: &str = "\
    id, project_id, status_id, progress_percent, current_activity, \
    plan, task_statuses, results, error_message, \
    created_at, started_at, completed_at, updated_at";

/// Provides CRUD operations for conversion jobs.
pub struct JobRepo;

impl JobRepo {
    /// Insert a job snapshot, or fully replace the existing row.
    ///
    /// The engine owns job state in memory; the row is a mirror, so the
    /// whole snapshot is written every time.
    pub async fn upsert(pool: &PgPool, row: &JobRow) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO conversion_jobs \
                 (id, project_id, status_id, progress_percent, current_activity, \
                  plan, task_statuses, results, error_message, \
                  created_at, started_at, completed_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, NOW()) \
             ON CONFLICT (id) DO UPDATE SET \
                 status_id = EXCLUDED.status_id, \
                 progress_percent = EXCLUDED.progress_percent, \
                 current_activity = EXCLUDED.current_activity, \
                 task_statuses = EXCLUDED.task_statuses, \
                 results = EXCLUDED.results, \
                 error_message = EXCLUDED.error_message, \
                 started_at = EXCLUDED.started_at, \
                 completed_at = EXCLUDED.completed_at, \
                 updated_at = NOW()",
        )
        .bind(row.id)
        .bind(row.project_id)
        .bind(row.status_id)
        .bind(row.progress_percent)
        .bind(&row.current_activity)
        .bind(&row.plan)
        .bind(&row.task_statuses)
        .bind(&row.results)
        .bind(&row.error_message)
        .bind(row.created_at)
        .bind(row.started_at)
        .bind(row.completed_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Find a job by its ID.
    pub async fn find_by_id(pool: &PgPool, id: JobId) -> Result<Option<JobRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM conversion_jobs WHERE id = $1");
        sqlx::query_as::<_, JobRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List jobs for a project, newest-first.
    pub async fn list_by_project(
        pool: &PgPool,
        project_id: ProjectId,
    ) -> Result<Vec<JobRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM conversion_jobs \
             WHERE project_id = $1 \
             ORDER BY created_at DESC"
        );
        sqlx::query_as::<_, JobRow>(&query)
            .bind(project_id)
            .fetch_all(pool)
            .await
    }

    /// List all jobs, newest-first.
    pub async fn list_all(pool: &PgPool) -> Result<Vec<JobRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM conversion_jobs ORDER BY created_at DESC");
        sqlx::query_as::<_, JobRow>(&query).fetch_all(pool).await
    }

    /// List jobs persisted as running or paused.
    ///
    /// Consulted once at startup: such jobs were interrupted by a crash
    /// or restart and must be surfaced, not silently lost.
    pub async fn list_active(pool: &PgPool) -> Result<Vec<JobRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM conversion_jobs \
             WHERE status_id IN ($1, $2) \
             ORDER BY created_at DESC"
        );
        sqlx::query_as::<_, JobRow>(&query)
            .bind(job_status_id(JobStatus::Running))
            .bind(job_status_id(JobStatus::Paused))
            .fetch_all(pool)
            .await
    }

    /// Delete a job row. Returns `true` if a row was removed.
    pub async fn delete(pool: &PgPool, id: JobId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM conversion_jobs WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
