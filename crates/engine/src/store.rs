//! In-memory job store.
//!
//! Used by tests and single-process deployments that do not need
//! durability; production deployments use the Postgres store from
//! `restack-db`.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use restack_core::job::{ConversionJob, JobStatus};
use restack_core::store::{JobStore, StoreError};
use restack_core::types::{JobId, ProjectId};

/// A `JobStore` over a `HashMap`.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<JobId, ConversionJob>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn sorted_newest_first(mut jobs: Vec<ConversionJob>) -> Vec<ConversionJob> {
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn save(&self, job: &ConversionJob) -> Result<(), StoreError> {
        self.jobs.write().await.insert(job.id, job.clone());
        Ok(())
    }

    async fn find(&self, job_id: JobId) -> Result<Option<ConversionJob>, StoreError> {
        Ok(self.jobs.read().await.get(&job_id).cloned())
    }

    async fn find_by_project(
        &self,
        project_id: ProjectId,
    ) -> Result<Vec<ConversionJob>, StoreError> {
        let jobs = self
            .jobs
            .read()
            .await
            .values()
            .filter(|j| j.project_id == project_id)
            .cloned()
            .collect();
        Ok(Self::sorted_newest_first(jobs))
    }

    async fn list_all(&self) -> Result<Vec<ConversionJob>, StoreError> {
        let jobs = self.jobs.read().await.values().cloned().collect();
        Ok(Self::sorted_newest_first(jobs))
    }

    async fn list_active(&self) -> Result<Vec<ConversionJob>, StoreError> {
        let jobs = self
            .jobs
            .read()
            .await
            .values()
            .filter(|j| matches!(j.status, JobStatus::Running | JobStatus::Paused))
            .cloned()
            .collect();
        Ok(Self::sorted_newest_first(jobs))
    }

    async fn delete(&self, job_id: JobId) -> Result<(), StoreError> {
        self.jobs.write().await.remove(&job_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use restack_core::plan::{ConversionPlan, ConversionTask, PlanComplexity, TaskKind};

    use super::*;

    fn job(project_id: ProjectId) -> ConversionJob {
        let plan = ConversionPlan {
            id: uuid::Uuid::now_v7(),
            source_stack: "s".into(),
            target_stack: "t".into(),
            tasks: vec![ConversionTask {
                id: "t1".into(),
                kind: TaskKind::Analysis,
                description: "analyze".into(),
                input_patterns: vec![],
                output_patterns: vec![],
                depends_on: vec![],
                priority: 0,
                estimated_secs: 5.0,
                context: serde_json::json!({}),
            }],
            complexity: PlanComplexity::Low,
            feasible: true,
            warnings: vec![],
        };
        ConversionJob::new(project_id, plan)
    }

    #[tokio::test]
    async fn save_find_delete_roundtrip() {
        let store = MemoryJobStore::new();
        let j = job(1);
        let id = j.id;

        store.save(&j).await.unwrap();
        assert!(store.find(id).await.unwrap().is_some());

        store.delete(id).await.unwrap();
        assert!(store.find(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn project_filter_and_ordering() {
        let store = MemoryJobStore::new();
        let first = job(1);
        let second = job(1);
        let other = job(2);
        store.save(&first).await.unwrap();
        store.save(&second).await.unwrap();
        store.save(&other).await.unwrap();

        let listed = store.find_by_project(1).await.unwrap();
        assert_eq!(listed.len(), 2);
        // Newest first.
        assert!(listed[0].created_at >= listed[1].created_at);
    }

    #[tokio::test]
    async fn active_listing_tracks_status() {
        let store = MemoryJobStore::new();
        let mut j = job(1);
        j.status = JobStatus::Running;
        store.save(&j).await.unwrap();

        assert_eq!(store.list_active().await.unwrap().len(), 1);

        j.status = JobStatus::Completed;
        store.save(&j).await.unwrap();
        assert!(store.list_active().await.unwrap().is_empty());
    }
}
