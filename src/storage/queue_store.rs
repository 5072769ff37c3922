use super::StorageResult;
use crate::models::{JobStatus, QueueJob};
use async_trait::async_trait;

/// Persistence for send-queue jobs.
///
/// Implementations provide the primitive record operations; the query helpers
/// are derived from `all_jobs` and may be overridden with indexed lookups.
#[async_trait]
pub trait QueueStore: Send + Sync {
    async fn insert_job(&self, job: &QueueJob) -> StorageResult<()>;

    async fn update_job(&self, job: &QueueJob) -> StorageResult<()>;

    /// Write `job` only if the stored record still exists with status
    /// `expected`, atomically. Returns whether the write happened.
    async fn update_job_if(&self, job: &QueueJob, expected: JobStatus) -> StorageResult<bool>;

    async fn get_job(&self, id: &str) -> StorageResult<Option<QueueJob>>;

    async fn delete_job(&self, id: &str) -> StorageResult<bool>;

    async fn all_jobs(&self) -> StorageResult<Vec<QueueJob>>;

    /// A user's most recent jobs, newest first.
    async fn jobs_for_user(&self, user_id: &str, limit: usize) -> StorageResult<Vec<QueueJob>> {
        let mut jobs: Vec<QueueJob> = self
            .all_jobs()
            .await?
            .into_iter()
            .filter(|j| j.user_id == user_id)
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs.truncate(limit);
        Ok(jobs)
    }

    async fn jobs_with_status(&self, status: JobStatus) -> StorageResult<Vec<QueueJob>> {
        let mut jobs: Vec<QueueJob> = self
            .all_jobs()
            .await?
            .into_iter()
            .filter(|j| j.status == status)
            .collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(jobs)
    }

    /// Whether the user already has the study waiting or in flight.
    async fn has_active_job_for_study(
        &self,
        user_id: &str,
        study_instance_uid: &str,
    ) -> StorageResult<bool> {
        Ok(self.all_jobs().await?.iter().any(|j| {
            j.user_id == user_id
                && j.study_instance_uid == study_instance_uid
                && j.status.is_active()
        }))
    }

    /// Remove the user's `COMPLETED` and `FAILED` jobs, returning how many went.
    async fn delete_finished(&self, user_id: &str) -> StorageResult<usize> {
        let finished: Vec<String> = self
            .all_jobs()
            .await?
            .into_iter()
            .filter(|j| j.user_id == user_id && j.status.is_finished())
            .map(|j| j.id)
            .collect();
        let mut removed = 0;
        for id in finished {
            if self.delete_job(&id).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
