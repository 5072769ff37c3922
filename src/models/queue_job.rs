use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a "send study to remote modality" job.
///
/// `PENDING -> PROCESSING -> COMPLETED | FAILED`, and `FAILED -> PENDING`
/// through an explicit retry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_active(self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Processing)
    }

    pub fn is_finished(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueueJob {
    pub id: String,
    pub user_id: String,
    pub study_instance_uid: String,
    pub target_node: String,
    #[serde(default)]
    pub clinic_id: Option<String>,
    pub status: JobStatus,
    #[serde(default)]
    pub orthanc_job_id: Option<String>,
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub retries: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl QueueJob {
    pub fn new(
        user_id: impl Into<String>,
        study_instance_uid: impl Into<String>,
        target_node: impl Into<String>,
        clinic_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            study_instance_uid: study_instance_uid.into(),
            target_node: target_node.into(),
            clinic_id,
            status: JobStatus::Pending,
            orthanc_job_id: None,
            progress: 0,
            error: None,
            retries: 0,
            created_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn mark_processing(&mut self, orthanc_job_id: String, now: DateTime<Utc>) {
        self.status = JobStatus::Processing;
        self.orthanc_job_id = Some(orthanc_job_id);
        self.started_at = Some(now);
        self.error = None;
    }

    pub fn mark_completed(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.error = None;
        self.started_at.get_or_insert(now);
        self.completed_at = Some(now);
    }

    pub fn mark_failed(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        self.status = JobStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(now);
    }

    /// Put a failed job back in line. Only `FAILED` jobs can be retried.
    pub fn reset_for_retry(&mut self) -> bool {
        if self.status != JobStatus::Failed {
            return false;
        }
        self.status = JobStatus::Pending;
        self.progress = 0;
        self.error = None;
        self.orthanc_job_id = None;
        self.started_at = None;
        self.completed_at = None;
        self.retries += 1;
        true
    }
}
