//! Mapping from an upstream job poll to the local job state.

use crate::models::{QueueJob, UpstreamJob, UpstreamJobState};
use chrono::{DateTime, Utc};

pub const NOT_FOUND_MESSAGE: &str = "Upstream job not found (it may have expired on the PACS)";
pub const MISSING_JOB_ID_MESSAGE: &str = "Job was processing without an upstream job id";

/// What polling the PACS for one job produced.
#[derive(Debug, Clone)]
pub enum PollOutcome {
    Job(UpstreamJob),
    /// The PACS no longer knows the job. Treated as a failure: a transfer is
    /// never reported done when its outcome cannot be confirmed.
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Complete,
    Fail(String),
    Progress(u8),
    Unchanged,
}

pub fn transition_for(outcome: &PollOutcome) -> Transition {
    match outcome {
        PollOutcome::NotFound => Transition::Fail(NOT_FOUND_MESSAGE.to_string()),
        PollOutcome::Job(job) => match job.state {
            UpstreamJobState::Success => Transition::Complete,
            UpstreamJobState::Failure => Transition::Fail(job.error_message()),
            UpstreamJobState::Pending | UpstreamJobState::Running => {
                Transition::Progress(job.progress.min(100))
            }
            UpstreamJobState::Paused | UpstreamJobState::Retry => Transition::Unchanged,
        },
    }
}

/// Apply `transition` to `job`. Returns whether anything changed and the job
/// needs to be written back.
pub fn apply(job: &mut QueueJob, transition: &Transition, now: DateTime<Utc>) -> bool {
    match transition {
        Transition::Complete => {
            job.mark_completed(now);
            true
        }
        Transition::Fail(message) => {
            job.mark_failed(message.clone(), now);
            true
        }
        Transition::Progress(progress) if *progress != job.progress => {
            job.progress = *progress;
            true
        }
        Transition::Progress(_) | Transition::Unchanged => false,
    }
}
