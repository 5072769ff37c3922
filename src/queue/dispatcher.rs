//! Timer-driven send-queue dispatcher.
//!
//! Every tick first reconciles `PROCESSING` jobs against the PACS, then starts
//! the oldest `PENDING` job of every user that has nothing in flight. Results
//! are written back only if the job was not deleted or retried meanwhile. Users
//! never block each other; a single user's jobs go out one at a time.

use super::reconcile::{apply, transition_for, PollOutcome, Transition, MISSING_JOB_ID_MESSAGE};
use crate::models::{JobStatus, QueueJob};
use crate::storage::{QueueStore, StorageError};
use crate::upstream::{ConfigResolver, PacsClient, PacsError};
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// What one tick did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub reconciled: usize,
    pub completed: usize,
    pub failed: usize,
    pub dispatched: usize,
}

impl TickReport {
    pub fn is_idle(&self) -> bool {
        *self == TickReport::default()
    }
}

#[derive(Debug, Error)]
enum DispatchError {
    #[error("Study {0} not found on PACS")]
    StudyNotFound(String),
    #[error(transparent)]
    Pacs(#[from] PacsError),
}

enum JobUpdate {
    Completed,
    Failed,
    Dispatched,
    Untouched,
}

struct Running {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct QueueDispatcher {
    store: Arc<dyn QueueStore>,
    pacs: Arc<dyn PacsClient>,
    resolver: Arc<ConfigResolver>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    ticking: AtomicBool,
    running: Mutex<Option<Running>>,
}

/// Clears the re-entrancy flag however the tick ends.
struct TickGuard<'a>(&'a AtomicBool);

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl QueueDispatcher {
    pub fn new(
        store: Arc<dyn QueueStore>,
        pacs: Arc<dyn PacsClient>,
        resolver: Arc<ConfigResolver>,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            pacs,
            resolver,
            clock,
            interval,
            ticking: AtomicBool::new(false),
            running: Mutex::new(None),
        }
    }

    /// Spawn the tick loop. Returns `false` if it is already running.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if running.is_some() {
            return false;
        }
        let shutdown = CancellationToken::new();
        let this = Arc::clone(self);
        let token = shutdown.clone();
        let handle = tokio::spawn(async move { this.run(token).await });
        *running = Some(Running { shutdown, handle });
        true
    }

    /// Stop the loop, letting a tick in progress finish.
    pub async fn stop(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(running) = running {
            running.shutdown.cancel();
            if let Err(e) = running.handle.await {
                tracing::warn!("Queue dispatcher task ended abnormally: {}", e);
            }
        }
    }

    async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!("🚚 Queue dispatcher started (tick every {:?})", self.interval);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Some(report) = self.tick().await {
                        if !report.is_idle() {
                            tracing::debug!(
                                reconciled = report.reconciled,
                                completed = report.completed,
                                failed = report.failed,
                                dispatched = report.dispatched,
                                "Queue tick"
                            );
                        }
                    }
                }
            }
        }
        tracing::info!("Queue dispatcher stopped");
    }

    /// Run one reconcile-then-dispatch pass. Returns `None` when another tick
    /// is still in progress.
    pub async fn tick(&self) -> Option<TickReport> {
        if self.ticking.swap(true, Ordering::AcqRel) {
            tracing::debug!("Previous queue tick still running, skipping");
            return None;
        }
        let _guard = TickGuard(&self.ticking);

        let mut report = TickReport::default();
        if let Err(e) = self.reconcile(&mut report).await {
            tracing::error!("Queue reconciliation failed: {}", e);
        }
        if let Err(e) = self.dispatch(&mut report).await {
            tracing::error!("Queue dispatch failed: {}", e);
        }
        Some(report)
    }

    async fn reconcile(&self, report: &mut TickReport) -> Result<(), StorageError> {
        let processing = self.store.jobs_with_status(JobStatus::Processing).await?;
        report.reconciled = processing.len();

        let updates = join_all(processing.into_iter().map(|job| self.reconcile_job(job))).await;
        for update in updates {
            match update {
                JobUpdate::Completed => report.completed += 1,
                JobUpdate::Failed => report.failed += 1,
                JobUpdate::Dispatched | JobUpdate::Untouched => {}
            }
        }
        Ok(())
    }

    async fn reconcile_job(&self, mut job: QueueJob) -> JobUpdate {
        let upstream_id = match job.orthanc_job_id.as_deref().filter(|id| !id.is_empty()) {
            Some(id) => id.to_string(),
            None => {
                tracing::warn!(job_id = %job.id, "Processing job has no upstream job id");
                job.mark_failed(MISSING_JOB_ID_MESSAGE, self.clock.now());
                return self.save(&job, JobStatus::Processing, JobUpdate::Failed).await;
            }
        };

        let target = self.resolver.resolve(job.clinic_id.as_deref()).await;
        let outcome = match self.pacs.job_status(&target, &upstream_id).await {
            Ok(upstream) => PollOutcome::Job(upstream),
            Err(PacsError::NotFound(_)) => PollOutcome::NotFound,
            Err(e) => {
                tracing::warn!(
                    job_id = %job.id,
                    upstream_job_id = %upstream_id,
                    "Polling upstream job failed, retrying next tick: {}",
                    e
                );
                return JobUpdate::Untouched;
            }
        };

        let transition = transition_for(&outcome);
        if !apply(&mut job, &transition, self.clock.now()) {
            return JobUpdate::Untouched;
        }
        let update = match &transition {
            Transition::Complete => {
                tracing::info!(
                    job_id = %job.id,
                    study = %job.study_instance_uid,
                    target_node = %job.target_node,
                    "✅ Study sent"
                );
                JobUpdate::Completed
            }
            Transition::Fail(message) => {
                tracing::warn!(job_id = %job.id, "Send job failed: {}", message);
                JobUpdate::Failed
            }
            Transition::Progress(_) | Transition::Unchanged => JobUpdate::Untouched,
        };
        self.save(&job, JobStatus::Processing, update).await
    }

    async fn dispatch(&self, report: &mut TickReport) -> Result<(), StorageError> {
        let next = next_per_user(self.store.all_jobs().await?);
        let updates = join_all(next.into_iter().map(|job| self.dispatch_job(job))).await;
        for update in updates {
            match update {
                JobUpdate::Dispatched => report.dispatched += 1,
                JobUpdate::Completed => {
                    report.dispatched += 1;
                    report.completed += 1;
                }
                JobUpdate::Failed => report.failed += 1,
                JobUpdate::Untouched => {}
            }
        }
        Ok(())
    }

    async fn dispatch_job(&self, mut job: QueueJob) -> JobUpdate {
        let update = match self.send(&job).await {
            Ok(Some(upstream_id)) => {
                tracing::info!(
                    job_id = %job.id,
                    user_id = %job.user_id,
                    upstream_job_id = %upstream_id,
                    target_node = %job.target_node,
                    "📤 Dispatched study"
                );
                job.mark_processing(upstream_id, self.clock.now());
                JobUpdate::Dispatched
            }
            Ok(None) => {
                job.mark_completed(self.clock.now());
                JobUpdate::Completed
            }
            Err(e) => {
                tracing::warn!(job_id = %job.id, user_id = %job.user_id, "Dispatch failed: {}", e);
                job.mark_failed(e.to_string(), self.clock.now());
                JobUpdate::Failed
            }
        };
        self.save(&job, JobStatus::Pending, update).await
    }

    async fn send(&self, job: &QueueJob) -> Result<Option<String>, DispatchError> {
        let target = self.resolver.resolve(job.clinic_id.as_deref()).await;
        let study_id = self
            .pacs
            .find_study(&target, &job.study_instance_uid)
            .await?
            .ok_or_else(|| DispatchError::StudyNotFound(job.study_instance_uid.clone()))?;
        Ok(self
            .pacs
            .send_to_modality(&target, &study_id, &job.target_node)
            .await?)
    }

    /// Persist `job` unless its stored record left `expected` while the PACS
    /// was being called (deleted or retried by its owner).
    async fn save(&self, job: &QueueJob, expected: JobStatus, update: JobUpdate) -> JobUpdate {
        match self.store.update_job_if(job, expected).await {
            Ok(true) => update,
            Ok(false) => {
                tracing::info!(
                    job_id = %job.id,
                    "Job was removed or changed during the PACS call, result dropped"
                );
                JobUpdate::Untouched
            }
            Err(e) => {
                tracing::error!(job_id = %job.id, "Could not persist job state: {}", e);
                JobUpdate::Untouched
            }
        }
    }
}

/// The oldest `PENDING` job of every user that has nothing `PROCESSING`.
fn next_per_user(jobs: Vec<QueueJob>) -> Vec<QueueJob> {
    let busy: HashSet<String> = jobs
        .iter()
        .filter(|j| j.status == JobStatus::Processing)
        .map(|j| j.user_id.clone())
        .collect();

    let mut next: BTreeMap<String, QueueJob> = BTreeMap::new();
    for job in jobs {
        if job.status != JobStatus::Pending || busy.contains(&job.user_id) {
            continue;
        }
        match next.get(&job.user_id) {
            Some(current) if current.created_at <= job.created_at => {}
            _ => {
                next.insert(job.user_id.clone(), job);
            }
        }
    }
    next.into_values().collect()
}
