//! Job status poller
//!
//! Drives a separation or mashup job to a terminal state by querying its
//! status on a fixed interval. Requests are strictly sequential: the next
//! one is only scheduled after the previous response has been handled.
//! A `PollGuard` is checked before every request and before every store
//! write, so a cancelled or removed job never receives a late update.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use super::materialize::materialize_tracks;
use crate::engine::client::ApiClient;
use crate::engine::types::{JobStatus, MashupStatusResponse, StatusResponse};
use crate::error::ApiResult;
use crate::store::{self, JobUpdate, MashupJob, SeparationJob, SharedStore};

pub const GENERIC_JOB_ERROR: &str = "Separation failed";
pub const GENERIC_MASHUP_ERROR: &str = "Mashup failed";
pub const GENERIC_POLL_ERROR: &str = "Lost contact with the server while checking the job status";

/// Where job status comes from. `ApiClient` in production, scripted in tests.
pub trait StatusSource: Send + Sync + 'static {
    fn job_status(&self, job_id: &str) -> impl Future<Output = ApiResult<StatusResponse>> + Send;

    fn mashup_status(
        &self,
        job_id: &str,
    ) -> impl Future<Output = ApiResult<MashupStatusResponse>> + Send;
}

impl StatusSource for ApiClient {
    fn job_status(&self, job_id: &str) -> impl Future<Output = ApiResult<StatusResponse>> + Send {
        self.get_job_status(job_id)
    }

    fn mashup_status(
        &self,
        job_id: &str,
    ) -> impl Future<Output = ApiResult<MashupStatusResponse>> + Send {
        self.get_mashup_status(job_id)
    }
}

/// Liveness flag shared between a poll loop and whoever owns it.
#[derive(Debug, Clone)]
pub struct PollGuard {
    alive: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl PollGuard {
    pub fn new() -> Self {
        Self {
            alive: Arc::new(AtomicBool::new(true)),
            wake: Arc::new(Notify::new()),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn cancel(&self) {
        self.alive.store(false, Ordering::Release);
        self.wake.notify_waiters();
    }

    /// Sleep for `period`, returning early on cancellation.
    pub(crate) async fn sleep(&self, period: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(period) => {}
            _ = self.wake.notified() => {}
        }
    }
}

impl Default for PollGuard {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Completed,
    Failed(String),
    /// Guard cancelled or job removed from the store
    Cancelled,
}

/// Running poll task. Dropping the handle cancels the loop.
#[derive(Debug)]
pub struct PollHandle {
    guard: PollGuard,
    task: Option<JoinHandle<PollOutcome>>,
}

impl PollHandle {
    pub fn guard(&self) -> &PollGuard {
        &self.guard
    }

    pub fn cancel(&self) {
        self.guard.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map(|t| t.is_finished()).unwrap_or(true)
    }

    /// Wait for the loop to end.
    pub async fn join(mut self) -> PollOutcome {
        match self.task.take() {
            Some(task) => task.await.unwrap_or(PollOutcome::Cancelled),
            None => PollOutcome::Cancelled,
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.guard.cancel();
    }
}

/// Build the store update for one separation status response.
///
/// Progress never goes backwards while the job is running. Tracks are
/// rebuilt from the stem map whenever one is present, and always on
/// completion.
pub fn separation_update(job: &SeparationJob, status: &StatusResponse) -> JobUpdate {
    let mut update = JobUpdate {
        status: Some(status.status),
        ..JobUpdate::default()
    };

    if let Some(analysis) = &status.analysis {
        update.analysis = Some(Some(analysis.clone()));
    }

    match status.status {
        JobStatus::Pending | JobStatus::Processing => {
            update.progress = Some(status.progress.max(job.progress));
            update.estimated_time = Some(status.estimated_time.or(job.estimated_time));
            if let Some(stems) = &status.stems {
                update.tracks = Some(materialize_tracks(&job.id, stems));
            }
        }
        JobStatus::Completed => {
            update.progress = Some(100.0);
            update.estimated_time = Some(Some(0.0));
            update.error = Some(None);
            update.tracks = Some(
                status
                    .stems
                    .as_ref()
                    .map(|stems| materialize_tracks(&job.id, stems))
                    .unwrap_or_default(),
            );
        }
        JobStatus::Failed => {
            let message = status
                .error
                .clone()
                .unwrap_or_else(|| GENERIC_JOB_ERROR.to_string());
            update.error = Some(Some(message));
            update.estimated_time = Some(None);
        }
    }

    update
}

/// Fold one mashup status response into the job.
pub fn apply_mashup_status(job: &mut MashupJob, status: &MashupStatusResponse) {
    job.status = status.status;
    match status.status {
        JobStatus::Pending | JobStatus::Processing => {
            job.progress = status.progress.max(job.progress).clamp(0.0, 100.0);
        }
        JobStatus::Completed => {
            job.progress = 100.0;
            job.result_url = status.result_url.clone();
            job.error = None;
        }
        JobStatus::Failed => {
            job.error = Some(
                status
                    .error
                    .clone()
                    .unwrap_or_else(|| GENERIC_MASHUP_ERROR.to_string()),
            );
        }
    }
}

/// Polls job status into a shared store.
pub struct JobPoller<S> {
    source: Arc<S>,
    store: SharedStore,
    interval: Duration,
}

impl<S> Clone for JobPoller<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            store: Arc::clone(&self.store),
            interval: self.interval,
        }
    }
}

impl<S: StatusSource> JobPoller<S> {
    pub fn new(source: Arc<S>, store: SharedStore, interval: Duration) -> Self {
        Self {
            source,
            store,
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Poll a separation job until it completes, fails or is cancelled.
    pub async fn run_separation(&self, job_id: &str, guard: &PollGuard) -> PollOutcome {
        log::info!("Polling separation job {} every {:?}", job_id, self.interval);

        loop {
            if !guard.is_alive() || !store::lock(&self.store).contains_job(job_id) {
                log::info!("Polling of job {} cancelled", job_id);
                return PollOutcome::Cancelled;
            }

            let result = self.source.job_status(job_id).await;

            // The response may arrive after the owner went away.
            if !guard.is_alive() {
                log::debug!("Dropping late status for cancelled job {}", job_id);
                return PollOutcome::Cancelled;
            }

            if let Some(outcome) = self.commit_separation(job_id, result) {
                return outcome;
            }

            guard.sleep(self.interval).await;
        }
    }

    /// Write one poll result into the store. `Some` ends the loop.
    fn commit_separation(
        &self,
        job_id: &str,
        result: ApiResult<StatusResponse>,
    ) -> Option<PollOutcome> {
        let mut app = store::lock(&self.store);
        let Some(job) = app.job(job_id) else {
            log::debug!("Job {} removed while a status request was in flight", job_id);
            return Some(PollOutcome::Cancelled);
        };

        let status = match result {
            Ok(status) => status,
            Err(e) => {
                log::error!("Status poll for job {} failed, giving up: {}", job_id, e);
                let mut failed = job.clone();
                JobUpdate {
                    status: Some(JobStatus::Failed),
                    error: Some(Some(GENERIC_POLL_ERROR.to_string())),
                    estimated_time: Some(None),
                    ..JobUpdate::default()
                }
                .apply(&mut failed);
                app.replace_separation_job(failed);
                return Some(PollOutcome::Failed(GENERIC_POLL_ERROR.to_string()));
            }
        };

        if job.status != status.status {
            log::info!("Job {}: {} -> {} ({:.0}%)", job_id, job.status, status.status, status.progress);
        }

        let update = separation_update(job, &status);
        if !status.status.is_terminal() {
            app.update_separation_job(job_id, &update);
            return None;
        }

        let mut finished = job.clone();
        update.apply(&mut finished);
        let outcome = match finished.status {
            JobStatus::Completed => {
                log::info!("Job {} completed with {} tracks", job_id, finished.tracks.len());
                PollOutcome::Completed
            }
            _ => {
                let message = finished.error.clone().unwrap_or_default();
                log::warn!("Job {} failed: {}", job_id, message);
                PollOutcome::Failed(message)
            }
        };
        app.replace_separation_job(finished);
        Some(outcome)
    }

    /// Poll a mashup job until it completes, fails or is cancelled.
    pub async fn run_mashup(&self, job_id: &str, guard: &PollGuard) -> PollOutcome {
        log::info!("Polling mashup job {} every {:?}", job_id, self.interval);

        loop {
            if !guard.is_alive() || store::lock(&self.store).mashup_job_mut(job_id).is_none() {
                log::info!("Polling of mashup {} cancelled", job_id);
                return PollOutcome::Cancelled;
            }

            let result = self.source.mashup_status(job_id).await;

            if !guard.is_alive() {
                log::debug!("Dropping late status for cancelled mashup {}", job_id);
                return PollOutcome::Cancelled;
            }

            if let Some(outcome) = self.commit_mashup(job_id, result) {
                return outcome;
            }

            guard.sleep(self.interval).await;
        }
    }

    fn commit_mashup(
        &self,
        job_id: &str,
        result: ApiResult<MashupStatusResponse>,
    ) -> Option<PollOutcome> {
        let mut app = store::lock(&self.store);
        let Some(job) = app.mashup_job_mut(job_id) else {
            return Some(PollOutcome::Cancelled);
        };

        let status = match result {
            Ok(status) => status,
            Err(e) => {
                log::error!("Status poll for mashup {} failed, giving up: {}", job_id, e);
                job.status = JobStatus::Failed;
                job.error = Some(GENERIC_POLL_ERROR.to_string());
                return Some(PollOutcome::Failed(GENERIC_POLL_ERROR.to_string()));
            }
        };

        apply_mashup_status(job, &status);
        match job.status {
            JobStatus::Completed => {
                log::info!("Mashup {} ready: {:?}", job_id, job.result_url);
                Some(PollOutcome::Completed)
            }
            JobStatus::Failed => {
                let message = job.error.clone().unwrap_or_default();
                log::warn!("Mashup {} failed: {}", job_id, message);
                Some(PollOutcome::Failed(message))
            }
            _ => None,
        }
    }

    pub fn spawn_separation(&self, job_id: &str) -> PollHandle {
        let guard = PollGuard::new();
        let poller = self.clone();
        let task_guard = guard.clone();
        let job_id = job_id.to_string();
        let task = tokio::spawn(async move { poller.run_separation(&job_id, &task_guard).await });
        PollHandle {
            guard,
            task: Some(task),
        }
    }

    pub fn spawn_mashup(&self, job_id: &str) -> PollHandle {
        let guard = PollGuard::new();
        let poller = self.clone();
        let task_guard = guard.clone();
        let job_id = job_id.to_string();
        let task = tokio::spawn(async move { poller.run_mashup(&job_id, &task_guard).await });
        PollHandle {
            guard,
            task: Some(task),
        }
    }
}
