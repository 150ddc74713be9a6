//! The job orchestrator: admission, concurrency and status reconciliation.
//!
//! The orchestrator is the only writer of `Running`, `Complete` and `Failed`
//! to the status store. It polls on a fixed interval, queues every new `Start`
//! row, dispatches queued jobs into the worker pool as slots free up, and
//! writes the terminal status back when a session reports.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::{broadcast, watch};
use tokio::time::{self, MissedTickBehavior};
use tracing::{info_span, Instrument};

use crate::broadcast::{
    BoardProgress, JobBoard, JobPhase, JobProgressBroadcaster, JobProgressEvent, JobSnapshot,
    ProgressReporter,
};
use crate::error::StatusStoreError;
use crate::fetcher::FetcherFactory;
use crate::retry::RetryPolicy;
use crate::session::{ScrapeSession, SessionConfig, SessionReport};
use crate::site::SearchSite;
use crate::status::{StatusDetail, StatusStore};
use crate::storage::ResultSink;
use crate::worker::job::{Job, JobStatus};
use crate::worker::pool::WorkerPool;
use crate::worker::registry::JobRegistry;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub poll_interval: Duration,
    pub max_concurrent_jobs: usize,
    /// Backoff for status store writes.
    pub status_retry: RetryPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            max_concurrent_jobs: 3,
            status_retry: RetryPolicy::new(3, Duration::from_millis(500), Duration::from_secs(8)),
        }
    }
}

pub struct Orchestrator {
    config: OrchestratorConfig,
    store: Arc<dyn StatusStore>,
    session: ScrapeSession,
    registry: JobRegistry,
    pool: WorkerPool,
    progress: BoardProgress,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        store: Arc<dyn StatusStore>,
        site: Arc<SearchSite>,
        fetchers: Arc<dyn FetcherFactory>,
        sink: Arc<dyn ResultSink>,
        session_config: SessionConfig,
    ) -> Self {
        let progress = BoardProgress::new(
            Arc::new(JobBoard::default()),
            JobProgressBroadcaster::default(),
        );
        let session = ScrapeSession::new(
            site,
            fetchers,
            sink,
            session_config,
            Arc::new(progress.clone()),
        );

        Self {
            pool: WorkerPool::new(config.max_concurrent_jobs),
            config,
            store,
            session,
            registry: JobRegistry::new(),
            progress,
        }
    }

    pub fn board(&self) -> Arc<JobBoard> {
        Arc::clone(self.progress.board())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobProgressEvent> {
        self.progress.broadcaster().subscribe()
    }

    /// Current snapshot of a job, including jobs already written back.
    pub fn status(&self, job_id: &str) -> Option<JobSnapshot> {
        self.progress.board().get(job_id)
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Number of sessions currently running.
    pub fn active_sessions(&self) -> usize {
        self.pool.active()
    }

    /// One poll cycle: retry pending write-backs, read the store, admit new
    /// `Start` rows and dispatch what fits.
    ///
    /// A failed read skips admission for this cycle. Returns the number of
    /// jobs admitted.
    pub async fn poll(&mut self) -> Result<usize, StatusStoreError> {
        let span = info_span!("poll_cycle", active = self.registry.len());
        async {
            self.reconcile_unsynced().await;

            let rows = match self.store.list_rows().await {
                Ok(rows) => rows,
                Err(e) => {
                    warn!("Could not read status store, skipping this cycle: {}", e);
                    return Err(e);
                }
            };

            let mut admitted = 0;
            for row in rows {
                if row.status != JobStatus::Start {
                    continue;
                }
                if self.registry.contains(&row.id) {
                    debug!("Job {} is already active, not re-admitting", row.id);
                    continue;
                }
                let job = Job::new(
                    row.id,
                    row.query_parameters,
                    self.session.config().page_limit,
                );
                if self.submit(job).await {
                    admitted += 1;
                }
            }

            if admitted > 0 {
                info!(
                    "Admitted {} jobs ({} queued, {} running)",
                    admitted,
                    self.registry.queued(),
                    self.pool.active()
                );
            }
            Ok(admitted)
        }
        .instrument(span)
        .await
    }

    /// Queues a job and dispatches it if a slot is free.
    ///
    /// Returns false if a job with the same id is already active.
    pub async fn submit(&mut self, job: Job) -> bool {
        let queued = JobProgressEvent::for_job(&job, JobPhase::Queued, "Job queued");
        if !self.registry.admit(job) {
            return false;
        }
        self.progress.report(queued);
        self.dispatch_ready().await;
        true
    }

    /// Moves queued jobs into the pool while it has free slots.
    ///
    /// The `Running` status is written here, at dispatch time, so a job that
    /// is merely queued never shows as running.
    pub async fn dispatch_ready(&mut self) -> usize {
        let mut dispatched = 0;

        while self.pool.has_capacity() {
            let Some(mut job) = self.registry.dispatch_next() else {
                break;
            };
            // A requeued job is already Running.
            if job.status != JobStatus::Running {
                if let Err(e) = job.transition_to(JobStatus::Running) {
                    error!("{}", e);
                    self.registry.remove(&job.id);
                    continue;
                }
            }

            let written =
                write_status(self.store.as_ref(), self.config.status_retry, &job, StatusDetail::none())
                    .await;
            match written {
                Ok(()) => {}
                Err(StatusStoreError::RowNotFound(id)) => {
                    warn!("Row {} disappeared from the status store, dropping job", id);
                    self.registry.remove(&job.id);
                    continue;
                }
                Err(e) => warn!(
                    "Could not mark job {} Running in the status store: {}",
                    job.id, e
                ),
            }

            self.progress.report(JobProgressEvent::for_job(
                &job,
                JobPhase::Running,
                "Scrape session started",
            ));

            let session = self.session.clone();
            if let Err(job) = self
                .pool
                .try_spawn(job, move |job| async move { session.run(job).await })
            {
                self.registry.requeue(job);
                break;
            }
            dispatched += 1;
        }

        dispatched
    }

    /// Applies a session's outcome and writes the terminal status back.
    ///
    /// If the write keeps failing the job stays registered as unreconciled;
    /// the store keeps its last written status until a later poll succeeds.
    pub async fn on_complete(&mut self, report: SessionReport) {
        let SessionReport { mut job, outcome } = report;

        if !self.registry.is_running(&job.id, &job.run_id) {
            warn!("Ignoring report for job {} (run {}) that is not running", job.id, job.run_id);
            return;
        }
        if let Err(e) = job.transition_to(outcome.status()) {
            error!("{}", e);
        }
        // A panicked session never closed its artifact; surface it as partial output.
        job.result_path = outcome
            .result_path()
            .cloned()
            .or_else(|| self.session.sink().finish(&job.id));
        job.error = outcome.error().map(str::to_string);

        let (phase, message) = match job.status {
            JobStatus::Complete => (JobPhase::Completed, "Job complete".to_string()),
            _ => (
                JobPhase::Failed,
                format!("Job failed: {}", job.error.as_deref().unwrap_or("unknown error")),
            ),
        };
        self.progress
            .report(JobProgressEvent::for_job(&job, phase, message));

        self.write_back(job, false).await;
    }

    /// Polls until `shutdown` flips to true, then drains running sessions.
    ///
    /// Queued jobs that never started keep their `Start` row and are picked
    /// up again on the next run.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Orchestrator started: polling every {:?}, up to {} concurrent jobs",
            self.config.poll_interval,
            self.pool.capacity()
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // Errors are logged inside; the next tick retries.
                    let _ = self.poll().await;
                }
                Some(report) = self.pool.next_result(), if !self.pool.is_idle() => {
                    self.on_complete(report).await;
                    self.dispatch_ready().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(
            "Shutting down: waiting for {} running sessions, {} queued jobs left for the next run",
            self.pool.active(),
            self.registry.queued()
        );
        self.drain().await;
        info!("Orchestrator stopped");
    }

    /// One sync pass: poll once, then run until queue and pool are empty.
    pub async fn run_until_idle(&mut self) -> Result<(), StatusStoreError> {
        self.poll().await?;
        while let Some(report) = self.pool.next_result().await {
            self.on_complete(report).await;
            self.dispatch_ready().await;
        }
        self.reconcile_unsynced().await;

        let unsynced = self.registry.unreconciled();
        if unsynced > 0 {
            warn!("{} jobs finished but their status could not be written", unsynced);
        }
        Ok(())
    }

    async fn drain(&mut self) {
        while let Some(report) = self.pool.next_result().await {
            self.on_complete(report).await;
        }
        self.reconcile_unsynced().await;
    }

    /// Retries terminal writes that failed on earlier cycles, once each.
    async fn reconcile_unsynced(&mut self) {
        for job in self.registry.take_unreconciled() {
            debug!("Retrying status write-back for job {}", job.id);
            self.write_back(job, true).await;
        }
    }

    async fn write_back(&mut self, job: Job, retrying: bool) {
        let detail = StatusDetail::for_job(&job);
        let result = if retrying {
            self.store.set_status(&job.id, job.status, detail).await
        } else {
            write_status(self.store.as_ref(), self.config.status_retry, &job, detail).await
        };

        match result {
            Ok(()) => {
                if retrying {
                    info!("Status of job {} written back as {}", job.id, job.status);
                    self.progress.board().mark_synced(&job.id, &job.run_id);
                }
                self.registry.remove(&job.id);
            }
            Err(StatusStoreError::RowNotFound(id)) => {
                warn!("Row {} disappeared from the status store, dropping job", id);
                self.registry.remove(&job.id);
            }
            Err(e) => {
                error!(
                    "Job {} ended {} but the status store was not updated: {}",
                    job.id, job.status, e
                );
                if !retrying {
                    self.progress.report(JobProgressEvent::for_job(
                        &job,
                        JobPhase::StatusSyncFailed,
                        format!("Status write failed: {}", e),
                    ));
                }
                self.registry.park_unreconciled(job);
            }
        }
    }
}

/// `set_status` with bounded exponential backoff. A missing row is not retried.
async fn write_status(
    store: &dyn StatusStore,
    policy: RetryPolicy,
    job: &Job,
    detail: StatusDetail,
) -> Result<(), StatusStoreError> {
    let mut attempt = 0;

    loop {
        attempt += 1;
        match store.set_status(&job.id, job.status, detail.clone()).await {
            Ok(()) => return Ok(()),
            Err(e @ StatusStoreError::RowNotFound(_)) => return Err(e),
            Err(e) if attempt >= policy.max_attempts() => return Err(e),
            Err(e) => {
                let delay = policy.delay_for(attempt);
                warn!(
                    "Status write for job {} failed (attempt {}/{}): {}. Retrying in {:?}",
                    job.id,
                    attempt,
                    policy.max_attempts(),
                    e,
                    delay
                );
                time::sleep(delay).await;
            }
        }
    }
}
