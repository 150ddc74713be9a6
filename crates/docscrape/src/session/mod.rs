//! The scrape session: one job, first page to terminal outcome.

pub mod dedup;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::time;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::broadcast::{JobPhase, JobProgressEvent, ProgressReporter};
use crate::error::{FetchError, ScrapeError};
use crate::fetcher::{FetchTarget, FetcherFactory, PageFetcher};
use crate::record::Record;
use crate::retry::RetryPolicy;
use crate::site::{extract_records, SearchSite};
use crate::storage::ResultSink;
use crate::worker::job::{Job, JobOutcome, DEFAULT_PAGE_LIMIT};

pub use dedup::{DedupFilter, DedupPolicy};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Page ceiling given to every admitted job.
    pub page_limit: u32,
    /// Retry budget for a single page.
    pub retry: RetryPolicy,
    /// Upper bound on one fetch, retries excluded.
    pub fetch_timeout: Duration,
    pub dedup: DedupPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            page_limit: DEFAULT_PAGE_LIMIT,
            retry: RetryPolicy::default(),
            fetch_timeout: Duration::from_secs(60),
            dedup: DedupPolicy::default(),
        }
    }
}

/// The job as the session left it, plus how it ended.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub job: Job,
    pub outcome: JobOutcome,
}

/// Drives one job across the site's pagination.
///
/// Sessions share nothing but the factory and the sink; each one acquires its
/// own fetcher, so no pagination state crosses jobs. The session only moves
/// the job's counters. Status belongs to the orchestrator.
#[derive(Clone)]
pub struct ScrapeSession {
    site: Arc<SearchSite>,
    fetchers: Arc<dyn FetcherFactory>,
    sink: Arc<dyn ResultSink>,
    config: SessionConfig,
    progress: Arc<dyn ProgressReporter>,
}

impl ScrapeSession {
    pub fn new(
        site: Arc<SearchSite>,
        fetchers: Arc<dyn FetcherFactory>,
        sink: Arc<dyn ResultSink>,
        config: SessionConfig,
        progress: Arc<dyn ProgressReporter>,
    ) -> Self {
        Self {
            site,
            fetchers,
            sink,
            config,
            progress,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn sink(&self) -> &Arc<dyn ResultSink> {
        &self.sink
    }

    pub async fn run(&self, mut job: Job) -> SessionReport {
        let span = info_span!(
            "scrape_session",
            job_id = %job.id,
            run_id = %job.run_id,
            document_type = %job.query.label()
        );
        let outcome = self.run_job(&mut job).instrument(span).await;
        SessionReport { job, outcome }
    }

    async fn run_job(&self, job: &mut Job) -> JobOutcome {
        let artifact = match self.sink.begin(job) {
            Ok(path) => path,
            Err(e) => {
                warn!("Could not open result artifact for job {}: {}", job.id, e);
                return JobOutcome::Failed {
                    error: ScrapeError::from(e).to_string(),
                    partial_path: None,
                };
            }
        };
        debug!("Writing results for job {} to {}", job.id, artifact.display());

        let result = self.scrape(job).await;
        let path = self.sink.finish(&job.id).unwrap_or(artifact);

        match result {
            Ok(()) => {
                info!(
                    "Job {} finished: {} records over {} pages",
                    job.id, job.records_found, job.pages_fetched
                );
                JobOutcome::Complete { result_path: path }
            }
            Err(e) => {
                warn!(
                    "Job {} failed after {} pages ({} records kept): {}",
                    job.id, job.pages_fetched, job.records_found, e
                );
                JobOutcome::Failed {
                    error: e.to_string(),
                    partial_path: Some(path),
                }
            }
        }
    }

    /// Acquires a fetcher, paginates, and releases the fetcher on every path.
    async fn scrape(&self, job: &mut Job) -> Result<(), ScrapeError> {
        let search_url = self.site.search_url(&job.query)?;
        let mut fetcher = self
            .fetchers
            .acquire()
            .await
            .map_err(ScrapeError::Acquire)?;

        // A panic in a fetch or in extraction still releases the fetcher
        // before it reaches the pool.
        let result = AssertUnwindSafe(self.paginate(
            job,
            fetcher.as_mut(),
            FetchTarget::Url(search_url),
        ))
        .catch_unwind()
        .await;
        fetcher.release().await;
        result.unwrap_or_else(|payload| panic::resume_unwind(payload))
    }

    async fn paginate(
        &self,
        job: &mut Job,
        fetcher: &mut dyn PageFetcher,
        first: FetchTarget,
    ) -> Result<(), ScrapeError> {
        let mut target = first;
        let mut dedup = DedupFilter::new(self.config.dedup);

        while job.pages_fetched < job.page_limit {
            let page = job.pages_fetched + 1;
            let (records, has_next) = self
                .fetch_page(job, fetcher, &target, page)
                .instrument(info_span!("page", page))
                .await?;
            job.pages_fetched = page;

            if records.is_empty() {
                info!("Page {} returned no records, end of results", page);
                self.report(job, JobPhase::PageFetched, format!("Page {} empty, done", page));
                return Ok(());
            }

            let extracted = records.len();
            let records = dedup.retain_new(records);
            if records.len() < extracted {
                debug!(
                    "Dropped {} duplicate records on page {}",
                    extracted - records.len(),
                    page
                );
            }
            job.records_found += self.sink.write(&job.id, &records)?;
            self.report(
                job,
                JobPhase::PageFetched,
                format!("Page {}: {} records", page, records.len()),
            );

            if !has_next {
                debug!("No next page after page {}", page);
                return Ok(());
            }
            target = FetchTarget::Next;
        }

        info!("Reached page limit of {} for job {}", job.page_limit, job.id);
        Ok(())
    }

    /// Fetches and extracts one page, retrying transient failures.
    async fn fetch_page(
        &self,
        job: &Job,
        fetcher: &mut dyn PageFetcher,
        target: &FetchTarget,
        page: u32,
    ) -> Result<(Vec<Record>, bool), ScrapeError> {
        let policy = self.config.retry;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let result = match time::timeout(self.config.fetch_timeout, fetcher.fetch(target)).await {
                Ok(fetched) => fetched,
                Err(_) => Err(FetchError::Timeout(self.config.fetch_timeout)),
            }
            .and_then(|fetched| {
                extract_records(&fetched.content, &job.query.document_type, &self.site)
                    .map(|records| (records, fetched.has_next))
            });

            let err = match result {
                Ok(page_result) => return Ok(page_result),
                Err(e) => e,
            };

            if !err.is_retryable() {
                return Err(ScrapeError::FetchFatal { page, source: err });
            }
            if attempt >= policy.max_attempts() {
                return Err(ScrapeError::FetchTransient {
                    page,
                    attempts: attempt,
                    source: err,
                });
            }

            let delay = policy.delay_for(attempt);
            warn!(
                "Page {} attempt {}/{} failed: {}. Retrying in {:?}",
                page,
                attempt,
                policy.max_attempts(),
                err,
                delay
            );
            self.report(
                job,
                JobPhase::Retrying,
                format!("Page {} attempt {} failed: {}", page, attempt, err),
            );
            time::sleep(delay).await;
        }
    }

    fn report(&self, job: &Job, phase: JobPhase, message: String) {
        self.progress
            .report(JobProgressEvent::for_job(job, phase, message));
    }
}
