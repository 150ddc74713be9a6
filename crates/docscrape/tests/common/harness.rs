//! Scripted fakes and the orchestrator test harness.
//!
//! The fakes stand in for the three external collaborators:
//! - `ScriptedFetcherFactory` serves per-document-type page scripts and
//!   records how many fetchers are alive at once
//! - `FlakyStatusStore` is an in-memory sheet whose reads and writes can be
//!   made to fail on demand
//! - `FailingSink` is a CSV sink that starts failing after N page writes

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::Semaphore;

use docscrape::error::{FetchError, SinkError, StatusStoreError};
use docscrape::fetcher::{FetchTarget, FetchedPage, FetcherFactory, PageFetcher};
use docscrape::record::Record;
use docscrape::retry::RetryPolicy;
use docscrape::session::{DedupPolicy, SessionConfig};
use docscrape::site::SearchSite;
use docscrape::status::{InMemoryStatusStore, StatusDetail, StatusRow, StatusStore};
use docscrape::storage::{CsvResultSink, ResultSink};
use docscrape::worker::{Job, JobStatus, Orchestrator, OrchestratorConfig};

use super::builders::results_page;

/// One scripted response of a fake fetcher.
#[derive(Clone)]
pub enum Step {
    Page(FetchedPage),
    Fail(FetchError),
    Panic,
}

struct FactoryState {
    scripts: Mutex<HashMap<String, Vec<Step>>>,
    gate: Semaphore,
    gated: AtomicBool,
    active: AtomicUsize,
    max_active: AtomicUsize,
    acquired: AtomicUsize,
    released: AtomicUsize,
    fetches: AtomicUsize,
}

impl Default for FactoryState {
    fn default() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            gate: Semaphore::new(0),
            gated: AtomicBool::new(false),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            acquired: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
        }
    }
}

/// Hands out fetchers that replay a script chosen by the search's document type.
///
/// Unscripted document types get a single one-record page.
#[derive(Clone, Default)]
pub struct ScriptedFetcherFactory {
    state: Arc<FactoryState>,
}

impl ScriptedFetcherFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, document_type: &str, steps: Vec<Step>) {
        self.state
            .scripts
            .lock()
            .unwrap()
            .insert(document_type.to_string(), steps);
    }

    /// Makes every fetch wait until `open_gate` is called.
    pub fn close_gate(&self) {
        self.state.gated.store(true, Ordering::SeqCst);
    }

    pub fn open_gate(&self) {
        self.state.gated.store(false, Ordering::SeqCst);
        self.state.gate.add_permits(1_000);
    }

    pub fn active(&self) -> usize {
        self.state.active.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.state.max_active.load(Ordering::SeqCst)
    }

    pub fn acquired(&self) -> usize {
        self.state.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.state.released.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        self.state.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FetcherFactory for ScriptedFetcherFactory {
    async fn acquire(&self) -> Result<Box<dyn PageFetcher>, FetchError> {
        let active = self.state.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_active.fetch_max(active, Ordering::SeqCst);
        self.state.acquired.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(ScriptedFetcher {
            state: Arc::clone(&self.state),
            steps: None,
        }))
    }
}

struct ScriptedFetcher {
    state: Arc<FactoryState>,
    steps: Option<VecDeque<Step>>,
}

impl ScriptedFetcher {
    fn load_script(&mut self, target: &FetchTarget) {
        if self.steps.is_some() {
            return;
        }
        let document_type = match target {
            FetchTarget::Url(url) => url
                .query_pairs()
                .find(|(k, _)| k == "doctype")
                .map(|(_, v)| v.to_string())
                .unwrap_or_default(),
            FetchTarget::Next => String::new(),
        };
        let steps = self
            .state
            .scripts
            .lock()
            .unwrap()
            .get(&document_type)
            .cloned()
            .unwrap_or_else(|| vec![Step::Page(results_page(&["DEFAULT-1"], false))]);
        self.steps = Some(steps.into());
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch(&mut self, target: &FetchTarget) -> Result<FetchedPage, FetchError> {
        if self.state.gated.load(Ordering::SeqCst) {
            drop(self.state.gate.acquire().await.unwrap());
        }
        self.state.fetches.fetch_add(1, Ordering::SeqCst);
        self.load_script(target);

        let step = self.steps.as_mut().and_then(|steps| steps.pop_front());
        match step {
            Some(Step::Page(page)) => Ok(page),
            Some(Step::Fail(err)) => Err(err),
            Some(Step::Panic) => panic!("scripted fetcher panic"),
            None => Err(FetchError::Fatal("script exhausted".to_string())),
        }
    }

    async fn release(self: Box<Self>) {
        self.state.active.fetch_sub(1, Ordering::SeqCst);
        self.state.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// In-memory status store with injectable failures.
#[derive(Default)]
pub struct FlakyStatusStore {
    inner: InMemoryStatusStore,
    fail_reads: AtomicUsize,
    fail_writes: AtomicUsize,
    writes: Mutex<Vec<(String, JobStatus)>>,
}

impl FlakyStatusStore {
    pub fn new(rows: Vec<StatusRow>) -> Self {
        Self {
            inner: InMemoryStatusStore::new(rows),
            ..Self::default()
        }
    }

    /// Fails the next `n` calls to `list_rows`.
    pub fn fail_reads(&self, n: usize) {
        self.fail_reads.store(n, Ordering::SeqCst);
    }

    /// Fails the next `n` calls to `set_status`.
    pub fn fail_writes(&self, n: usize) {
        self.fail_writes.store(n, Ordering::SeqCst);
    }

    pub fn upsert(&self, row: StatusRow) {
        self.inner.upsert(row);
    }

    pub fn row(&self, id: &str) -> StatusRow {
        self.inner.get(id).unwrap()
    }

    pub fn status(&self, id: &str) -> JobStatus {
        self.row(id).status
    }

    pub fn count(&self, status: JobStatus) -> usize {
        self.inner
            .snapshot()
            .iter()
            .filter(|r| r.status == status)
            .count()
    }

    /// Successful writes for one row, in order.
    pub fn writes_for(&self, id: &str) -> Vec<JobStatus> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .filter(|(row, _)| row == id)
            .map(|(_, status)| *status)
            .collect()
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl StatusStore for FlakyStatusStore {
    async fn list_rows(&self) -> Result<Vec<StatusRow>, StatusStoreError> {
        if Self::take_failure(&self.fail_reads) {
            return Err(StatusStoreError::Unavailable("sheet read quota".to_string()));
        }
        self.inner.list_rows().await
    }

    async fn set_status(
        &self,
        id: &str,
        status: JobStatus,
        detail: StatusDetail,
    ) -> Result<(), StatusStoreError> {
        if Self::take_failure(&self.fail_writes) {
            return Err(StatusStoreError::Unavailable("sheet write quota".to_string()));
        }
        self.inner.set_status(id, status, detail).await?;
        self.writes.lock().unwrap().push((id.to_string(), status));
        Ok(())
    }
}

/// CSV sink whose page writes fail once `allowed_writes` have succeeded.
pub struct FailingSink {
    inner: CsvResultSink,
    allowed_writes: usize,
    writes: AtomicUsize,
}

impl FailingSink {
    pub fn new<P: AsRef<Path>>(results_directory: P, allowed_writes: usize) -> Self {
        Self {
            inner: CsvResultSink::new(results_directory),
            allowed_writes,
            writes: AtomicUsize::new(0),
        }
    }
}

impl ResultSink for FailingSink {
    fn begin(&self, job: &Job) -> Result<PathBuf, SinkError> {
        self.inner.begin(job)
    }

    fn write(&self, job_id: &str, records: &[Record]) -> Result<usize, SinkError> {
        if self.writes.fetch_add(1, Ordering::SeqCst) >= self.allowed_writes {
            return Err(SinkError::WriteFile {
                path: PathBuf::from(format!("{}.csv", job_id)),
                source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            });
        }
        self.inner.write(job_id, records)
    }

    fn finish(&self, job_id: &str) -> Option<PathBuf> {
        self.inner.finish(job_id)
    }
}

/// Isolated environment: a temp results directory, a fake sheet and fake fetchers.
pub struct TestHarness {
    temp_dir: TempDir,
    pub results_dir: PathBuf,
    pub store: Arc<FlakyStatusStore>,
    pub fetchers: ScriptedFetcherFactory,
    pub dedup: DedupPolicy,
}

impl TestHarness {
    pub fn new(rows: Vec<StatusRow>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let results_dir = temp_dir.path().join("results");

        Self {
            temp_dir,
            results_dir,
            store: Arc::new(FlakyStatusStore::new(rows)),
            fetchers: ScriptedFetcherFactory::new(),
            dedup: DedupPolicy::None,
        }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Page retries: 3 attempts, millisecond backoff.
    pub fn session_config(&self, page_limit: u32) -> SessionConfig {
        SessionConfig {
            page_limit,
            retry: RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(4)),
            fetch_timeout: Duration::from_secs(5),
            dedup: self.dedup,
        }
    }

    /// Status writes: 2 attempts, millisecond backoff.
    pub fn orchestrator_config(&self, max_concurrent_jobs: usize) -> OrchestratorConfig {
        OrchestratorConfig {
            poll_interval: Duration::from_millis(20),
            max_concurrent_jobs,
            status_retry: RetryPolicy::new(1, Duration::from_millis(1), Duration::from_millis(2)),
        }
    }

    pub fn orchestrator(&self, max_concurrent_jobs: usize, page_limit: u32) -> Orchestrator {
        let sink = Arc::new(CsvResultSink::new(&self.results_dir));
        self.orchestrator_with_sink(max_concurrent_jobs, page_limit, sink)
    }

    pub fn orchestrator_with_sink(
        &self,
        max_concurrent_jobs: usize,
        page_limit: u32,
        sink: Arc<dyn ResultSink>,
    ) -> Orchestrator {
        Orchestrator::new(
            self.orchestrator_config(max_concurrent_jobs),
            Arc::clone(&self.store) as Arc<dyn StatusStore>,
            Arc::new(SearchSite::default()),
            Arc::new(self.fetchers.clone()),
            sink,
            self.session_config(page_limit),
        )
    }

    /// Records in the artifact the store row names.
    pub fn records_for(&self, id: &str) -> Vec<Record> {
        let name = self
            .store
            .row(id)
            .result_path
            .unwrap_or_else(|| panic!("row {} has no result path", id));
        let path = CsvResultSink::new(&self.results_dir)
            .artifact_path(&name)
            .unwrap();
        CsvResultSink::read_records(path).unwrap()
    }
}
