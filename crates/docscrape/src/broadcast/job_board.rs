//! In-memory job board: the status query behind the dashboard.
//!
//! Keeps the latest snapshot of every job id seen since startup, including
//! jobs already dropped by the orchestrator, plus a bounded progress log.

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::broadcast::job_progress::{JobPhase, JobProgressEvent};
use crate::worker::job::JobStatus;

const DEFAULT_LOG_CAPACITY: usize = 200;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEntry {
    pub time: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub job_id: String,
    pub run_id: String,
    pub document_type: String,
    pub status: JobStatus,
    pub phase: JobPhase,
    pub pages_fetched: u32,
    pub records_found: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub queued_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// False while a terminal status is still waiting to reach the status store.
    pub status_synced: bool,
    pub progress: VecDeque<ProgressEntry>,
}

impl JobSnapshot {
    fn from_event(event: &JobProgressEvent) -> Self {
        Self {
            job_id: event.job_id.clone(),
            run_id: event.run_id.clone(),
            document_type: event.document_type.clone(),
            status: event.status,
            phase: event.phase,
            pages_fetched: event.pages_fetched,
            records_found: event.records_found,
            result_path: event.result_path.clone(),
            error: event.error.clone(),
            queued_at: event.timestamp,
            updated_at: event.timestamp,
            completed_at: None,
            status_synced: true,
            progress: VecDeque::new(),
        }
    }

    fn update_from_event(&mut self, event: &JobProgressEvent, log_capacity: usize) {
        self.status = event.status;
        self.pages_fetched = event.pages_fetched;
        self.records_found = event.records_found;
        self.updated_at = event.timestamp;

        if event.result_path.is_some() {
            self.result_path = event.result_path.clone();
        }
        if event.error.is_some() {
            self.error = event.error.clone();
        }

        match event.phase {
            JobPhase::StatusSyncFailed => self.status_synced = false,
            phase => {
                self.phase = phase;
                if matches!(phase, JobPhase::Completed | JobPhase::Failed) {
                    self.completed_at = Some(event.timestamp);
                }
            }
        }

        self.progress.push_back(ProgressEntry {
            time: event.timestamp,
            message: event.message.clone(),
        });
        while self.progress.len() > log_capacity {
            self.progress.pop_front();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }
}

pub struct JobBoard {
    jobs: RwLock<HashMap<String, JobSnapshot>>,
    log_capacity: usize,
}

impl JobBoard {
    pub fn new(log_capacity: usize) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            log_capacity: log_capacity.max(1),
        }
    }

    /// Folds an event into the job's snapshot. A new run id replaces the old run.
    pub fn apply(&self, event: &JobProgressEvent) {
        let mut jobs = match self.jobs.write() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Job board lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };

        let snapshot = jobs
            .entry(event.job_id.clone())
            .or_insert_with(|| JobSnapshot::from_event(event));
        if snapshot.run_id != event.run_id {
            *snapshot = JobSnapshot::from_event(event);
        }
        snapshot.update_from_event(event, self.log_capacity);
    }

    /// Marks a terminal status as written after a delayed write-back succeeded.
    pub fn mark_synced(&self, job_id: &str, run_id: &str) {
        if let Ok(mut jobs) = self.jobs.write() {
            if let Some(snapshot) = jobs.get_mut(job_id).filter(|s| s.run_id == run_id) {
                snapshot.status_synced = true;
            }
        }
    }

    pub fn get(&self, job_id: &str) -> Option<JobSnapshot> {
        self.jobs.read().ok()?.get(job_id).cloned()
    }

    /// All known jobs, most recently queued first.
    pub fn list(&self) -> Vec<JobSnapshot> {
        let mut jobs: Vec<JobSnapshot> = match self.jobs.read() {
            Ok(g) => g.values().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().values().cloned().collect(),
        };
        jobs.sort_by(|a, b| b.queued_at.cmp(&a.queued_at));
        jobs
    }

    pub fn count_with_status(&self, status: JobStatus) -> usize {
        self.jobs
            .read()
            .map(|jobs| jobs.values().filter(|j| j.status == status).count())
            .unwrap_or(0)
    }
}

impl Default for JobBoard {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}
