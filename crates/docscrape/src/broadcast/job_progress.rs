//! Job progress broadcaster for real-time job status streaming.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::worker::job::{Job, JobStatus};

/// Step of a job's life that an event reports.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Queued,
    Running,
    PageFetched,
    Retrying,
    Completed,
    Failed,
    /// The terminal status could not be written back to the status store.
    StatusSyncFailed,
}

impl std::fmt::Display for JobPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobPhase::Queued => write!(f, "Queued"),
            JobPhase::Running => write!(f, "Running"),
            JobPhase::PageFetched => write!(f, "Page fetched"),
            JobPhase::Retrying => write!(f, "Retrying"),
            JobPhase::Completed => write!(f, "Completed"),
            JobPhase::Failed => write!(f, "Failed"),
            JobPhase::StatusSyncFailed => write!(f, "Status sync failed"),
        }
    }
}

/// Progress event for a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgressEvent {
    /// Status store row id.
    pub job_id: String,
    /// Admission this event belongs to.
    pub run_id: String,
    pub document_type: String,
    pub phase: JobPhase,
    /// In-memory job status at the time of the event.
    pub status: JobStatus,
    /// Human-readable message describing current activity.
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub pages_fetched: u32,
    pub records_found: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobProgressEvent {
    /// Snapshot of `job` tagged with a phase and message.
    pub fn for_job(job: &Job, phase: JobPhase, message: impl Into<String>) -> Self {
        Self {
            job_id: job.id.clone(),
            run_id: job.run_id.clone(),
            document_type: job.query.document_type.clone(),
            phase,
            status: job.status,
            message: message.into(),
            timestamp: Utc::now(),
            pages_fetched: job.pages_fetched,
            records_found: job.records_found,
            result_path: job.result_path.as_ref().map(|p| p.display().to_string()),
            error: job.error.clone(),
        }
    }
}

/// Broadcasts job progress events for streaming.
#[derive(Clone)]
pub struct JobProgressBroadcaster {
    sender: Arc<broadcast::Sender<JobProgressEvent>>,
}

impl JobProgressBroadcaster {
    /// Creates a new job progress broadcaster with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Sends a progress event to all subscribers.
    pub fn send(&self, event: JobProgressEvent) {
        // No active receivers is fine
        let _ = self.sender.send(event);
    }

    /// Creates a new subscriber for progress events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobProgressEvent> {
        self.sender.subscribe()
    }
}

impl Default for JobProgressBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}
