//! The status store: the spreadsheet as the orchestrator sees it.
//!
//! Rows carry a job id, a status cell and the search criteria. The
//! orchestrator reads the whole table every poll and writes back one row at a
//! time; nothing else in the crate touches it.

pub mod file;
pub mod memory;

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StatusStoreError;
use crate::worker::job::{Job, JobStatus, QueryParameters};

pub use file::JsonFileStatusStore;
pub use memory::InMemoryStatusStore;

/// One row of the status store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRow {
    pub id: String,
    #[serde(with = "status_cell")]
    pub status: JobStatus,
    #[serde(rename = "query")]
    pub query_parameters: QueryParameters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusRow {
    pub fn new(id: impl Into<String>, status: JobStatus, query_parameters: QueryParameters) -> Self {
        Self {
            id: id.into(),
            status,
            query_parameters,
            result_path: None,
            error: None,
        }
    }
}

/// Extra columns written alongside a status change.
///
/// Every write replaces both columns, so a rerun never shows the previous
/// run's artifact or error next to its own status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusDetail {
    /// Artifact file name inside the results directory.
    pub result_path: Option<String>,
    pub error: Option<String>,
}

impl StatusDetail {
    pub fn none() -> Self {
        Self::default()
    }

    /// Terminal columns for a finished job. Only the artifact's file name is
    /// kept; `CsvResultSink::artifact_path` resolves it again.
    pub fn for_job(job: &Job) -> Self {
        Self {
            result_path: job
                .result_path
                .as_deref()
                .and_then(Path::file_name)
                .map(|name| name.to_string_lossy().into_owned()),
            error: job.error.clone(),
        }
    }

    pub fn apply_to(&self, row: &mut StatusRow) {
        row.result_path = self.result_path.clone();
        row.error = self.error.clone();
    }
}

#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Full snapshot of every row.
    async fn list_rows(&self) -> Result<Vec<StatusRow>, StatusStoreError>;

    /// Writes one row's status (plus optional result path / error).
    async fn set_status(
        &self,
        id: &str,
        status: JobStatus,
        detail: StatusDetail,
    ) -> Result<(), StatusStoreError>;
}

/// Status cells are free text in the sheet; read leniently, write canonically.
/// A cell that names no status rejects its row, not the whole sheet.
mod status_cell {
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::worker::job::JobStatus;

    pub fn serialize<S>(status: &JobStatus, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(status.as_str())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<JobStatus, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        JobStatus::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown status '{}'", raw)))
    }
}
