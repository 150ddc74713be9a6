pub mod csv;
pub mod filesystem;

use std::path::PathBuf;

use crate::error::SinkError;
use crate::record::Record;
use crate::worker::job::Job;

pub use filesystem::{ArtifactInfo, CsvResultSink};

/// Durable per-job record store.
///
/// A job has a single writer (its scrape session), so implementations only
/// need sequential append semantics per job id.
pub trait ResultSink: Send + Sync {
    /// Creates the job's artifact (header only) and returns its path.
    fn begin(&self, job: &Job) -> Result<PathBuf, SinkError>;

    /// Appends records to the job's artifact, returning how many were written.
    fn write(&self, job_id: &str, records: &[Record]) -> Result<usize, SinkError>;

    /// Closes the job's artifact and returns its path, if one was opened.
    fn finish(&self, job_id: &str) -> Option<PathBuf>;
}
