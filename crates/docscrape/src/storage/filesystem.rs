use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use walkdir::WalkDir;

use crate::error::SinkError;
use crate::record::Record;
use crate::sanitize;
use crate::storage::csv::{parse_rows, write_row};
use crate::storage::ResultSink;
use crate::worker::job::Job;

/// A CSV file in the results directory.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactInfo {
    pub filename: String,
    pub size_kb: f64,
    pub modified: DateTime<Utc>,
}

/// Writes one CSV artifact per job run into a results directory.
pub struct CsvResultSink {
    results_directory: PathBuf,
    open: Mutex<HashMap<String, PathBuf>>,
}

impl CsvResultSink {
    pub fn new<P: AsRef<Path>>(results_directory: P) -> Self {
        Self {
            results_directory: results_directory.as_ref().to_path_buf(),
            open: Mutex::new(HashMap::new()),
        }
    }

    pub fn results_directory(&self) -> &Path {
        &self.results_directory
    }

    /// `<document type>_<row id>_<YYYYMMDD_HHMMSS>`, without extension.
    fn artifact_stem(job: &Job) -> String {
        format!(
            "{}_{}_{}",
            sanitize::slugify(job.query.label()),
            sanitize::slugify(&job.id),
            job.admitted_at.format("%Y%m%d_%H%M%S")
        )
    }

    fn ensure_directory(&self) -> Result<(), SinkError> {
        std::fs::create_dir_all(&self.results_directory).map_err(|e| SinkError::CreateDirectory {
            path: self.results_directory.clone(),
            source: e,
        })
    }

    /// Creates a fresh artifact, numbering the name if a file already exists.
    fn create_exclusive(&self, stem: &str) -> Result<(PathBuf, File), SinkError> {
        for counter in 1..=1000 {
            let name = if counter == 1 {
                format!("{}.csv", stem)
            } else {
                format!("{}_{}.csv", stem, counter)
            };
            let path = self.results_directory.join(name);

            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(SinkError::WriteFile { path, source: e }),
            }
        }

        Err(SinkError::InvalidName(format!(
            "too many artifacts named '{}'",
            stem
        )))
    }

    fn lock_open(&self) -> std::sync::MutexGuard<'_, HashMap<String, PathBuf>> {
        match self.open.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Result sink lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Resolves a bare artifact name inside the results directory.
    pub fn artifact_path(&self, name: &str) -> Result<PathBuf, SinkError> {
        if !sanitize::is_plain_file_name(name) {
            return Err(SinkError::InvalidName(name.to_string()));
        }
        Ok(self.results_directory.join(name))
    }

    /// Lists CSV artifacts, newest first.
    pub fn list_artifacts(&self) -> Result<Vec<ArtifactInfo>, SinkError> {
        if !self.results_directory.exists() {
            return Ok(Vec::new());
        }

        let mut artifacts = Vec::new();
        for entry in WalkDir::new(&self.results_directory)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("csv") {
                continue;
            }

            let metadata = entry.metadata().map_err(|e| SinkError::ReadFile {
                path: path.to_path_buf(),
                source: e.into(),
            })?;
            let modified = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());

            artifacts.push(ArtifactInfo {
                filename: entry.file_name().to_string_lossy().to_string(),
                size_kb: (metadata.len() as f64 / 1024.0 * 10.0).round() / 10.0,
                modified,
            });
        }

        artifacts.sort_by(|a, b| b.modified.cmp(&a.modified));
        Ok(artifacts)
    }

    /// Reads an artifact back into records, skipping the header row.
    pub fn read_records<P: AsRef<Path>>(path: P) -> Result<Vec<Record>, SinkError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| SinkError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;

        let rows = parse_rows(&text).map_err(|line| SinkError::Parse {
            path: path.to_path_buf(),
            line,
            reason: "unterminated quoted field".to_string(),
        })?;

        let mut rows = rows.into_iter();
        match rows.next() {
            Some(header) if header == Record::header() => {}
            Some(_) => {
                return Err(SinkError::Parse {
                    path: path.to_path_buf(),
                    line: 1,
                    reason: "unexpected header".to_string(),
                })
            }
            None => return Ok(Vec::new()),
        }

        rows.enumerate()
            .map(|(index, row)| {
                Record::from_row(&row).ok_or_else(|| SinkError::Parse {
                    path: path.to_path_buf(),
                    line: index + 2,
                    reason: format!("expected {} fields, found {}", Record::header().len(), row.len()),
                })
            })
            .collect()
    }
}

impl ResultSink for CsvResultSink {
    fn begin(&self, job: &Job) -> Result<PathBuf, SinkError> {
        self.ensure_directory()?;

        let (path, file) = self.create_exclusive(&Self::artifact_stem(job))?;
        let mut writer = BufWriter::new(file);
        write_row(&mut writer, &Record::header())
            .and_then(|_| writer.flush())
            .map_err(|e| SinkError::WriteFile {
                path: path.clone(),
                source: e,
            })?;

        info!("Opened artifact {} for job {}", path.display(), job.id);
        self.lock_open().insert(job.id.clone(), path.clone());
        Ok(path)
    }

    fn write(&self, job_id: &str, records: &[Record]) -> Result<usize, SinkError> {
        let path = self
            .lock_open()
            .get(job_id)
            .cloned()
            .ok_or_else(|| SinkError::NotStarted(job_id.to_string()))?;

        let file = OpenOptions::new()
            .append(true)
            .open(&path)
            .map_err(|e| SinkError::WriteFile {
                path: path.clone(),
                source: e,
            })?;

        let mut writer = BufWriter::new(file);
        for record in records {
            write_row(&mut writer, &record.to_row()).map_err(|e| SinkError::WriteFile {
                path: path.clone(),
                source: e,
            })?;
        }
        writer.flush().map_err(|e| SinkError::WriteFile {
            path: path.clone(),
            source: e,
        })?;

        debug!("Appended {} records to {}", records.len(), path.display());
        Ok(records.len())
    }

    fn finish(&self, job_id: &str) -> Option<PathBuf> {
        self.lock_open().remove(job_id)
    }
}
