use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default ceiling on pages traversed for one job.
pub const DEFAULT_PAGE_LIMIT: u32 = 50;

/// Status of a job row, mirrored between memory and the status store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Start,
    Running,
    Complete,
    Failed,
}

impl JobStatus {
    /// Parses a status cell as it appears in the spreadsheet.
    ///
    /// Case and surrounding whitespace are ignored, an empty cell is
    /// `Pending` and the legacy `Error` value maps to `Failed`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "pending" => Some(JobStatus::Pending),
            "start" => Some(JobStatus::Start),
            "running" => Some(JobStatus::Running),
            "complete" | "completed" => Some(JobStatus::Complete),
            "failed" | "error" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "Pending",
            JobStatus::Start => "Start",
            JobStatus::Running => "Running",
            JobStatus::Complete => "Complete",
            JobStatus::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Failed)
    }

    /// Whether `self -> next` is a legal forward transition.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Start, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Complete)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid status transition for job '{job_id}': {from} -> {to}")]
pub struct InvalidTransition {
    pub job_id: String,
    pub from: JobStatus,
    pub to: JobStatus,
}

/// Search criteria supplied by a status store row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryParameters {
    pub document_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub county: Option<String>,
    #[serde(default, with = "us_date", skip_serializing_if = "Option::is_none")]
    pub date_from: Option<NaiveDate>,
    #[serde(default, with = "us_date", skip_serializing_if = "Option::is_none")]
    pub date_to: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl QueryParameters {
    pub fn for_document_type(document_type: impl Into<String>) -> Self {
        Self {
            document_type: document_type.into(),
            ..Self::default()
        }
    }

    /// Short human label used in logs and artifact names.
    pub fn label(&self) -> &str {
        let trimmed = self.document_type.trim();
        if trimmed.is_empty() {
            "search"
        } else {
            trimmed
        }
    }
}

/// Dates travel as `MM/DD/YYYY`, the format the records site and the sheet use.
mod us_date {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%m/%d/%Y";

    pub fn serialize<S>(date: &Option<NaiveDate>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(d) => serializer.serialize_str(&d.format(FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => NaiveDate::parse_from_str(s, FORMAT)
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}

pub(crate) use us_date::FORMAT as US_DATE_FORMAT;

/// One unit of scraping work, created from a `Start` row.
#[derive(Debug, Clone)]
pub struct Job {
    /// Row reference in the status store.
    pub id: String,
    /// Unique per admission; distinguishes re-runs of the same row.
    pub run_id: String,
    pub query: QueryParameters,
    pub status: JobStatus,
    pub page_limit: u32,
    pub pages_fetched: u32,
    pub records_found: usize,
    pub result_path: Option<PathBuf>,
    pub error: Option<String>,
    pub admitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(id: impl Into<String>, query: QueryParameters, page_limit: u32) -> Self {
        Self {
            id: id.into(),
            run_id: uuid::Uuid::new_v4().to_string(),
            query,
            status: JobStatus::Start,
            page_limit,
            pages_fetched: 0,
            records_found: 0,
            result_path: None,
            error: None,
            admitted_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Moves the job forward, stamping start/finish times.
    pub fn transition_to(&mut self, next: JobStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                job_id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        match next {
            JobStatus::Running => self.started_at = Some(Utc::now()),
            JobStatus::Complete | JobStatus::Failed => self.finished_at = Some(Utc::now()),
            _ => {}
        }
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// How a scrape session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Complete { result_path: PathBuf },
    Failed {
        error: String,
        /// Whatever was persisted before the failure.
        partial_path: Option<PathBuf>,
    },
}

impl JobOutcome {
    pub fn status(&self) -> JobStatus {
        match self {
            JobOutcome::Complete { .. } => JobStatus::Complete,
            JobOutcome::Failed { .. } => JobStatus::Failed,
        }
    }

    pub fn result_path(&self) -> Option<&PathBuf> {
        match self {
            JobOutcome::Complete { result_path } => Some(result_path),
            JobOutcome::Failed { partial_path, .. } => partial_path.as_ref(),
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            JobOutcome::Complete { .. } => None,
            JobOutcome::Failed { error, .. } => Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse_is_lenient() {
        assert_eq!(JobStatus::parse("start"), Some(JobStatus::Start));
        assert_eq!(JobStatus::parse("  Start "), Some(JobStatus::Start));
        assert_eq!(JobStatus::parse("RUNNING"), Some(JobStatus::Running));
        assert_eq!(JobStatus::parse(""), Some(JobStatus::Pending));
        assert_eq!(JobStatus::parse("Error"), Some(JobStatus::Failed));
        assert_eq!(JobStatus::parse("Completed"), Some(JobStatus::Complete));
        assert_eq!(JobStatus::parse("maybe"), None);
    }

    #[test]
    fn test_status_display_is_canonical() {
        assert_eq!(JobStatus::Running.to_string(), "Running");
        assert_eq!(JobStatus::Failed.to_string(), "Failed");
    }

    #[test]
    fn test_job_new_starts_at_start() {
        let job = Job::new("7", QueryParameters::for_document_type("TRUSTEE SALE"), 50);
        assert_eq!(job.status, JobStatus::Start);
        assert_eq!(job.pages_fetched, 0);
        assert!(!job.run_id.is_empty());
        assert!(job.started_at.is_none());
    }

    #[test]
    fn test_run_ids_are_unique_per_admission() {
        let a = Job::new("7", QueryParameters::default(), 50);
        let b = Job::new("7", QueryParameters::default(), 50);
        assert_ne!(a.run_id, b.run_id);
    }

    #[test]
    fn test_forward_transitions() {
        let mut job = Job::new("3", QueryParameters::default(), 50);
        job.transition_to(JobStatus::Running).unwrap();
        assert!(job.started_at.is_some());
        job.transition_to(JobStatus::Complete).unwrap();
        assert!(job.finished_at.is_some());
        assert!(job.is_terminal());
    }

    #[test]
    fn test_transitions_never_reverse() {
        let mut job = Job::new("3", QueryParameters::default(), 50);
        job.transition_to(JobStatus::Running).unwrap();
        job.transition_to(JobStatus::Failed).unwrap();

        let err = job.transition_to(JobStatus::Running).unwrap_err();
        assert_eq!(err.from, JobStatus::Failed);
        assert_eq!(err.to, JobStatus::Running);
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[test]
    fn test_start_cannot_skip_running() {
        let mut job = Job::new("3", QueryParameters::default(), 50);
        assert!(job.transition_to(JobStatus::Complete).is_err());
        assert_eq!(job.status, JobStatus::Start);
    }

    #[test]
    fn test_query_dates_round_trip_us_format() {
        let json = r#"{"document_type":"LIEN","date_from":"01/02/2024","date_to":""}"#;
        let query: QueryParameters = serde_json::from_str(json).unwrap();
        assert_eq!(query.date_from, NaiveDate::from_ymd_opt(2024, 1, 2));
        assert!(query.date_to.is_none());

        let back = serde_json::to_string(&query).unwrap();
        assert!(back.contains("\"date_from\":\"01/02/2024\""));
        assert!(!back.contains("date_to"));
    }

    #[test]
    fn test_outcome_accessors() {
        let failed = JobOutcome::Failed {
            error: "boom".to_string(),
            partial_path: Some(PathBuf::from("results/a.csv")),
        };
        assert_eq!(failed.status(), JobStatus::Failed);
        assert_eq!(failed.error(), Some("boom"));
        assert_eq!(failed.result_path(), Some(&PathBuf::from("results/a.csv")));
    }
}
