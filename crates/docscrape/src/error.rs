use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocscrapeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Logging error: {0}")]
    Logging(#[from] LoggingError),

    #[error("Status store error: {0}")]
    StatusStore(#[from] StatusStoreError),

    #[error("Result sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid log filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("Logging is already initialized: {0}")]
    AlreadyInitialized(String),
}

/// Failure of a single page fetch.
///
/// `is_retryable` splits these into the transient class (retried inside the
/// session) and the fatal class (escalated immediately).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Page fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("Page rendered empty")]
    EmptyRender,

    #[error("Page render is malformed: {0}")]
    MalformedRender(String),

    #[error("Transient fetch failure: {0}")]
    Transient(String),

    #[error("Fatal fetch failure: {0}")]
    Fatal(String),

    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Failed to acquire page fetcher: {0}")]
    Acquire(String),
}

impl FetchError {
    /// Returns true if the failure is likely transient and the page can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout(_)
            | FetchError::EmptyRender
            | FetchError::MalformedRender(_)
            | FetchError::Transient(_) => true,
            FetchError::HttpStatus { status, .. } => {
                *status == 408 || *status == 429 || *status >= 500
            }
            FetchError::Fatal(_) | FetchError::Acquire(_) => false,
        }
    }
}

/// Job-level failure reported by a scrape session.
#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error("Page {page} failed after {attempts} attempts: {source}")]
    FetchTransient {
        page: u32,
        attempts: u32,
        #[source]
        source: FetchError,
    },

    #[error("Page {page} failed: {source}")]
    FetchFatal {
        page: u32,
        #[source]
        source: FetchError,
    },

    #[error(transparent)]
    Acquire(FetchError),

    #[error("Failed to persist records: {0}")]
    SinkWrite(#[from] SinkError),

    #[error("Invalid search parameters: {0}")]
    InvalidQuery(String),
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed artifact '{path}' at line {line}: {reason}")]
    Parse {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("No open artifact for job '{0}'")]
    NotStarted(String),

    #[error("Invalid artifact name: {0}")]
    InvalidName(String),
}

#[derive(Error, Debug)]
pub enum StatusStoreError {
    #[error("Status store unavailable: {0}")]
    Unavailable(String),

    #[error("Row not found: {0}")]
    RowNotFound(String),

    #[error("Status store I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse status store '{path}': {message}")]
    Parse { path: PathBuf, message: String },
}

pub type Result<T> = std::result::Result<T, DocscrapeError>;
