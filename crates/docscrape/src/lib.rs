pub mod broadcast;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod logging;
pub mod record;
pub mod retry;
pub mod sanitize;
pub mod session;
pub mod site;
pub mod status;
pub mod storage;
pub mod worker;

pub use broadcast::{JobBoard, JobProgressBroadcaster, JobProgressEvent, JobSnapshot};
pub use config::{load_config, load_config_from_str, Config};
pub use error::{
    ConfigError, DocscrapeError, FetchError, LoggingError, Result, ScrapeError, SinkError,
    StatusStoreError,
};
pub use fetcher::{FetchTarget, FetchedPage, FetcherFactory, PageFetcher};
pub use record::Record;
pub use retry::RetryPolicy;
pub use session::{DedupPolicy, ScrapeSession, SessionConfig, SessionReport};
pub use site::SearchSite;
pub use status::{InMemoryStatusStore, JsonFileStatusStore, StatusDetail, StatusRow, StatusStore};
pub use storage::{CsvResultSink, ResultSink};
pub use worker::{Job, JobOutcome, JobStatus, Orchestrator, OrchestratorConfig, QueryParameters};
