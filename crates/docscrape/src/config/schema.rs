use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::fetcher::HttpFetcherConfig;
use crate::retry::RetryPolicy;
use crate::session::{DedupPolicy, SessionConfig};
use crate::site::{DEFAULT_BASE_URL, DEFAULT_SEARCH_PATH};
use crate::worker::job::DEFAULT_PAGE_LIMIT;
use crate::worker::OrchestratorConfig;

pub const CONFIG_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    #[serde(default = "default_results_directory")]
    pub results_directory: String,
    #[serde(default)]
    pub status_store: StatusStoreConfig,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub status_writes: StatusWriteSettings,
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_poll_interval() -> u64 {
    30
}

fn default_max_concurrent_jobs() -> usize {
    3
}

fn default_results_directory() -> String {
    "results".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION.to_string(),
            poll_interval_seconds: default_poll_interval(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            results_directory: default_results_directory(),
            status_store: StatusStoreConfig::default(),
            session: SessionSettings::default(),
            status_writes: StatusWriteSettings::default(),
            site: SiteConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    pub fn results_directory(&self) -> PathBuf {
        PathBuf::from(&self.results_directory)
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            poll_interval: Duration::from_secs(self.poll_interval_seconds),
            max_concurrent_jobs: self.max_concurrent_jobs,
            status_retry: self.status_writes.retry_policy(),
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        self.session.to_session_config()
    }

    pub fn http_fetcher_config(&self) -> HttpFetcherConfig {
        HttpFetcherConfig {
            user_agent: self.site.user_agent.clone(),
            request_timeout: Duration::from_secs(self.site.request_timeout_seconds),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusStoreConfig {
    #[serde(default = "default_status_path")]
    pub path: String,
}

fn default_status_path() -> String {
    "jobs.json".to_string()
}

impl Default for StatusStoreConfig {
    fn default() -> Self {
        Self {
            path: default_status_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,
    #[serde(default = "default_max_page_retries")]
    pub max_page_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_seconds: u64,
    #[serde(default)]
    pub dedup: DedupPolicy,
}

fn default_page_limit() -> u32 {
    DEFAULT_PAGE_LIMIT
}

fn default_max_page_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    2000
}

fn default_retry_max_delay_ms() -> u64 {
    30_000
}

fn default_fetch_timeout() -> u64 {
    60
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            page_limit: default_page_limit(),
            max_page_retries: default_max_page_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            fetch_timeout_seconds: default_fetch_timeout(),
            dedup: DedupPolicy::default(),
        }
    }
}

impl SessionSettings {
    pub fn to_session_config(&self) -> SessionConfig {
        SessionConfig {
            page_limit: self.page_limit,
            retry: RetryPolicy::new(
                self.max_page_retries,
                Duration::from_millis(self.retry_base_delay_ms),
                Duration::from_millis(self.retry_max_delay_ms),
            ),
            fetch_timeout: Duration::from_secs(self.fetch_timeout_seconds),
            dedup: self.dedup,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusWriteSettings {
    #[serde(default = "default_status_retries")]
    pub max_retries: u32,
    #[serde(default = "default_status_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_status_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_status_retries() -> u32 {
    3
}

fn default_status_base_delay_ms() -> u64 {
    500
}

fn default_status_max_delay_ms() -> u64 {
    8000
}

impl Default for StatusWriteSettings {
    fn default() -> Self {
        Self {
            max_retries: default_status_retries(),
            base_delay_ms: default_status_base_delay_ms(),
            max_delay_ms: default_status_max_delay_ms(),
        }
    }
}

impl StatusWriteSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_search_path")]
    pub search_path: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_search_path() -> String {
    DEFAULT_SEARCH_PATH.to_string()
}

fn default_user_agent() -> String {
    HttpFetcherConfig::default().user_agent
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            search_path: default_search_path(),
            user_agent: default_user_agent(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}
