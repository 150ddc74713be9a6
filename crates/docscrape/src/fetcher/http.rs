//! HTTP implementation of the page fetcher.
//!
//! Each fetcher owns its own `reqwest::Client` with a private cookie jar, so
//! the search session state of one job never leaks into another.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use url::Url;

use super::{FetchTarget, FetchedPage, FetcherFactory, PageFetcher};
use crate::error::FetchError;
use crate::sanitize;
use crate::site::{self, SearchSite};

#[derive(Debug, Clone)]
pub struct HttpFetcherConfig {
    pub user_agent: String,
    pub request_timeout: Duration,
}

impl Default for HttpFetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

pub struct HttpFetcherFactory {
    site: Arc<SearchSite>,
    config: HttpFetcherConfig,
}

impl HttpFetcherFactory {
    pub fn new(site: Arc<SearchSite>, config: HttpFetcherConfig) -> Self {
        Self { site, config }
    }
}

#[async_trait]
impl FetcherFactory for HttpFetcherFactory {
    async fn acquire(&self) -> Result<Box<dyn PageFetcher>, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(&self.config.user_agent)
            .timeout(self.config.request_timeout)
            .cookie_store(true)
            .build()
            .map_err(|e| FetchError::Acquire(e.to_string()))?;

        Ok(Box::new(HttpPageFetcher {
            client,
            site: Arc::clone(&self.site),
            search_url: None,
            page: 0,
        }))
    }
}

pub struct HttpPageFetcher {
    client: reqwest::Client,
    site: Arc<SearchSite>,
    search_url: Option<Url>,
    /// Last page fetched successfully (1-based, 0 before the first).
    page: u32,
}

impl HttpPageFetcher {
    fn classify(err: reqwest::Error) -> FetchError {
        if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
            FetchError::Transient(err.to_string())
        } else {
            FetchError::Fatal(err.to_string())
        }
    }

    async fn get(&self, url: &Url) -> Result<String, FetchError> {
        debug!("GET {}", sanitize::redact_url(url.as_str()));
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(Self::classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: sanitize::redact_url(url.as_str()),
            });
        }

        response.text().await.map_err(Self::classify)
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&mut self, target: &FetchTarget) -> Result<FetchedPage, FetchError> {
        let (search_url, page) = match target {
            FetchTarget::Url(url) => (url.clone(), 1),
            FetchTarget::Next => match &self.search_url {
                Some(url) => (url.clone(), self.page + 1),
                None => {
                    return Err(FetchError::Fatal(
                        "next page requested before a search was started".to_string(),
                    ))
                }
            },
        };

        let url = self.site.page_url(&search_url, page);
        let content = self.get(&url).await?;
        site::classify_page(&content)?;

        // Only a usable render moves the cursor.
        self.search_url = Some(search_url);
        self.page = page;

        Ok(FetchedPage {
            has_next: site::has_next_page(&content),
            content,
        })
    }

    async fn release(self: Box<Self>) {
        debug!("Released HTTP fetcher after {} pages", self.page);
    }
}
