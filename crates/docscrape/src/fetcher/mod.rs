//! The page fetcher seam.
//!
//! The core never talks to a browser directly: a session acquires its own
//! [`PageFetcher`] from a [`FetcherFactory`], drives it page by page and
//! releases it when done. Tests plug in scripted fetchers here.

pub mod http;

use async_trait::async_trait;
use url::Url;

use crate::error::FetchError;

pub use http::{HttpFetcherConfig, HttpFetcherFactory, HttpPageFetcher};

/// What to fetch next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchTarget {
    /// Start a new search at this URL.
    Url(Url),
    /// Advance to the page after the last one fetched successfully.
    Next,
}

/// A rendered page plus the site's "has more" signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub content: String,
    pub has_next: bool,
}

/// One isolated browsing session.
///
/// A failed `fetch` must leave the pagination cursor where it was, so the
/// same target can be retried. Empty or malformed renders count as failures.
#[async_trait]
pub trait PageFetcher: Send {
    async fn fetch(&mut self, target: &FetchTarget) -> Result<FetchedPage, FetchError>;

    /// Tears down the underlying browser/session.
    async fn release(self: Box<Self>);
}

/// Hands out isolated fetchers, one per scrape session.
#[async_trait]
pub trait FetcherFactory: Send + Sync {
    async fn acquire(&self) -> Result<Box<dyn PageFetcher>, FetchError>;
}
