//! Model of the county recorder's records search.
//!
//! Knows how to turn a job's criteria into a search URL, how the results grid
//! paginates, and how to read records out of a rendered page.

pub mod extract;

use url::Url;

use crate::error::ScrapeError;
use crate::worker::job::{QueryParameters, US_DATE_FORMAT};

pub use extract::{classify_page, extract_records, has_next_page, PageKind};

pub const DEFAULT_BASE_URL: &str = "https://armsweb.co.pierce.wa.us/";
pub const DEFAULT_SEARCH_PATH: &str = "RealEstate/SearchResults.aspx";

#[derive(Debug, Clone)]
pub struct SearchSite {
    base_url: Url,
    search_path: String,
}

impl SearchSite {
    pub fn new(base_url: Url, search_path: impl Into<String>) -> Self {
        Self {
            base_url,
            search_path: search_path.into(),
        }
    }

    pub fn parse(base_url: &str, search_path: &str) -> Result<Self, url::ParseError> {
        Ok(Self::new(Url::parse(base_url)?, search_path))
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn results_url(&self) -> Result<Url, ScrapeError> {
        self.base_url
            .join(&self.search_path)
            .map_err(|e| ScrapeError::InvalidQuery(format!("bad search path: {}", e)))
    }

    /// Builds the first-page search URL for a job's criteria.
    pub fn search_url(&self, query: &QueryParameters) -> Result<Url, ScrapeError> {
        let document_type = query.document_type.trim();
        if document_type.is_empty() {
            return Err(ScrapeError::InvalidQuery(
                "document type is required".to_string(),
            ));
        }
        if let (Some(from), Some(to)) = (query.date_from, query.date_to) {
            if from > to {
                return Err(ScrapeError::InvalidQuery(format!(
                    "date range is inverted: {} > {}",
                    from.format(US_DATE_FORMAT),
                    to.format(US_DATE_FORMAT)
                )));
            }
        }

        let mut url = self.results_url()?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("doctype", document_type);
            if let Some(from) = query.date_from {
                pairs.append_pair("datefrom", &from.format(US_DATE_FORMAT).to_string());
            }
            if let Some(to) = query.date_to {
                pairs.append_pair("dateto", &to.format(US_DATE_FORMAT).to_string());
            }
            if let Some(county) = query.county.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
                pairs.append_pair("county", county);
            }
            for (key, value) in &query.extra {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// The search URL pointed at a 1-based results page.
    pub fn page_url(&self, search_url: &Url, page: u32) -> Url {
        let mut url = search_url.clone();
        let kept: Vec<(String, String)> = search_url
            .query_pairs()
            .filter(|(k, _)| k != "page")
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.clear();
            for (k, v) in &kept {
                pairs.append_pair(k, v);
            }
            if page > 1 {
                pairs.append_pair("page", &page.to_string());
            }
        }
        url
    }

    /// Direct image link for a document's global id (e.g. `OPR123`).
    pub fn image_url(&self, global_id: &str) -> Option<Url> {
        let mut url = self.results_url().ok()?;
        url.query_pairs_mut()
            .append_pair("global_id", global_id)
            .append_pair("type", "img");
        Some(url)
    }
}

impl Default for SearchSite {
    fn default() -> Self {
        let base_url = Url::parse(DEFAULT_BASE_URL).expect("default base URL is valid");
        Self::new(base_url, DEFAULT_SEARCH_PATH)
    }
}
