//! Record extraction from rendered results pages.
//!
//! The results grid renders each document as a `<tr data-ig…>` row. Rows with
//! a grantor label are data rows; everything else is chrome.

use std::sync::LazyLock;

use regex::Regex;

use super::SearchSite;
use crate::error::FetchError;
use crate::record::Record;

/// Id of the results grid container.
pub const RESULTS_GRID_MARKER: &str = "cphNoMargin_cphNoMargin_g_G1";

const ROW_SPLIT: &str = "<tr data-ig";
const DATA_ROW_MARKER: &str = "lblTor";
const IMAGE_MARKER: &str = "paper.gif";
const NO_RESULTS_MARKERS: &[&str] = &["no records found", "no results found", "returned no results"];

static RE_INSTRUMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"id="[^"]*Label1">\s*([^<]+?)\s*</span>"#).unwrap());
static RE_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r">\s*(\d{2}/\d{2}/\d{4})\s*<").unwrap());
static RE_GRANTOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"id="[^"]*lblTor">([^<]+)</span>"#).unwrap());
static RE_GRANTEE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"id="[^"]*lblTee">([^<]+)"#).unwrap());
static RE_GLOBAL_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"OPR(\d+)").unwrap());
static RE_NEXT_CONTROL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)<input[^>]*src="([^"]*nextsmall[^"]*)""#).unwrap());

/// What a fetched page turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    /// The results grid is present (possibly with zero rows).
    Results,
    /// The site reported that the search matched nothing.
    NoResults,
}

/// Sorts a render into results / no-results, or a retryable render failure.
pub fn classify_page(content: &str) -> Result<PageKind, FetchError> {
    if content.trim().is_empty() {
        return Err(FetchError::EmptyRender);
    }
    if content.contains(RESULTS_GRID_MARKER) {
        return Ok(PageKind::Results);
    }
    let lower = content.to_lowercase();
    if NO_RESULTS_MARKERS.iter().any(|m| lower.contains(m)) {
        return Ok(PageKind::NoResults);
    }
    Err(FetchError::MalformedRender(
        "results grid not found".to_string(),
    ))
}

/// Whether the page shows an enabled next-page control.
pub fn has_next_page(content: &str) -> bool {
    RE_NEXT_CONTROL
        .captures(content)
        .map(|caps| !caps[1].to_lowercase().contains("disabled"))
        .unwrap_or(false)
}

fn capture(re: &Regex, row: &str) -> Option<String> {
    re.captures(row)
        .map(|caps| decode_entities(caps[1].trim()))
        .filter(|s| !s.is_empty())
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}

/// Reads every data row of a classified page into records.
///
/// A no-results page yields an empty list; an unusable render is an error.
pub fn extract_records(
    content: &str,
    document_type: &str,
    site: &SearchSite,
) -> Result<Vec<Record>, FetchError> {
    if classify_page(content)? == PageKind::NoResults {
        return Ok(Vec::new());
    }

    let records = content
        .split(ROW_SPLIT)
        .skip(1)
        .filter(|row| row.contains(DATA_ROW_MARKER))
        .map(|row| parse_row(row, document_type, site))
        .collect();

    Ok(records)
}

fn parse_row(row: &str, document_type: &str, site: &SearchSite) -> Record {
    let url = if row.contains(IMAGE_MARKER) {
        RE_GLOBAL_ID
            .captures(row)
            .and_then(|caps| site.image_url(&format!("OPR{}", &caps[1])))
            .map(|u| u.to_string())
            .unwrap_or_default()
    } else {
        String::new()
    };

    Record {
        case_number: capture(&RE_INSTRUMENT, row).unwrap_or_else(|| "Unknown".to_string()),
        filing_date: capture(&RE_DATE, row).unwrap_or_default(),
        document_type: document_type.to_string(),
        grantor: capture(&RE_GRANTOR, row).unwrap_or_default(),
        grantee: capture(&RE_GRANTEE, row).unwrap_or_default(),
        url,
    }
}
