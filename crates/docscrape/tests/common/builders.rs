//! Builders for results pages and status rows.

#![allow(dead_code)]

use docscrape::fetcher::FetchedPage;
use docscrape::site::extract::RESULTS_GRID_MARKER;
use docscrape::status::StatusRow;
use docscrape::worker::{JobStatus, QueryParameters};

/// One data row of the results grid.
pub fn grid_row(instrument: &str, date: &str, grantor: &str, grantee: &str) -> String {
    format!(
        r#"<tr data-ig="x:r"><td><span id="g_ctl01_Label1">{instrument}</span></td><td>{date}</td><td><span id="g_ctl01_lblTor">{grantor}</span></td><td><span id="g_ctl01_lblTee">{grantee}</span></td></tr>"#
    )
}

/// A results page whose rows carry the given instrument numbers.
pub fn results_html(instruments: &[&str], has_next: bool) -> String {
    let rows: String = instruments
        .iter()
        .map(|n| grid_row(n, "01/02/2024", &format!("GRANTOR {}", n), "GRANTEE"))
        .collect();
    let next = if has_next {
        "/images/nextsmall.gif"
    } else {
        "/images/nextsmall_disabled.gif"
    };
    format!(
        r#"<html><body><div id="{}"><table><tr data-ig="header"><th>Instrument</th></tr>{}</table></div><input type="image" src="{}"></body></html>"#,
        RESULTS_GRID_MARKER, rows, next
    )
}

pub fn results_page(instruments: &[&str], has_next: bool) -> FetchedPage {
    FetchedPage {
        content: results_html(instruments, has_next),
        has_next,
    }
}

/// A page of `count` records with instruments `P<page>-<n>`.
pub fn numbered_page(page: u32, count: u32, has_next: bool) -> FetchedPage {
    let numbers: Vec<String> = (1..=count).map(|i| format!("P{}-{}", page, i)).collect();
    let refs: Vec<&str> = numbers.iter().map(String::as_str).collect();
    results_page(&refs, has_next)
}

pub fn start_row(id: &str, document_type: &str) -> StatusRow {
    StatusRow::new(id, JobStatus::Start, QueryParameters::for_document_type(document_type))
}

pub fn row_with_status(id: &str, document_type: &str, status: JobStatus) -> StatusRow {
    StatusRow::new(id, status, QueryParameters::for_document_type(document_type))
}
