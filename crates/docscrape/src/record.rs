//! A scraped document entry and its fixed column layout.

use serde::{Deserialize, Serialize};

/// Column order of every result artifact.
pub const RECORD_FIELDS: [&str; 6] = [
    "case_number",
    "filing_date",
    "document_type",
    "grantor",
    "grantee",
    "url",
];

/// One row from the records search results grid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Instrument number assigned by the recorder.
    pub case_number: String,
    /// Recording date as shown on the site (`MM/DD/YYYY`).
    pub filing_date: String,
    pub document_type: String,
    pub grantor: String,
    pub grantee: String,
    /// Direct image link; empty when the site shows no image for the row.
    pub url: String,
}

impl Record {
    pub fn header() -> Vec<String> {
        RECORD_FIELDS.iter().map(|f| f.to_string()).collect()
    }

    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.case_number.clone(),
            self.filing_date.clone(),
            self.document_type.clone(),
            self.grantor.clone(),
            self.grantee.clone(),
            self.url.clone(),
        ]
    }

    /// Rebuilds a record from a data row. Returns `None` on a column-count mismatch.
    pub fn from_row(row: &[String]) -> Option<Self> {
        match row {
            [case_number, filing_date, document_type, grantor, grantee, url] => Some(Self {
                case_number: case_number.clone(),
                filing_date: filing_date.clone(),
                document_type: document_type.clone(),
                grantor: grantor.clone(),
                grantee: grantee.clone(),
                url: url.clone(),
            }),
            _ => None,
        }
    }
}
