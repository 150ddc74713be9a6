use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::record::Record;

/// Whether records repeated across a job's pages are dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupPolicy {
    /// Keep every row exactly as the site returned it.
    #[default]
    None,
    /// Drop rows whose instrument number was already written for this job.
    CaseNumber,
}

/// Per-session filter applying a [`DedupPolicy`].
#[derive(Debug)]
pub struct DedupFilter {
    policy: DedupPolicy,
    seen: HashSet<String>,
}

impl DedupFilter {
    pub fn new(policy: DedupPolicy) -> Self {
        Self {
            policy,
            seen: HashSet::new(),
        }
    }

    /// Returns the records not seen before, in page order.
    ///
    /// Rows without a real instrument number are always kept.
    pub fn retain_new(&mut self, records: Vec<Record>) -> Vec<Record> {
        match self.policy {
            DedupPolicy::None => records,
            DedupPolicy::CaseNumber => records
                .into_iter()
                .filter(|r| r.case_number == "Unknown" || self.seen.insert(r.case_number.clone()))
                .collect(),
        }
    }
}
