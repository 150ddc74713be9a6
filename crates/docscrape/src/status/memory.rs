use std::sync::RwLock;

use async_trait::async_trait;

use super::{StatusDetail, StatusRow, StatusStore};
use crate::error::StatusStoreError;
use crate::worker::job::JobStatus;

/// Status store held entirely in memory.
#[derive(Default)]
pub struct InMemoryStatusStore {
    rows: RwLock<Vec<StatusRow>>,
}

impl InMemoryStatusStore {
    pub fn new(rows: Vec<StatusRow>) -> Self {
        Self {
            rows: RwLock::new(rows),
        }
    }

    /// Adds or replaces a row, the way a person editing the sheet would.
    pub fn upsert(&self, row: StatusRow) {
        let mut rows = match self.rows.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        match rows.iter_mut().find(|r| r.id == row.id) {
            Some(existing) => *existing = row,
            None => rows.push(row),
        }
    }

    pub fn get(&self, id: &str) -> Option<StatusRow> {
        let rows = match self.rows.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        rows.iter().find(|r| r.id == id).cloned()
    }

    pub fn snapshot(&self) -> Vec<StatusRow> {
        match self.rows.read() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl StatusStore for InMemoryStatusStore {
    async fn list_rows(&self) -> Result<Vec<StatusRow>, StatusStoreError> {
        Ok(self.snapshot())
    }

    async fn set_status(
        &self,
        id: &str,
        status: JobStatus,
        detail: StatusDetail,
    ) -> Result<(), StatusStoreError> {
        let mut rows = match self.rows.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let row = rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StatusStoreError::RowNotFound(id.to_string()))?;
        row.status = status;
        detail.apply_to(row);
        Ok(())
    }
}
