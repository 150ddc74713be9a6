use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use super::{StatusDetail, StatusRow, StatusStore};
use crate::error::StatusStoreError;
use crate::worker::job::JobStatus;

/// Rows stay raw JSON so one unreadable row cannot hide the rest, and
/// columns this crate does not know about survive a write.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StatusDocument {
    #[serde(default)]
    rows: Vec<Value>,
}

fn row_id(raw: &Value) -> Option<&str> {
    raw.get("id").and_then(Value::as_str)
}

fn set_column(object: &mut Map<String, Value>, column: &str, value: Option<String>) {
    match value {
        Some(value) => {
            object.insert(column.to_string(), Value::String(value));
        }
        None => {
            object.remove(column);
        }
    }
}

/// Status store backed by a local JSON document that mirrors the sheet.
///
/// Re-read on every call so external edits (flipping a row to `Start`) are
/// picked up on the next poll. Writes go through a temp file and a rename.
pub struct JsonFileStatusStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStatusStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> Result<StatusDocument, StatusStoreError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Status file {} does not exist yet", self.path.display());
                return Ok(StatusDocument::default());
            }
            Err(e) => {
                return Err(StatusStoreError::Io {
                    path: self.path.clone(),
                    source: e,
                })
            }
        };

        serde_json::from_str(&content).map_err(|e| StatusStoreError::Parse {
            path: self.path.clone(),
            message: e.to_string(),
        })
    }

    async fn write_document(&self, document: &StatusDocument) -> Result<(), StatusStoreError> {
        let json = serde_json::to_string_pretty(document).map_err(|e| StatusStoreError::Parse {
            path: self.path.clone(),
            message: e.to_string(),
        })?;

        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, json)
            .await
            .map_err(|e| StatusStoreError::Io {
                path: tmp_path.clone(),
                source: e,
            })?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| StatusStoreError::Io {
                path: self.path.clone(),
                source: e,
            })
    }
}

#[async_trait]
impl StatusStore for JsonFileStatusStore {
    async fn list_rows(&self) -> Result<Vec<StatusRow>, StatusStoreError> {
        let document = self.read_document().await?;
        let mut rows = Vec::with_capacity(document.rows.len());

        for (index, raw) in document.rows.into_iter().enumerate() {
            let label = row_id(&raw)
                .map(str::to_string)
                .unwrap_or_else(|| format!("#{}", index + 1));
            match serde_json::from_value::<StatusRow>(raw) {
                Ok(row) => rows.push(row),
                Err(e) => warn!(
                    "Skipping row {} of {}: {}",
                    label,
                    self.path.display(),
                    e
                ),
            }
        }

        Ok(rows)
    }

    async fn set_status(
        &self,
        id: &str,
        status: JobStatus,
        detail: StatusDetail,
    ) -> Result<(), StatusStoreError> {
        let _guard = self.write_lock.lock().await;

        let mut document = self.read_document().await?;
        let object = document
            .rows
            .iter_mut()
            .find(|raw| row_id(raw) == Some(id))
            .ok_or_else(|| StatusStoreError::RowNotFound(id.to_string()))?
            .as_object_mut()
            .ok_or_else(|| StatusStoreError::Parse {
                path: self.path.clone(),
                message: format!("row {} is not an object", id),
            })?;

        object.insert("status".to_string(), Value::from(status.as_str()));
        set_column(object, "result_path", detail.result_path);
        set_column(object, "error", detail.error);

        self.write_document(&document).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SHEET: &str = r#"{
        "rows": [
            {"id": "2", "status": "start", "query": {"document_type": "TRUSTEE SALE"}},
            {"id": "3", "status": "", "query": {"document_type": "LIEN", "date_from": "01/01/2024"}}
        ]
    }"#;

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonFileStatusStore::new(temp_dir.path().join("jobs.json"));
        assert!(store.list_rows().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reads_sheet_rows() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("jobs.json");
        std::fs::write(&path, SHEET).unwrap();

        let rows = JsonFileStatusStore::new(&path).list_rows().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].status, JobStatus::Start);
        assert_eq!(rows[1].status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_set_status_persists() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("jobs.json");
        std::fs::write(&path, SHEET).unwrap();
        let store = JsonFileStatusStore::new(&path);

        store
            .set_status(
                "2",
                JobStatus::Complete,
                StatusDetail {
                    result_path: Some("TRUSTEE_SALE_2.csv".to_string()),
                    error: None,
                },
            )
            .await
            .unwrap();

        let reopened = JsonFileStatusStore::new(&path).list_rows().await.unwrap();
        assert_eq!(reopened[0].status, JobStatus::Complete);
        assert_eq!(reopened[0].result_path.as_deref(), Some("TRUSTEE_SALE_2.csv"));
        assert_eq!(reopened[1].status, JobStatus::Pending);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_unreadable_row_is_skipped_and_kept() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("jobs.json");
        std::fs::write(
            &path,
            r#"{
                "rows": [
                    {"id": "2", "status": "Start", "query": {"document_type": "LIEN"}, "notes": "rush"},
                    {"id": "3", "status": "Done", "query": {"document_type": "LIEN"}},
                    {"id": "4", "status": "Start"}
                ]
            }"#,
        )
        .unwrap();
        let store = JsonFileStatusStore::new(&path);

        let rows = store.list_rows().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "2");

        store
            .set_status("2", JobStatus::Running, StatusDetail::none())
            .await
            .unwrap();

        let written: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["rows"][0]["status"], "Running");
        assert_eq!(written["rows"][0]["notes"], "rush");
        assert_eq!(written["rows"][1]["status"], "Done");
        assert_eq!(written["rows"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_set_status_clears_stale_columns() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("jobs.json");
        std::fs::write(
            &path,
            r#"{"rows": [{"id": "2", "status": "Start", "query": {"document_type": "LIEN"},
                          "result_path": "LIEN_2_20240101_000000.csv", "error": "Page 1 failed"}]}"#,
        )
        .unwrap();
        let store = JsonFileStatusStore::new(&path);

        store
            .set_status("2", JobStatus::Running, StatusDetail::none())
            .await
            .unwrap();

        let rows = store.list_rows().await.unwrap();
        assert_eq!(rows[0].status, JobStatus::Running);
        assert!(rows[0].result_path.is_none());
        assert!(rows[0].error.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_a_read_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("jobs.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = JsonFileStatusStore::new(&path).list_rows().await.unwrap_err();
        assert!(matches!(err, StatusStoreError::Parse { .. }));
    }
}
