//! Persisted run state for document tasks.
//!
//! One row per document, keyed by `(source_id, title)` with the sanitized
//! title, surviving process restarts. The engine upserts rows at
//! discovery, updates lifecycle columns at every terminal transition, and
//! skips work that a previous run already completed. Timestamps are
//! stamped by SQLite at transition time.

use std::path::Path;

use sqlx::FromRow;
use thiserror::Error;
use tracing::{info, instrument};

use crate::db::Database;
use crate::task::{CloudStatus, DocumentTask, LifecycleState};

/// Store-related errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// No row with the given id.
    #[error("task not found: {id}")]
    NotFound {
        /// The missing row id.
        id: i64,
    },
}

/// One persisted task row.
#[derive(Debug, Clone, FromRow)]
pub struct TaskRecord {
    /// Row id.
    pub id: i64,
    /// Source the document belongs to.
    pub source_id: String,
    /// Department identifier.
    pub department_id: String,
    /// Department display name.
    pub department_name: String,
    /// Remote folder name.
    pub folder_name: String,
    /// Title as extracted.
    pub raw_title: String,
    /// Sanitized title (part of the row key).
    pub title: String,
    /// Document page URL.
    pub url: String,
    /// Lifecycle state (stored as text, parsed via `state()`).
    #[sqlx(rename = "state")]
    pub state_str: String,
    /// Cloud status (stored as text, parsed via `cloud_status()`).
    #[sqlx(rename = "cloud_status")]
    pub cloud_status_str: String,
    /// Local artifact path when downloaded.
    pub local_path: Option<String>,
    /// Artifact size in bytes when validated.
    pub file_size: Option<i64>,
    /// Remote identifier when uploaded.
    pub cloud_file_id: Option<String>,
    /// Reason for a terminal failure.
    pub failure_reason: Option<String>,
    /// Download completion timestamp.
    pub downloaded_at: Option<String>,
    /// Upload completion timestamp.
    pub uploaded_at: Option<String>,
    /// Row creation timestamp.
    pub created_at: String,
    /// Last update timestamp.
    pub updated_at: String,
}

impl TaskRecord {
    /// Returns the parsed lifecycle state, falling back to `Pending` if
    /// the stored string is invalid.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.state_str.parse().unwrap_or(LifecycleState::Pending)
    }

    /// Returns the parsed cloud status, falling back to `Pending` if the
    /// stored string is invalid.
    #[must_use]
    pub fn cloud_status(&self) -> CloudStatus {
        self.cloud_status_str.parse().unwrap_or(CloudStatus::Pending)
    }
}

/// Task persistence over SQLite.
#[derive(Debug, Clone)]
pub struct TaskStore {
    db: Database,
}

impl TaskStore {
    /// Creates a store over an open database.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Inserts a discovered task or refreshes an existing row with the
    /// latest URL and raw title, returning the stored record either way.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    #[instrument(skip_all, fields(source = %task.source_id, title = %task.title))]
    pub async fn upsert_discovered(&self, task: &DocumentTask) -> Result<TaskRecord, StoreError> {
        sqlx::query(
            "INSERT INTO document_tasks \
                 (source_id, department_id, department_name, folder_name, \
                  raw_title, title, url) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(source_id, title) DO UPDATE SET \
                 url = excluded.url, \
                 raw_title = excluded.raw_title, \
                 updated_at = datetime('now')",
        )
        .bind(&task.source_id)
        .bind(&task.department_id)
        .bind(&task.department_name)
        .bind(&task.folder_name)
        .bind(&task.raw_title)
        .bind(&task.title)
        .bind(&task.url)
        .execute(self.db.pool())
        .await?;

        let record = sqlx::query_as::<_, TaskRecord>(
            "SELECT * FROM document_tasks WHERE source_id = ? AND title = ?",
        )
        .bind(&task.source_id)
        .bind(&task.title)
        .fetch_optional(self.db.pool())
        .await?;

        record.ok_or(StoreError::NotFound { id: 0 })
    }

    /// Fetches a row by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the row does not exist.
    pub async fn get(&self, id: i64) -> Result<TaskRecord, StoreError> {
        sqlx::query_as::<_, TaskRecord>("SELECT * FROM document_tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?
            .ok_or(StoreError::NotFound { id })
    }

    /// Updates a task's lifecycle state (in-flight marker).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    pub async fn mark_state(&self, id: i64, state: LifecycleState) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE document_tasks SET state = ?, updated_at = datetime('now') WHERE id = ?",
        )
        .bind(state.as_str())
        .bind(id)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    /// Records a completed download: terminal `downloaded` state, local
    /// path, size, and timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    pub async fn mark_downloaded(
        &self,
        id: i64,
        local_path: &Path,
        file_size: u64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE document_tasks SET \
                 state = 'downloaded', \
                 local_path = ?, \
                 file_size = ?, \
                 failure_reason = NULL, \
                 downloaded_at = datetime('now'), \
                 updated_at = datetime('now') \
             WHERE id = ?",
        )
        .bind(local_path.display().to_string())
        .bind(file_size as i64)
        .bind(id)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    /// Records a terminal download failure with its reason.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    pub async fn mark_failed(&self, id: i64, reason: &str) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE document_tasks SET \
                 state = 'failed', \
                 failure_reason = ?, \
                 updated_at = datetime('now') \
             WHERE id = ?",
        )
        .bind(reason)
        .bind(id)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    /// Records a successful upload with its remote identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    pub async fn mark_uploaded(&self, id: i64, cloud_file_id: &str) -> Result<(), StoreError> {
        self.set_cloud_status(id, CloudStatus::Uploaded, Some(cloud_file_id), None)
            .await
    }

    /// Records a duplicate-skip with the pre-existing remote identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    pub async fn mark_skipped_duplicate(
        &self,
        id: i64,
        cloud_file_id: &str,
    ) -> Result<(), StoreError> {
        self.set_cloud_status(id, CloudStatus::SkippedDuplicate, Some(cloud_file_id), None)
            .await
    }

    /// Records a terminal upload failure with its reason.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    pub async fn mark_upload_failed(&self, id: i64, reason: &str) -> Result<(), StoreError> {
        self.set_cloud_status(id, CloudStatus::UploadFailed, None, Some(reason))
            .await
    }

    async fn set_cloud_status(
        &self,
        id: i64,
        status: CloudStatus,
        cloud_file_id: Option<&str>,
        reason: Option<&str>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE document_tasks SET \
                 cloud_status = ?, \
                 cloud_file_id = COALESCE(?, cloud_file_id), \
                 failure_reason = COALESCE(?, failure_reason), \
                 uploaded_at = CASE WHEN ? THEN datetime('now') ELSE uploaded_at END, \
                 updated_at = datetime('now') \
             WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(cloud_file_id)
        .bind(reason)
        .bind(status == CloudStatus::Uploaded)
        .bind(id)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    /// Resets rows left mid-flight by an interrupted run back to
    /// `pending`, returning how many were recovered.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    pub async fn reset_in_flight(&self) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE document_tasks SET \
                 state = 'pending', \
                 updated_at = datetime('now') \
             WHERE state NOT IN ('pending', 'downloaded', 'failed')",
        )
        .execute(self.db.pool())
        .await?;

        let recovered = result.rows_affected();
        if recovered > 0 {
            info!(recovered, "recovered interrupted tasks from previous run");
        }
        Ok(recovered)
    }

    /// Lists all rows in a lifecycle state.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    pub async fn list_by_state(
        &self,
        state: LifecycleState,
    ) -> Result<Vec<TaskRecord>, StoreError> {
        Ok(sqlx::query_as::<_, TaskRecord>(
            "SELECT * FROM document_tasks WHERE state = ? ORDER BY id",
        )
        .bind(state.as_str())
        .fetch_all(self.db.pool())
        .await?)
    }

    /// Counts rows in a lifecycle state.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    pub async fn count_by_state(&self, state: LifecycleState) -> Result<i64, StoreError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM document_tasks WHERE state = ?")
                .bind(state.as_str())
                .fetch_one(self.db.pool())
                .await?;
        Ok(count)
    }

    /// Counts rows in a cloud status.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    pub async fn count_by_cloud_status(&self, status: CloudStatus) -> Result<i64, StoreError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM document_tasks WHERE cloud_status = ?")
                .bind(status.as_str())
                .fetch_one(self.db.pool())
                .await?;
        Ok(count)
    }
}
