//! Cloud synchronization of validated downloads.
//!
//! [`CloudSyncManager`] takes tasks that reached `Downloaded` and ensures
//! exactly one logical copy of each document exists remotely: folder paths
//! are resolved through a per-run cache with single-writer creation,
//! duplicates short-circuit without uploading, and transient provider
//! faults are retried through the retry controller.

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::{CloudClient, CloudError, classify_cloud_error};
use crate::download::file_extension;
use crate::config::CloudStorageSettings;
use crate::retry::{self, RetryError, RetryPolicy};
use crate::task::{CloudStatus, DocumentTask};
use crate::tracker::{OperationTracker, document_context};

/// Terminal outcome of a sync attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// A new remote file was created.
    Uploaded,
    /// An identically named remote file already existed; nothing was
    /// uploaded.
    SkippedDuplicate,
}

/// Receipt for a successfully synchronized document.
#[derive(Debug, Clone)]
pub struct CloudReceipt {
    /// Remote identifier of the (new or pre-existing) file.
    pub file_id: String,
    /// Whether an upload actually happened.
    pub outcome: SyncOutcome,
}

/// Terminal sync failures.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A fatal provider error.
    #[error(transparent)]
    Cloud(#[from] CloudError),

    /// Transient provider errors exhausted the retry budget.
    #[error("upload failed after {attempts} attempts: {source}")]
    Exhausted {
        /// The last underlying error.
        #[source]
        source: CloudError,
        /// Number of attempts made.
        attempts: u32,
    },

    /// The run-level cancellation signal fired.
    #[error("upload cancelled")]
    Cancelled,
}

impl From<RetryError<CloudError>> for SyncError {
    fn from(error: RetryError<CloudError>) -> Self {
        match error {
            RetryError::Fatal(e) => Self::Cloud(e),
            RetryError::Exhausted { source, attempts } => Self::Exhausted { source, attempts },
            RetryError::Cancelled => Self::Cancelled,
        }
    }
}

impl SyncError {
    /// Returns true when the failure is an authentication problem, which
    /// poisons the whole cloud phase rather than just this task.
    #[must_use]
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            Self::Cloud(CloudError::Auth { .. } | CloudError::Credentials { .. })
        )
    }
}

/// Per-run cache of logical folder paths to remote identifiers.
///
/// Each unique path owns one async slot; the first requester creates the
/// remote folder while later requesters wait on the slot's lock instead of
/// racing to create duplicates.
#[derive(Debug, Default)]
pub struct FolderCache {
    slots: DashMap<String, Arc<Mutex<Option<String>>>>,
}

impl FolderCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the slot for a logical path, creating it if needed.
    /// The Arc is cloned out so the map shard lock is released before the
    /// slot's own lock is awaited.
    fn slot(&self, logical_path: &str) -> Arc<Mutex<Option<String>>> {
        self.slots
            .entry(logical_path.to_string())
            .or_default()
            .clone()
    }

    /// Number of resolved paths (test observability).
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true when nothing has been resolved yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Synchronizes validated downloads into cloud storage.
pub struct CloudSyncManager {
    client: Arc<dyn CloudClient>,
    cache: FolderCache,
    /// Serializes duplicate-check + upload per remote name, so concurrent
    /// tasks with the same logical name cannot both pass the check.
    upload_locks: DashMap<String, Arc<Mutex<()>>>,
    policy: RetryPolicy,
    root_folder: String,
    check_duplicates: bool,
    create_folders: bool,
    tracker: OperationTracker,
    cancel: CancellationToken,
}

impl CloudSyncManager {
    /// Creates a manager from application cloud settings.
    #[must_use]
    pub fn new(
        client: Arc<dyn CloudClient>,
        settings: &CloudStorageSettings,
        policy: RetryPolicy,
        tracker: OperationTracker,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            cache: FolderCache::new(),
            upload_locks: DashMap::new(),
            policy,
            root_folder: settings.root_folder_name.clone(),
            check_duplicates: settings.check_duplicates,
            create_folders: settings.create_folders_automatically,
            tracker,
            cancel,
        }
    }

    /// Verifies provider credentials before the cloud phase starts.
    ///
    /// # Errors
    ///
    /// Propagates the provider's authentication error.
    pub async fn ensure_authenticated(&self) -> Result<(), CloudError> {
        self.client.ensure_authenticated().await
    }

    /// Synchronizes one downloaded task.
    ///
    /// Resolves `root/<department folder>`, checks for an identically
    /// named remote file when duplicate checking is enabled, and uploads
    /// otherwise. On success the task is marked `Uploaded` (or
    /// `SkippedDuplicate`) with its remote identifier; on terminal failure
    /// it is marked `UploadFailed` with a reason.
    ///
    /// # Errors
    ///
    /// Returns the terminal [`SyncError`]; the task has already been
    /// marked accordingly.
    #[instrument(skip_all, fields(task_id = task.id, title = %task.title))]
    pub async fn upload(&self, task: &mut DocumentTask) -> Result<CloudReceipt, SyncError> {
        let scope = self.tracker.scoped(
            "cloud_upload",
            document_context(&task.department_name, &task.title),
        );

        let result = self.sync_task(task).await;
        match &result {
            Ok(receipt) => {
                task.cloud_status = match receipt.outcome {
                    SyncOutcome::Uploaded => CloudStatus::Uploaded,
                    SyncOutcome::SkippedDuplicate => CloudStatus::SkippedDuplicate,
                };
                task.cloud_file_id = Some(receipt.file_id.clone());
                scope.finish_ok();
            }
            Err(error) => {
                task.cloud_status = CloudStatus::UploadFailed;
                task.failure_reason = Some(error.to_string());
                warn!(error = %error, "upload failed");
                scope.finish_err();
            }
        }
        result
    }

    async fn sync_task(&self, task: &DocumentTask) -> Result<CloudReceipt, SyncError> {
        let local_path = task.local_path.clone().ok_or_else(|| {
            SyncError::Cloud(CloudError::Io {
                path: PathBuf::from(&task.title),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "task has no downloaded file",
                ),
            })
        })?;

        let remote_name = task.remote_name(&file_extension(&local_path));
        let folder_id = self
            .resolve_folder(&[self.root_folder.clone(), task.folder_name.clone()])
            .await?;

        let name_lock = self
            .upload_locks
            .entry(format!("{folder_id}/{remote_name}"))
            .or_default()
            .clone();
        let _name_guard = name_lock.lock().await;

        if self.check_duplicates {
            let existing = self
                .with_retry(|| {
                    let client = Arc::clone(&self.client);
                    let folder_id = folder_id.clone();
                    async move { client.list_files(&folder_id).await }
                })
                .await?;

            if let Some(duplicate) = existing.iter().find(|f| f.name == remote_name) {
                info!(
                    file_id = %duplicate.id,
                    name = %remote_name,
                    "remote duplicate found, skipping upload"
                );
                return Ok(CloudReceipt {
                    file_id: duplicate.id.clone(),
                    outcome: SyncOutcome::SkippedDuplicate,
                });
            }
        }

        let file_id = self
            .with_retry(|| {
                let client = Arc::clone(&self.client);
                let folder_id = folder_id.clone();
                let local_path = local_path.clone();
                let remote_name = remote_name.clone();
                async move {
                    client
                        .upload_file(&folder_id, &local_path, &remote_name)
                        .await
                }
            })
            .await?;

        Ok(CloudReceipt {
            file_id,
            outcome: SyncOutcome::Uploaded,
        })
    }

    /// Resolves a logical folder path to its remote identifier, creating
    /// missing folders when allowed. At most one remote creation happens
    /// per unique path per run.
    async fn resolve_folder(&self, segments: &[String]) -> Result<String, SyncError> {
        let mut parent: Option<String> = None;
        let mut logical = String::new();

        for segment in segments {
            if !logical.is_empty() {
                logical.push('/');
            }
            logical.push_str(segment);

            let slot = self.cache.slot(&logical);
            let mut guard = slot.lock().await;

            if let Some(id) = guard.as_ref() {
                parent = Some(id.clone());
                continue;
            }

            let found = self
                .with_retry(|| {
                    let client = Arc::clone(&self.client);
                    let parent = parent.clone();
                    let name = segment.clone();
                    async move { client.find_folder(parent.as_deref(), &name).await }
                })
                .await?;

            let id = match found {
                Some(id) => id,
                None if self.create_folders => {
                    debug!(path = %logical, "creating remote folder");
                    self.with_retry(|| {
                        let client = Arc::clone(&self.client);
                        let parent = parent.clone();
                        let name = segment.clone();
                        async move { client.create_folder(parent.as_deref(), &name).await }
                    })
                    .await?
                }
                None => {
                    return Err(SyncError::Cloud(CloudError::InvalidFolder {
                        folder_id: logical,
                    }));
                }
            };

            *guard = Some(id.clone());
            parent = Some(id);
        }

        parent.ok_or_else(|| {
            SyncError::Cloud(CloudError::InvalidFolder {
                folder_id: "(empty path)".to_string(),
            })
        })
    }

    async fn with_retry<T, F, Fut>(&self, op: F) -> Result<T, SyncError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CloudError>>,
    {
        retry::execute(&self.policy, &self.cancel, classify_cloud_error, op)
            .await
            .map_err(SyncError::from)
    }
}
