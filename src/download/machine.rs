//! Per-document download state machine.
//!
//! Drives one [`DocumentTask`] through
//! `Pending → Navigating → Extracting → AwaitingFile → Validating →
//! Downloaded`, or to terminal `Failed` after retry exhaustion or a fatal
//! error. Each retryable transition is wrapped by the retry controller
//! with the site's policy; the validation step is never retried, since a
//! malformed export will not fix itself.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use super::error::{DownloadError, classify_download_error};
use super::validate::{ValidationRules, file_extension, validate_file};
use crate::adapter::SiteAdapter;
use crate::browser::BrowserSession;
use crate::retry::{self, RetryPolicy};
use crate::task::{DocumentTask, LifecycleState};
use crate::tracker::{OperationTracker, document_context};

/// Result of one state-machine run.
#[derive(Debug)]
pub struct MachineOutcome {
    /// Total retry sleeps performed across all transitions.
    pub retries: u32,
    /// The terminal error when the task ended in `Failed`.
    pub error: Option<DownloadError>,
}

impl MachineOutcome {
    /// Returns true when the task reached `Downloaded`.
    #[must_use]
    pub fn is_downloaded(&self) -> bool {
        self.error.is_none()
    }
}

/// Drives documents through the download lifecycle.
///
/// One machine instance is shared across pool workers; all per-document
/// state lives on the task itself.
#[derive(Debug)]
pub struct DownloadStateMachine {
    policy: RetryPolicy,
    rules: ValidationRules,
    button_selector: String,
    artifact_timeout: Duration,
    refresh_on_retry: bool,
    tracker: OperationTracker,
    cancel: CancellationToken,
}

impl DownloadStateMachine {
    /// Builds a machine from a site adapter and effective validation
    /// rules.
    #[must_use]
    pub fn new(
        adapter: &SiteAdapter,
        rules: ValidationRules,
        tracker: OperationTracker,
        cancel: CancellationToken,
    ) -> Self {
        let config = adapter.config();
        Self {
            policy: RetryPolicy::from_error_handling(&config.error_handling),
            rules,
            button_selector: adapter.download_button_selector().to_string(),
            artifact_timeout: Duration::from_secs(config.download.wait_after_click.max(1)),
            refresh_on_retry: config.error_handling.refresh_page_on_error,
            tracker,
            cancel,
        }
    }

    /// Runs one task to a terminal state.
    ///
    /// On success the task is `Downloaded` with its local path, size, and
    /// the artifact moved into `dest_dir` under its sanitized title. On
    /// failure the task is `Failed` with a human-readable reason; the
    /// error is also returned in the outcome for aggregation.
    #[instrument(skip_all, fields(task_id = task.id, title = %task.title))]
    pub async fn run(
        &self,
        browser: &dyn BrowserSession,
        task: &mut DocumentTask,
        dest_dir: &Path,
    ) -> MachineOutcome {
        let scope = self.tracker.scoped(
            "download_document",
            document_context(&task.department_name, &task.title),
        );

        let mut retries = 0u32;
        let result = self.drive(browser, task, dest_dir, &mut retries).await;

        match result {
            Ok(()) => {
                task.state = LifecycleState::Downloaded;
                task.failure_reason = None;
                info!(path = ?task.local_path, "document downloaded");
                scope.finish_ok();
                MachineOutcome {
                    retries,
                    error: None,
                }
            }
            Err(error) => {
                task.state = LifecycleState::Failed;
                task.failure_reason = Some(error.to_string());
                warn!(error = %error, "document failed");
                scope.finish_err();
                MachineOutcome {
                    retries,
                    error: Some(error),
                }
            }
        }
    }

    async fn drive(
        &self,
        browser: &dyn BrowserSession,
        task: &mut DocumentTask,
        dest_dir: &Path,
        retries: &mut u32,
    ) -> Result<(), DownloadError> {
        let url = task.url.clone();
        let selector = self.button_selector.clone();

        // Pending -> Navigating: open the document page.
        task.state = LifecycleState::Navigating;
        self.run_step(retries, || {
            let url = url.clone();
            async move {
                browser
                    .navigate(&url)
                    .await
                    .map_err(|e| DownloadError::from_browser(e, "navigate"))
            }
        })
        .await?;

        // Navigating -> Extracting: the export trigger must be present.
        // With refresh_page_on_error, retry attempts re-navigate first.
        task.state = LifecycleState::Extracting;
        let first_attempt = AtomicBool::new(true);
        self.run_step(retries, || {
            let url = url.clone();
            let selector = selector.clone();
            let refresh = self.refresh_on_retry && !first_attempt.swap(false, Ordering::SeqCst);
            async move {
                if refresh {
                    browser
                        .navigate(&url)
                        .await
                        .map_err(|e| DownloadError::from_browser(e, "re-navigate"))?;
                }
                browser
                    .find_element(&selector)
                    .await
                    .map_err(|e| DownloadError::from_browser(e, "locate export trigger"))?;
                Ok(())
            }
        })
        .await?;

        // Extracting -> AwaitingFile: fire the trigger and wait for the
        // artifact. The element is re-located per attempt; a handle from a
        // previous attempt may be stale after navigation or reload.
        task.state = LifecycleState::AwaitingFile;
        let timeout = self.artifact_timeout;
        let artifact = self
            .run_step(retries, || {
                let selector = selector.clone();
                async move {
                    let handle = browser
                        .find_element(&selector)
                        .await
                        .map_err(|e| DownloadError::from_browser(e, "locate export trigger"))?;
                    browser
                        .click(&handle)
                        .await
                        .map_err(|e| DownloadError::from_browser(e, "click export trigger"))?;
                    browser
                        .wait_for_download(timeout)
                        .await
                        .map_err(|e| DownloadError::from_browser(e, "await file artifact"))
                }
            })
            .await?;

        // AwaitingFile -> Validating: fatal on violation, zero retries.
        task.state = LifecycleState::Validating;
        let size = validate_file(&artifact, &self.rules).await?;

        // Validating -> Downloaded: move the artifact under its sanitized
        // title; each task owns a uniquely named file.
        let final_path = place_artifact(&artifact, dest_dir, &task.file_stem()).await?;
        task.local_path = Some(final_path);
        task.file_size = Some(size);
        Ok(())
    }

    /// Wraps one transition's operation with the retry controller,
    /// accumulating the number of retry sleeps into `retries`.
    async fn run_step<T, F, Fut>(
        &self,
        retries: &mut u32,
        mut op: F,
    ) -> Result<T, DownloadError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DownloadError>>,
    {
        let invocations = AtomicU32::new(0);
        let result = retry::execute(&self.policy, &self.cancel, classify_download_error, || {
            invocations.fetch_add(1, Ordering::SeqCst);
            op()
        })
        .await;
        *retries += invocations.load(Ordering::SeqCst).saturating_sub(1);
        result.map_err(DownloadError::from)
    }
}

/// Moves a downloaded artifact into `dest_dir` as `<stem><ext>`, adding a
/// numeric suffix when the name is already taken.
async fn place_artifact(
    artifact: &Path,
    dest_dir: &Path,
    stem: &str,
) -> Result<PathBuf, DownloadError> {
    tokio::fs::create_dir_all(dest_dir)
        .await
        .map_err(|source| DownloadError::Io {
            path: dest_dir.to_path_buf(),
            source,
        })?;

    let extension = file_extension(artifact);
    let mut candidate = dest_dir.join(format!("{stem}{extension}"));
    let mut suffix = 1u32;
    while tokio::fs::try_exists(&candidate)
        .await
        .map_err(|source| DownloadError::Io {
            path: candidate.clone(),
            source,
        })?
    {
        candidate = dest_dir.join(format!("{stem} ({suffix}){extension}"));
        suffix += 1;
    }

    tokio::fs::rename(artifact, &candidate)
        .await
        .map_err(|source| DownloadError::Io {
            path: candidate.clone(),
            source,
        })?;
    Ok(candidate)
}
