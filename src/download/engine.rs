//! Run coordinator: bounded worker pool over departments and documents.
//!
//! The engine iterates configured departments in priority order, resolves
//! each department's document list through the site adapter, and drives
//! every document through the download state machine on a
//! semaphore-bounded pool. Validated downloads are handed to the cloud
//! sync manager within the same worker. Lifecycle status is persisted
//! through the task store at every terminal transition.
//!
//! # Concurrency Model
//!
//! - Each document runs in its own Tokio task
//! - A semaphore permit is acquired before spawning, so documents within
//!   a department start in adapter order
//! - Each worker owns one browser session for the duration of its task;
//!   sessions are never shared
//! - Rate pacing (inter-request delay) is applied per source just before
//!   navigation; the inter-department delay is observed before the first
//!   task of each new department
//! - A run-level cancellation token is observed at every suspension
//!   point; in-flight tasks terminate as failed with reason `cancelled`

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::error::{DownloadError, classify_download_error};
use super::machine::DownloadStateMachine;
use crate::adapter::{DocumentRef, SiteAdapter};
use crate::browser::{BrowserProvider, BrowserSession};
use crate::cloud::{CloudSyncManager, SyncOutcome};
use crate::config::{Department, RateLimiting};
use crate::retry::{self, RetryPolicy};
use crate::store::{StoreError, TaskStore};
use crate::task::{CloudStatus, DocumentTask, LifecycleState};
use crate::tracker::{OperationTracker, department_context};

/// Minimum allowed concurrency value.
const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
const MAX_CONCURRENCY: usize = 100;

/// Default concurrency if not specified.
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Error type for engine construction and persistence failures.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// Task store operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Statistics from one run.
///
/// Uses atomic counters for thread-safe updates from concurrent workers.
#[derive(Debug, Default)]
pub struct RunStats {
    downloaded: AtomicUsize,
    failed: AtomicUsize,
    uploaded: AtomicUsize,
    skipped_duplicates: AtomicUsize,
    upload_failed: AtomicUsize,
    retried: AtomicUsize,
}

impl RunStats {
    /// Creates a stats tracker with zero counts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Documents that reached `Downloaded`.
    #[must_use]
    pub fn downloaded(&self) -> usize {
        self.downloaded.load(Ordering::SeqCst)
    }

    /// Documents that terminated in `Failed`.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Documents uploaded to cloud storage.
    #[must_use]
    pub fn uploaded(&self) -> usize {
        self.uploaded.load(Ordering::SeqCst)
    }

    /// Documents skipped because an identical remote file existed.
    #[must_use]
    pub fn skipped_duplicates(&self) -> usize {
        self.skipped_duplicates.load(Ordering::SeqCst)
    }

    /// Documents whose upload terminally failed.
    #[must_use]
    pub fn upload_failed(&self) -> usize {
        self.upload_failed.load(Ordering::SeqCst)
    }

    /// Total retry sleeps across all tasks and phases.
    #[must_use]
    pub fn retried(&self) -> usize {
        self.retried.load(Ordering::SeqCst)
    }

    /// Total documents that reached a download-phase terminal state.
    #[must_use]
    pub fn total(&self) -> usize {
        self.downloaded() + self.failed()
    }

    fn add_retried(&self, count: u32) {
        self.retried.fetch_add(count as usize, Ordering::SeqCst);
    }
}

/// Per-source navigation pacing.
///
/// Navigations against one source are spaced by at least the configured
/// inter-request delay (or the `requests_per_minute` interval, whichever
/// is longer). Different sources pace independently.
#[derive(Debug)]
pub struct RateGate {
    min_interval: Duration,
    department_delay: Duration,
    sources: DashMap<String, Arc<Mutex<Option<tokio::time::Instant>>>>,
}

impl RateGate {
    /// Builds a gate from a site's rate-limiting block.
    #[must_use]
    pub fn new(limits: &RateLimiting) -> Self {
        let rpm_interval = if limits.requests_per_minute > 0 {
            60.0 / f64::from(limits.requests_per_minute)
        } else {
            0.0
        };
        Self {
            min_interval: Duration::from_secs_f64(
                limits.delay_between_requests.max(rpm_interval).max(0.0),
            ),
            department_delay: Duration::from_secs_f64(limits.delay_between_departments.max(0.0)),
            sources: DashMap::new(),
        }
    }

    /// Effective minimum interval between navigations.
    #[must_use]
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Waits until the source may be hit again. Returns `false` when the
    /// run was cancelled while waiting.
    pub async fn pace(&self, source_id: &str, cancel: &CancellationToken) -> bool {
        // Clone the Arc out so the map shard lock is not held across await
        let slot = self
            .sources
            .entry(source_id.to_string())
            .or_default()
            .clone();
        let mut last = slot.lock().await;

        if let Some(previous) = *last {
            let ready_at = previous + self.min_interval;
            if ready_at > tokio::time::Instant::now() {
                tokio::select! {
                    () = cancel.cancelled() => return false,
                    () = tokio::time::sleep_until(ready_at) => {}
                }
            }
        }
        *last = Some(tokio::time::Instant::now());
        true
    }

    /// Observes the inter-department delay. Returns `false` when the run
    /// was cancelled while waiting.
    pub async fn department_pause(&self, cancel: &CancellationToken) -> bool {
        if self.department_delay.is_zero() {
            return true;
        }
        debug!(
            delay_ms = self.department_delay.as_millis() as u64,
            "pausing before next department"
        );
        tokio::select! {
            () = cancel.cancelled() => false,
            () = tokio::time::sleep(self.department_delay) => true,
        }
    }
}

/// Engine tuning knobs beyond the collaborators.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Maximum concurrent documents (1-100).
    pub concurrency: usize,
    /// Root directory for local artifacts; departments get subfolders.
    pub download_dir: PathBuf,
    /// Delete local artifacts after a successful upload.
    pub cleanup_after_upload: bool,
}

/// Everything a spawned worker needs, cheap to clone.
#[derive(Clone)]
struct WorkerContext {
    machine: Arc<DownloadStateMachine>,
    browser: Arc<dyn BrowserProvider>,
    cloud: Option<Arc<CloudSyncManager>>,
    cloud_enabled: Arc<AtomicBool>,
    store: TaskStore,
    gate: Arc<RateGate>,
    stats: Arc<RunStats>,
    cancel: CancellationToken,
    download_dir: PathBuf,
    cleanup_after_upload: bool,
}

/// Coordinates one synchronization run.
pub struct SyncEngine {
    semaphore: Arc<Semaphore>,
    concurrency: usize,
    adapter: Arc<SiteAdapter>,
    policy: RetryPolicy,
    machine: Arc<DownloadStateMachine>,
    browser: Arc<dyn BrowserProvider>,
    cloud: Option<Arc<CloudSyncManager>>,
    cloud_enabled: Arc<AtomicBool>,
    store: TaskStore,
    tracker: OperationTracker,
    gate: Arc<RateGate>,
    cancel: CancellationToken,
    options: EngineOptions,
}

impl SyncEngine {
    /// Creates an engine over the given collaborators.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] when
    /// `options.concurrency` is outside `1..=100`.
    pub fn new(
        options: EngineOptions,
        adapter: Arc<SiteAdapter>,
        browser: Arc<dyn BrowserProvider>,
        machine: Arc<DownloadStateMachine>,
        cloud: Option<Arc<CloudSyncManager>>,
        store: TaskStore,
        tracker: OperationTracker,
        cancel: CancellationToken,
    ) -> Result<Self, EngineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&options.concurrency) {
            return Err(EngineError::InvalidConcurrency {
                value: options.concurrency,
            });
        }

        let config = adapter.config();
        debug!(
            concurrency = options.concurrency,
            site = %adapter.site_name(),
            cloud = cloud.is_some(),
            "creating sync engine"
        );

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(options.concurrency)),
            concurrency: options.concurrency,
            policy: RetryPolicy::from_error_handling(&config.error_handling),
            gate: Arc::new(RateGate::new(&config.rate_limiting)),
            adapter,
            machine,
            browser,
            cloud,
            cloud_enabled: Arc::new(AtomicBool::new(true)),
            store,
            tracker,
            cancel,
            options,
        })
    }

    /// Returns the configured concurrency limit.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Processes all enabled departments and returns aggregate stats.
    ///
    /// Per-task failures never abort sibling tasks or the run; they are
    /// recorded on the task rows and in the stats. Store failures abort
    /// the run; without persistence the run state would silently drift.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] when the task store fails.
    #[instrument(skip_all, fields(site = %self.adapter.site_name()))]
    pub async fn run(&self, departments: &[Department]) -> Result<Arc<RunStats>, EngineError> {
        let stats = Arc::new(RunStats::new());
        info!("starting synchronization run");

        let mut first = true;
        for department in departments.iter().filter(|d| d.enabled) {
            if self.cancel.is_cancelled() {
                info!("run cancelled, stopping before next department");
                break;
            }
            if !first && !self.gate.department_pause(&self.cancel).await {
                break;
            }
            first = false;

            if !self.process_department(department, &stats).await? {
                error!("configuration error aborts the remaining departments of this source");
                break;
            }
        }

        info!(
            downloaded = stats.downloaded(),
            failed = stats.failed(),
            uploaded = stats.uploaded(),
            skipped_duplicates = stats.skipped_duplicates(),
            upload_failed = stats.upload_failed(),
            retried = stats.retried(),
            "run complete"
        );
        Ok(stats)
    }

    /// Resolves the document list for one department. Public so preview
    /// flows (`--dry-run`) can list without downloading.
    ///
    /// # Errors
    ///
    /// Returns a [`DownloadError`] when navigation or extraction fails
    /// after retries.
    pub async fn resolve_department_documents(
        &self,
        department: &Department,
    ) -> Result<Vec<DocumentRef>, DownloadError> {
        let scope = self.tracker.scoped(
            "resolve_documents",
            department_context(&department.name),
        );

        let staging = self
            .options
            .download_dir
            .join(".staging")
            .join(format!("list-{}", department.id));
        let session = self
            .browser
            .new_session(&staging)
            .await
            .map_err(|e| DownloadError::from_browser(e, "open session"))?;

        let result = self.collect_documents(session.as_ref()).await;
        if let Err(e) = session.close().await {
            warn!(error = %e, "failed to close listing session");
        }

        match &result {
            Ok(documents) => {
                info!(
                    department = %department.name,
                    count = documents.len(),
                    "resolved document list"
                );
                scope.finish_ok();
            }
            Err(_) => scope.finish_err(),
        }
        result
    }

    /// Navigates the list page(s) and collects document references.
    async fn collect_documents(
        &self,
        browser: &dyn BrowserSession,
    ) -> Result<Vec<DocumentRef>, DownloadError> {
        let source = self.adapter.site_name().to_string();
        let start_url = self.adapter.start_url();
        let list_selector = self.adapter.document_list_selector().to_string();

        if !self.gate.pace(&source, &self.cancel).await {
            return Err(DownloadError::Cancelled);
        }

        retry::execute(&self.policy, &self.cancel, classify_download_error, || {
            let url = start_url.clone();
            async move {
                browser
                    .navigate(&url)
                    .await
                    .map_err(|e| DownloadError::from_browser(e, "navigate to document list"))
            }
        })
        .await
        .map_err(DownloadError::from)?;

        let mut elements =
            retry::execute(&self.policy, &self.cancel, classify_download_error, || {
                let selector = list_selector.clone();
                async move {
                    browser
                        .find_elements(&selector)
                        .await
                        .map_err(|e| DownloadError::from_browser(e, "extract document list"))
                }
            })
            .await
            .map_err(DownloadError::from)?;

        // Walk pagination when configured; a missing "next" trigger ends
        // the walk without error.
        if let Some(pagination) = &self.adapter.config().navigation.pagination {
            if let Some(next_selector) = pagination.next_page_selector.clone() {
                for page in 1..pagination.max_pages {
                    let next = match browser.find_element(&next_selector).await {
                        Ok(handle) => handle,
                        Err(crate::browser::BrowserError::NotFound { .. }) => break,
                        Err(e) => return Err(DownloadError::from_browser(e, "locate next page")),
                    };
                    browser
                        .click(&next)
                        .await
                        .map_err(|e| DownloadError::from_browser(e, "advance page"))?;

                    if !self.gate.pace(&source, &self.cancel).await {
                        return Err(DownloadError::Cancelled);
                    }
                    let more = browser
                        .find_elements(&list_selector)
                        .await
                        .map_err(|e| DownloadError::from_browser(e, "extract document list"))?;
                    debug!(page = page + 1, count = more.len(), "collected page");
                    elements.extend(more);
                }
            }
        }

        Ok(self.adapter.resolve(&elements))
    }

    /// Resolves and dispatches one department's documents. Returns
    /// `false` when a configuration error makes the whole source
    /// unprocessable.
    async fn process_department(
        &self,
        department: &Department,
        stats: &Arc<RunStats>,
    ) -> Result<bool, EngineError> {
        let scope = self.tracker.scoped(
            "process_department",
            department_context(&department.name),
        );

        let documents = match self.resolve_department_documents(department).await {
            Ok(documents) => documents,
            Err(error) => {
                // A broken config dooms every department of this source;
                // any other resolution failure abandons this department
                // only and siblings keep running.
                error!(
                    department = %department.name,
                    error = %error,
                    "failed to resolve document list, skipping department"
                );
                scope.finish_err();
                return Ok(!matches!(error, DownloadError::Config(_)));
            }
        };

        let skip_failed = self
            .adapter
            .config()
            .error_handling
            .skip_on_repeated_failure;

        let mut seen_titles = std::collections::HashSet::new();
        let mut handles = Vec::new();
        for document in documents {
            if self.cancel.is_cancelled() {
                break;
            }

            let title = self.adapter.sanitize_title(&document.raw_title);
            if title.is_empty() {
                debug!(raw_title = %document.raw_title, "skipping untitled document");
                continue;
            }
            // Listings sometimes repeat an entry; one logical document
            // gets one task per run.
            if !seen_titles.insert(title.clone()) {
                debug!(%title, "duplicate listing entry, skipping");
                continue;
            }

            let mut task = DocumentTask::new(self.adapter.site_name(), department, &document, title);
            let record = self.store.upsert_discovered(&task).await?;
            task.id = record.id;

            let prior_state = record.state();
            let prior_cloud = record.cloud_status();

            // Restart safety: completed work is not repeated.
            let needs_download = match prior_state {
                LifecycleState::Downloaded => false,
                LifecycleState::Failed if skip_failed => {
                    debug!(task_id = task.id, "skipping previously failed document");
                    continue;
                }
                _ => true,
            };
            if !needs_download {
                let cloud_done = prior_cloud.is_terminal() && prior_cloud != CloudStatus::UploadFailed;
                if self.cloud.is_none() || cloud_done {
                    debug!(task_id = task.id, "already synchronized, skipping");
                    continue;
                }
                // Resume the upload phase against the recorded artifact
                task.state = LifecycleState::Downloaded;
                task.local_path = record.local_path.clone().map(PathBuf::from);
                task.file_size = record.file_size.map(|s| s as u64);
            }

            // Acquiring the permit here (not inside the worker) bounds
            // concurrency and keeps start order equal to adapter order.
            let Ok(permit) = Arc::clone(&self.semaphore).acquire_owned().await else {
                break;
            };

            let ctx = WorkerContext {
                machine: Arc::clone(&self.machine),
                browser: Arc::clone(&self.browser),
                cloud: self.cloud.clone(),
                cloud_enabled: Arc::clone(&self.cloud_enabled),
                store: self.store.clone(),
                gate: Arc::clone(&self.gate),
                stats: Arc::clone(stats),
                cancel: self.cancel.clone(),
                download_dir: self.options.download_dir.clone(),
                cleanup_after_upload: self.options.cleanup_after_upload,
            };

            handles.push(tokio::spawn(async move {
                let _permit = permit;
                process_task(ctx, task, needs_download).await;
            }));
        }

        // Drain this department before the inter-department pause so the
        // pause separates actual traffic, not just dispatch.
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "worker task panicked");
            }
        }

        scope.finish_ok();
        Ok(true)
    }
}

/// Drives one document through download and upload on a pool worker.
async fn process_task(ctx: WorkerContext, mut task: DocumentTask, needs_download: bool) {
    if needs_download && !download_phase(&ctx, &mut task).await {
        return;
    }

    upload_phase(&ctx, &mut task).await;
}

/// Runs the download state machine for one task. Returns `true` when the
/// task reached `Downloaded`.
async fn download_phase(ctx: &WorkerContext, task: &mut DocumentTask) -> bool {
    if !ctx.gate.pace(&task.source_id, &ctx.cancel).await {
        mark_download_failure(ctx, task, &DownloadError::Cancelled).await;
        return false;
    }

    let staging = ctx
        .download_dir
        .join(".staging")
        .join(format!("task-{}", task.id));
    let session = match ctx.browser.new_session(&staging).await {
        Ok(session) => session,
        Err(e) => {
            let error = DownloadError::from_browser(e, "open session");
            mark_download_failure(ctx, task, &error).await;
            return false;
        }
    };

    if let Err(e) = ctx.store.mark_state(task.id, LifecycleState::Navigating).await {
        warn!(task_id = task.id, error = %e, "failed to persist in-flight state");
    }

    let dest_dir = ctx.download_dir.join(&task.folder_name);
    let outcome = ctx.machine.run(session.as_ref(), task, &dest_dir).await;
    ctx.stats.add_retried(outcome.retries);

    if let Err(e) = session.close().await {
        warn!(task_id = task.id, error = %e, "failed to close session");
    }
    if let Err(e) = tokio::fs::remove_dir_all(&staging).await {
        debug!(path = %staging.display(), error = %e, "staging cleanup failed");
    }

    if outcome.is_downloaded() {
        let persisted = ctx
            .store
            .mark_downloaded(
                task.id,
                task.local_path.as_deref().unwrap_or(Path::new("")),
                task.file_size.unwrap_or(0),
            )
            .await;
        if let Err(e) = persisted {
            warn!(task_id = task.id, error = %e, "failed to persist downloaded state");
        }
        ctx.stats.downloaded.fetch_add(1, Ordering::SeqCst);
        true
    } else {
        let reason = task
            .failure_reason
            .clone()
            .unwrap_or_else(|| "unknown failure".to_string());
        if let Err(e) = ctx.store.mark_failed(task.id, &reason).await {
            warn!(task_id = task.id, error = %e, "failed to persist failed state");
        }
        ctx.stats.failed.fetch_add(1, Ordering::SeqCst);
        false
    }
}

async fn mark_download_failure(ctx: &WorkerContext, task: &mut DocumentTask, error: &DownloadError) {
    task.state = LifecycleState::Failed;
    task.failure_reason = Some(error.to_string());
    if let Err(e) = ctx.store.mark_failed(task.id, &error.to_string()).await {
        warn!(task_id = task.id, error = %e, "failed to persist failed state");
    }
    ctx.stats.failed.fetch_add(1, Ordering::SeqCst);
}

/// Hands a downloaded task to the cloud sync manager, if one is active.
async fn upload_phase(ctx: &WorkerContext, task: &mut DocumentTask) {
    let Some(cloud) = &ctx.cloud else {
        return;
    };
    if !ctx.cloud_enabled.load(Ordering::SeqCst) {
        debug!(task_id = task.id, "cloud phase disabled, leaving task pending");
        return;
    }

    match cloud.upload(task).await {
        Ok(receipt) => {
            let file_id = receipt.file_id.as_str();
            let persisted = match receipt.outcome {
                SyncOutcome::Uploaded => {
                    ctx.stats.uploaded.fetch_add(1, Ordering::SeqCst);
                    ctx.store.mark_uploaded(task.id, file_id).await
                }
                SyncOutcome::SkippedDuplicate => {
                    ctx.stats.skipped_duplicates.fetch_add(1, Ordering::SeqCst);
                    ctx.store.mark_skipped_duplicate(task.id, file_id).await
                }
            };
            if let Err(e) = persisted {
                warn!(task_id = task.id, error = %e, "failed to persist cloud status");
            }

            if ctx.cleanup_after_upload && receipt.outcome == SyncOutcome::Uploaded {
                if let Some(path) = &task.local_path {
                    if let Err(e) = tokio::fs::remove_file(path).await {
                        warn!(path = %path.display(), error = %e, "cleanup after upload failed");
                    }
                }
            }
        }
        Err(error) => {
            ctx.stats.upload_failed.fetch_add(1, Ordering::SeqCst);
            let reason = error.to_string();
            if let Err(e) = ctx.store.mark_upload_failed(task.id, &reason).await {
                warn!(task_id = task.id, error = %e, "failed to persist upload failure");
            }
            if error.is_auth() {
                // Auth problems poison every subsequent upload; disable
                // the cloud phase for the rest of the run.
                if ctx.cloud_enabled.swap(false, Ordering::SeqCst) {
                    error!(error = %reason, "cloud authentication failed, disabling uploads for this run");
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_gate_uses_longer_of_delay_and_rpm() {
        // 20 requests/minute = 3s interval, same as delay_between_requests
        let gate = RateGate::new(&RateLimiting {
            requests_per_minute: 20,
            delay_between_requests: 1.0,
            delay_between_departments: 10.0,
        });
        assert_eq!(gate.min_interval(), Duration::from_secs(3));

        let gate = RateGate::new(&RateLimiting {
            requests_per_minute: 60,
            delay_between_requests: 5.0,
            delay_between_departments: 10.0,
        });
        assert_eq!(gate.min_interval(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_gate_spaces_same_source_requests() {
        let gate = RateGate::new(&RateLimiting {
            requests_per_minute: 0,
            delay_between_requests: 2.0,
            delay_between_departments: 0.0,
        });
        let cancel = CancellationToken::new();

        let started = tokio::time::Instant::now();
        assert!(gate.pace("consultant_ru", &cancel).await);
        assert!(gate.pace("consultant_ru", &cancel).await);
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_gate_sources_pace_independently() {
        let gate = RateGate::new(&RateLimiting {
            requests_per_minute: 0,
            delay_between_requests: 60.0,
            delay_between_departments: 0.0,
        });
        let cancel = CancellationToken::new();

        let started = tokio::time::Instant::now();
        assert!(gate.pace("site_a", &cancel).await);
        assert!(gate.pace("site_b", &cancel).await);
        // No cross-source delay
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_rate_gate_pace_observes_cancellation() {
        let gate = RateGate::new(&RateLimiting {
            requests_per_minute: 0,
            delay_between_requests: 3600.0,
            delay_between_departments: 0.0,
        });
        let cancel = CancellationToken::new();

        assert!(gate.pace("slow", &cancel).await);
        cancel.cancel();
        assert!(!gate.pace("slow", &cancel).await);
    }

    #[test]
    fn test_run_stats_counts() {
        let stats = RunStats::new();
        stats.downloaded.fetch_add(2, Ordering::SeqCst);
        stats.failed.fetch_add(1, Ordering::SeqCst);
        stats.add_retried(3);

        assert_eq!(stats.downloaded(), 2);
        assert_eq!(stats.failed(), 1);
        assert_eq!(stats.total(), 3);
        assert_eq!(stats.retried(), 3);
    }
}
