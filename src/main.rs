//! CLI entry point for the docsync tool.

use std::io::IsTerminal;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use docsync_core::{
    AppSettings, CloudStatus, CloudSyncManager, Database, Department, DownloadStateMachine,
    DriveClient, EngineOptions, LifecycleState, OperationTracker, RetryPolicy, SiteAdapter,
    SyncEngine, TaskStore, ValidationRules, WebDriverProvider, load_departments, load_site_config,
};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");
    info!("Docsync starting");

    // Load configuration: application settings, site description,
    // department list. All validated at load; nothing global.
    let settings = AppSettings::load(&args.config_dir.join("settings.json"))?;
    let site_config = load_site_config(&args.config_dir, &args.site)?;
    let departments = load_departments(&args.config_dir.join("departments.json"))?;
    let adapter = Arc::new(SiteAdapter::new(site_config)?);

    let enabled = departments.iter().filter(|d| d.enabled).count();
    info!(
        site = %adapter.site_name(),
        departments = enabled,
        "configuration loaded"
    );

    // Run-level cancellation, wired to ctrl-c. Every suspension point in
    // the engine observes this token.
    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, cancelling run");
            ctrl_c_cancel.cancel();
        }
    });

    let tracker = OperationTracker::new();

    // State database lives next to the downloads
    tokio::fs::create_dir_all(&args.output_dir).await?;
    let state_dir = args.output_dir.join(".docsync");
    tokio::fs::create_dir_all(&state_dir).await?;
    let db = Database::new(&state_dir.join("state.db")).await?;
    let store = TaskStore::new(db);
    store.reset_in_flight().await?;

    let provider = Arc::new(
        WebDriverProvider::new(&args.webdriver_url, !args.headed)
            .with_page_load_timeout(Duration::from_secs(settings.download.timeout)),
    );

    // Site validation bounds, narrowed by the document type from settings
    let mut rules = ValidationRules::from_site(adapter.config());
    if let Some(doc_type) = settings.document_types.get(&args.document_type) {
        rules = rules.merge_document_type(doc_type);
    }

    let machine = Arc::new(DownloadStateMachine::new(
        &adapter,
        rules,
        tracker.clone(),
        cancel.clone(),
    ));

    // The cloud phase is optional: --no-upload and --dry-run skip it, and
    // a failed up-front authentication downgrades the run to download-only
    // rather than aborting it.
    let cloud = if args.no_upload || args.dry_run {
        None
    } else {
        let mut cloud_settings = settings.cloud_storage.clone();
        if let Some(root) = &args.root_folder {
            cloud_settings.root_folder_name = root.clone();
        }
        let client = Arc::new(DriveClient::new(cloud_settings.credentials_path.clone()));
        let manager = CloudSyncManager::new(
            client,
            &cloud_settings,
            RetryPolicy::from_error_handling(&adapter.config().error_handling),
            tracker.clone(),
            cancel.clone(),
        );
        match manager.ensure_authenticated().await {
            Ok(()) => Some(Arc::new(manager)),
            Err(e) => {
                warn!(error = %e, "cloud authentication failed; continuing without uploads");
                None
            }
        }
    };

    let options = EngineOptions {
        concurrency: args
            .concurrency
            .map_or(settings.download.max_concurrent_downloads, usize::from),
        download_dir: args.output_dir.clone(),
        cleanup_after_upload: settings.cloud_storage.cleanup_after_upload,
    };

    let engine = SyncEngine::new(
        options,
        Arc::clone(&adapter),
        provider,
        machine,
        cloud,
        store.clone(),
        tracker,
        cancel.clone(),
    )?;

    if args.dry_run {
        return dry_run_preview(&engine, &departments).await;
    }

    let use_spinner = std::io::stderr().is_terminal() && !args.quiet;
    let (progress_handle, progress_stop) = spawn_progress_ui(use_spinner, store.clone());

    let stats = engine.run(&departments).await?;

    progress_stop.store(true, Ordering::SeqCst);
    if let Some(handle) = progress_handle {
        let _ = handle.await;
    }

    info!(
        downloaded = stats.downloaded(),
        failed = stats.failed(),
        uploaded = stats.uploaded(),
        skipped_duplicates = stats.skipped_duplicates(),
        upload_failed = stats.upload_failed(),
        retried = stats.retried(),
        "Docsync complete"
    );

    if cancel.is_cancelled() {
        warn!("run was interrupted; incomplete tasks remain pending for the next run");
    }

    Ok(())
}

/// Resolves and prints the document list without downloading anything.
async fn dry_run_preview(engine: &SyncEngine, departments: &[Department]) -> Result<()> {
    for department in departments.iter().filter(|d| d.enabled) {
        match engine.resolve_department_documents(department).await {
            Ok(documents) => {
                println!("{} ({} documents)", department.name, documents.len());
                for document in documents {
                    println!("  {} -> {}", document.raw_title, document.locator);
                }
            }
            Err(e) => {
                warn!(department = %department.name, error = %e, "resolution failed");
                println!("{}: resolution failed ({e})", department.name);
            }
        }
    }
    Ok(())
}

/// Spawns a spinner that live-reports store counts while the run is in
/// progress. Returns the join handle and a stop flag.
fn spawn_progress_ui(
    use_spinner: bool,
    store: TaskStore,
) -> (Option<JoinHandle<()>>, Arc<AtomicBool>) {
    let stop = Arc::new(AtomicBool::new(false));
    if !use_spinner {
        return (None, stop);
    }

    let stop_flag = Arc::clone(&stop);
    let handle = tokio::spawn(async move {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(Duration::from_millis(120));

        while !stop_flag.load(Ordering::SeqCst) {
            let downloaded = store
                .count_by_state(LifecycleState::Downloaded)
                .await
                .unwrap_or(0);
            let failed = store.count_by_state(LifecycleState::Failed).await.unwrap_or(0);
            let uploaded = store
                .count_by_cloud_status(CloudStatus::Uploaded)
                .await
                .unwrap_or(0);
            let skipped = store
                .count_by_cloud_status(CloudStatus::SkippedDuplicate)
                .await
                .unwrap_or(0);

            bar.set_message(format!(
                "downloaded {downloaded} | failed {failed} | uploaded {uploaded} | duplicates {skipped}"
            ));
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
        bar.finish_and_clear();
    });

    (Some(handle), stop)
}
