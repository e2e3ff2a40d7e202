//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Retrieve documents from configured web sources and synchronize them
/// into cloud storage.
///
/// Docsync reads a site description, a department list, and application
/// settings from the config directory, downloads every configured
/// document through a WebDriver endpoint, validates the artifacts, and
/// uploads them into a per-department cloud folder hierarchy.
#[derive(Parser, Debug)]
#[command(name = "docsync")]
#[command(author, version, about)]
pub struct Args {
    /// Configuration directory containing settings.json, departments.json,
    /// and sites/<site>.json
    #[arg(long, default_value = "config")]
    pub config_dir: PathBuf,

    /// Name of the site configuration to use (sites/<name>.json)
    #[arg(short, long, default_value = "consultant_ru")]
    pub site: String,

    /// Directory for downloaded artifacts and run state
    #[arg(short, long, default_value = "downloads")]
    pub output_dir: PathBuf,

    /// WebDriver endpoint to drive the browser through
    #[arg(long, default_value = "http://localhost:9515")]
    pub webdriver_url: String,

    /// Document type whose validation rules narrow the site's
    #[arg(long, default_value = "job_instruction")]
    pub document_type: String,

    /// Override the cloud root folder name from settings
    #[arg(long)]
    pub root_folder: Option<String>,

    /// Override max concurrent downloads (1-100)
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: Option<u8>,

    /// Resolve and list documents without downloading or uploading
    #[arg(long)]
    pub dry_run: bool,

    /// Download only; skip the cloud phase entirely
    #[arg(long)]
    pub no_upload: bool,

    /// Run the browser with a visible window
    #[arg(long)]
    pub headed: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}
