//! Document task model and lifecycle states.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::adapter::DocumentRef;
use crate::config::Department;

/// Download-phase lifecycle of a document task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Discovered, waiting for a worker.
    Pending,
    /// Navigating to the document page.
    Navigating,
    /// Locating the export trigger.
    Extracting,
    /// Waiting for the file artifact to materialize.
    AwaitingFile,
    /// Checking the artifact against validation bounds.
    Validating,
    /// Terminal success: a validated local file exists.
    Downloaded,
    /// Terminal failure after retry exhaustion or a fatal error.
    Failed,
}

impl LifecycleState {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Navigating => "navigating",
            Self::Extracting => "extracting",
            Self::AwaitingFile => "awaiting_file",
            Self::Validating => "validating",
            Self::Downloaded => "downloaded",
            Self::Failed => "failed",
        }
    }

    /// Returns true once no further download-phase transitions occur.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Downloaded | Self::Failed)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for LifecycleState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "navigating" => Ok(Self::Navigating),
            "extracting" => Ok(Self::Extracting),
            "awaiting_file" => Ok(Self::AwaitingFile),
            "validating" => Ok(Self::Validating),
            "downloaded" => Ok(Self::Downloaded),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("invalid lifecycle state: {s}")),
        }
    }
}

/// Cloud-sync phase status of a document task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloudStatus {
    /// Not yet uploaded.
    Pending,
    /// Uploaded; the remote identifier is recorded on the task.
    Uploaded,
    /// A remote file with the same logical name already existed.
    SkippedDuplicate,
    /// Terminal upload failure.
    UploadFailed,
}

impl CloudStatus {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Uploaded => "uploaded",
            Self::SkippedDuplicate => "skipped_duplicate",
            Self::UploadFailed => "upload_failed",
        }
    }

    /// Returns true once no further cloud-phase transitions occur.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for CloudStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CloudStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "uploaded" => Ok(Self::Uploaded),
            "skipped_duplicate" => Ok(Self::SkippedDuplicate),
            "upload_failed" => Ok(Self::UploadFailed),
            _ => Err(format!("invalid cloud status: {s}")),
        }
    }
}

/// One unit of work: a single document moving from discovery through
/// download and upload.
///
/// Mutated exclusively by the download state machine until it reaches
/// `Downloaded`/`Failed`, then exclusively by the cloud sync manager until
/// its cloud status is terminal. Timestamps are stamped by the task store
/// when the corresponding transition is persisted.
#[derive(Debug, Clone)]
pub struct DocumentTask {
    /// Store row id; 0 until persisted.
    pub id: i64,
    /// Source the document was discovered on.
    pub source_id: String,
    /// Department identifier.
    pub department_id: String,
    /// Department display name (used in logs).
    pub department_name: String,
    /// Remote folder name for this department.
    pub folder_name: String,
    /// Title exactly as extracted.
    pub raw_title: String,
    /// Sanitized title; part of the task's logical identity.
    pub title: String,
    /// Absolute URL of the document page.
    pub url: String,
    /// Validated local file path, absent until downloaded.
    pub local_path: Option<PathBuf>,
    /// Artifact size in bytes, absent until validated.
    pub file_size: Option<u64>,
    /// Download-phase state.
    pub state: LifecycleState,
    /// Cloud-phase status.
    pub cloud_status: CloudStatus,
    /// Remote file identifier, absent until uploaded (or matched as a
    /// duplicate).
    pub cloud_file_id: Option<String>,
    /// Download completion timestamp, stamped by the store.
    pub downloaded_at: Option<String>,
    /// Upload completion timestamp, stamped by the store.
    pub uploaded_at: Option<String>,
    /// Human-readable reason for a terminal failure.
    pub failure_reason: Option<String>,
}

impl DocumentTask {
    /// Creates a pending task from a resolved document reference.
    #[must_use]
    pub fn new(
        source_id: &str,
        department: &Department,
        document: &DocumentRef,
        sanitized_title: String,
    ) -> Self {
        Self {
            id: 0,
            source_id: source_id.to_string(),
            department_id: department.id.clone(),
            department_name: department.name.clone(),
            folder_name: department.folder_name.clone(),
            raw_title: document.raw_title.clone(),
            title: sanitized_title,
            url: document.locator.clone(),
            local_path: None,
            file_size: None,
            state: LifecycleState::Pending,
            cloud_status: CloudStatus::Pending,
            cloud_file_id: None,
            downloaded_at: None,
            uploaded_at: None,
            failure_reason: None,
        }
    }

    /// Returns the filename stem for the local artifact: the sanitized
    /// title with filesystem-hostile characters replaced.
    #[must_use]
    pub fn file_stem(&self) -> String {
        clean_file_stem(&self.title)
    }

    /// Returns the logical remote file name for a given artifact extension
    /// (e.g. `.docx`).
    #[must_use]
    pub fn remote_name(&self, extension: &str) -> String {
        format!("{}{extension}", self.file_stem())
    }
}

impl fmt::Display for DocumentTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DocumentTask {{ id: {}, title: {}, state: {}, cloud: {} }}",
            self.id, self.title, self.state, self.cloud_status
        )
    }
}

/// Replaces characters that are invalid in filenames and collapses runs of
/// whitespace. Long stems are cut at 100 characters with an ellipsis.
#[must_use]
pub fn clean_file_stem(title: &str) -> String {
    const INVALID: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

    let replaced: String = title
        .chars()
        .map(|c| if INVALID.contains(&c) { '_' } else { c })
        .collect();
    let collapsed = replaced.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() > 100 {
        let cut: String = collapsed.chars().take(97).collect();
        format!("{}...", cut.trim_end())
    } else {
        collapsed
    }
}
