//! Cloud storage collaborator boundary and sync orchestration.
//!
//! The core talks to cloud storage through the narrow [`CloudClient`]
//! contract: authenticate, list, create folders, upload. The shipped
//! implementation ([`drive::DriveClient`]) speaks a Drive-style REST API
//! over plain reqwest; the [`sync::CloudSyncManager`] layers folder
//! caching, duplicate detection, and retry on top of any client.

pub mod drive;
pub mod sync;

pub use drive::DriveClient;
pub use sync::{CloudReceipt, CloudSyncManager, FolderCache, SyncError, SyncOutcome};

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::retry::ErrorClass;

/// One file as reported by the cloud provider.
#[derive(Debug, Clone)]
pub struct RemoteFile {
    /// Provider-assigned identifier.
    pub id: String,
    /// File name within its folder.
    pub name: String,
    /// Size in bytes, when the provider reports it.
    pub size: Option<u64>,
}

/// Errors surfaced by the cloud collaborator.
#[derive(Debug, Error)]
pub enum CloudError {
    /// The provider rejected our credentials. Fatal for the run's cloud
    /// phase until re-authentication.
    #[error("cloud authentication failed: {message}")]
    Auth {
        /// Provider-supplied detail.
        message: String,
    },

    /// Stored credentials are missing or unreadable.
    #[error("cloud credentials unavailable at {path}: {message}")]
    Credentials {
        /// Expected credentials location.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },

    /// A folder identifier was rejected by the provider.
    #[error("invalid cloud folder `{folder_id}`")]
    InvalidFolder {
        /// The rejected identifier.
        folder_id: String,
    },

    /// Transport-level failure.
    #[error("cloud api network error: {message}")]
    Network {
        /// Description of the failure.
        message: String,
    },

    /// The provider throttled us (HTTP 429).
    #[error("rate limited by cloud api")]
    RateLimited {
        /// Server-mandated wait, when a Retry-After header was present.
        retry_after: Option<Duration>,
    },

    /// Any other provider error.
    #[error("cloud api error (HTTP {status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Provider-supplied detail.
        message: String,
    },

    /// Local filesystem failure while reading the upload source.
    #[error("io error reading {path}: {source}")]
    Io {
        /// The local path involved.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Classifies a cloud error for the retry controller.
///
/// Network faults, throttling, and 5xx responses are transient; auth,
/// credential, folder, and local IO problems are fatal.
#[must_use]
pub fn classify_cloud_error(error: &CloudError) -> ErrorClass {
    match error {
        CloudError::Network { .. } | CloudError::RateLimited { .. } => ErrorClass::Transient,
        CloudError::Api { status, .. } if *status >= 500 => ErrorClass::Transient,
        CloudError::Auth { .. }
        | CloudError::Credentials { .. }
        | CloudError::InvalidFolder { .. }
        | CloudError::Api { .. }
        | CloudError::Io { .. } => ErrorClass::Fatal,
    }
}

/// Narrow contract the sync manager needs from a cloud provider.
#[async_trait]
pub trait CloudClient: Send + Sync {
    /// Verifies that usable credentials are loaded, refreshing them if the
    /// provider supports it.
    async fn ensure_authenticated(&self) -> Result<(), CloudError>;

    /// Lists files directly inside a folder.
    async fn list_files(&self, folder_id: &str) -> Result<Vec<RemoteFile>, CloudError>;

    /// Finds a folder by name under a parent (`None` = provider root).
    async fn find_folder(
        &self,
        parent_id: Option<&str>,
        name: &str,
    ) -> Result<Option<String>, CloudError>;

    /// Creates a folder under a parent and returns its identifier.
    async fn create_folder(
        &self,
        parent_id: Option<&str>,
        name: &str,
    ) -> Result<String, CloudError>;

    /// Uploads a local file into a folder under the given name and
    /// returns the new file's identifier.
    async fn upload_file(
        &self,
        folder_id: &str,
        local_path: &Path,
        name: &str,
    ) -> Result<String, CloudError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_transient_cloud_errors() {
        assert_eq!(
            classify_cloud_error(&CloudError::Network {
                message: "reset".to_string()
            }),
            ErrorClass::Transient
        );
        assert_eq!(
            classify_cloud_error(&CloudError::RateLimited { retry_after: None }),
            ErrorClass::Transient
        );
        assert_eq!(
            classify_cloud_error(&CloudError::Api {
                status: 503,
                message: "unavailable".to_string()
            }),
            ErrorClass::Transient
        );
    }

    #[test]
    fn test_classify_fatal_cloud_errors() {
        assert_eq!(
            classify_cloud_error(&CloudError::Auth {
                message: "expired".to_string()
            }),
            ErrorClass::Fatal
        );
        assert_eq!(
            classify_cloud_error(&CloudError::InvalidFolder {
                folder_id: "x".to_string()
            }),
            ErrorClass::Fatal
        );
        assert_eq!(
            classify_cloud_error(&CloudError::Api {
                status: 404,
                message: "not found".to_string()
            }),
            ErrorClass::Fatal
        );
    }
}
