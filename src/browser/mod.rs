//! Browser-automation collaborator boundary.
//!
//! The orchestration core drives pages through the narrow [`BrowserSession`]
//! contract: navigate, find, click, and wait for a download artifact.
//! Driver and session management details live behind [`BrowserProvider`]
//! implementations; the shipped implementation speaks the WebDriver wire
//! protocol (see [`webdriver`]).
//!
//! Sessions are not safe for concurrent use; each pool worker owns one
//! session for the duration of a task and sessions are never shared.

pub mod webdriver;

pub use webdriver::{WebDriverBrowser, WebDriverProvider};

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::adapter::ElementSummary;

/// Errors surfaced by the browser collaborator.
#[derive(Debug, Error)]
pub enum BrowserError {
    /// Transport-level failure talking to the driver.
    #[error("webdriver request failed: {message}")]
    Http {
        /// Description of the transport failure.
        message: String,
    },

    /// No element matched the selector.
    #[error("no element matched selector `{selector}`")]
    NotFound {
        /// The selector that matched nothing.
        selector: String,
    },

    /// A wait elapsed without the expected condition.
    #[error("timed out waiting for {what}")]
    TimedOut {
        /// What was being waited for.
        what: String,
    },

    /// The driver answered outside the protocol.
    #[error("webdriver protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// Local filesystem failure around the download directory.
    #[error("io error at {path}: {source}")]
    Io {
        /// The path involved.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Opaque handle to a located page element.
#[derive(Debug, Clone)]
pub struct ElementHandle {
    /// Driver-assigned element identifier.
    pub id: String,
}

/// One live browser session.
///
/// Methods take `&self`; implementations use interior mutability where
/// they track state. A session still must not be used concurrently; the
/// worker pool guarantees single ownership.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Navigates the session to a URL.
    async fn navigate(&self, url: &str) -> Result<(), BrowserError>;

    /// Locates a single element by CSS selector.
    ///
    /// # Errors
    ///
    /// Returns [`BrowserError::NotFound`] when nothing matches.
    async fn find_element(&self, selector: &str) -> Result<ElementHandle, BrowserError>;

    /// Locates all elements matching a CSS selector and reports their
    /// text and link target. Used for document-list extraction.
    async fn find_elements(&self, selector: &str) -> Result<Vec<ElementSummary>, BrowserError>;

    /// Clicks a previously located element.
    async fn click(&self, element: &ElementHandle) -> Result<(), BrowserError>;

    /// Waits for a new, complete file to appear in the session's download
    /// directory.
    ///
    /// # Errors
    ///
    /// Returns [`BrowserError::TimedOut`] when no artifact materializes
    /// within `timeout`.
    async fn wait_for_download(&self, timeout: Duration) -> Result<PathBuf, BrowserError>;

    /// Tears the session down. Best-effort; errors are reported but
    /// sessions may already be gone.
    async fn close(&self) -> Result<(), BrowserError>;
}

/// Creates browser sessions for pool workers.
#[async_trait]
pub trait BrowserProvider: Send + Sync {
    /// Opens a fresh session whose downloads land in `download_dir`.
    async fn new_session(
        &self,
        download_dir: &std::path::Path,
    ) -> Result<Box<dyn BrowserSession>, BrowserError>;
}
