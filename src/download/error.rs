//! Error taxonomy for the download phase.
//!
//! Classification drives retry behavior: network, extraction, and timeout
//! failures are transient; configuration and validation failures are
//! fatal. Retry exhaustion and cancellation are terminal wrappers.

use std::path::PathBuf;

use thiserror::Error;

use crate::browser::BrowserError;
use crate::config::ConfigError;
use crate::retry::{ErrorClass, RetryError};

/// Errors that can occur while downloading one document.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Malformed adapter configuration. Fatal; aborts the whole source.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Transport-level failure during a browser operation.
    #[error("network error during {operation}: {message}")]
    Network {
        /// The operation that failed (navigate, click, ...).
        operation: String,
        /// Description of the failure.
        message: String,
    },

    /// The expected element never appeared.
    #[error("extraction failed: no element matched `{selector}`")]
    Extraction {
        /// The selector that matched nothing.
        selector: String,
    },

    /// A wait elapsed without the expected condition.
    #[error("timed out waiting for {what}")]
    Timeout {
        /// What was being waited for.
        what: String,
    },

    /// The artifact is structurally wrong. Fatal; a malformed export will
    /// not fix itself.
    #[error("validation failed for {path}: {reason}")]
    Validation {
        /// The artifact that failed validation.
        path: PathBuf,
        /// Which bound was violated.
        reason: ValidationFailure,
    },

    /// Local filesystem failure.
    #[error("io error at {path}: {source}")]
    Io {
        /// The path involved.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Retry budget exhausted; wraps the last transient error.
    #[error("failed after {attempts} attempts: {source}")]
    RetryExhausted {
        /// The last underlying error.
        #[source]
        source: Box<DownloadError>,
        /// Total number of attempts made.
        attempts: u32,
    },

    /// The run-level cancellation signal fired.
    #[error("cancelled")]
    Cancelled,
}

/// Specific validation bound that an artifact violated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationFailure {
    /// Size below the configured minimum.
    TooSmall {
        /// Observed size.
        actual: u64,
        /// Configured minimum.
        min: u64,
    },
    /// Size above the configured maximum.
    TooLarge {
        /// Observed size.
        actual: u64,
        /// Configured maximum.
        max: u64,
    },
    /// Extension not in the allowed set.
    UnexpectedType {
        /// Observed extension (with dot), lowercased.
        extension: String,
    },
    /// Leading bytes do not match the format signature.
    BadSignature {
        /// Extension whose signature was checked.
        extension: String,
    },
}

impl std::fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooSmall { actual, min } => {
                write!(f, "file too small ({actual} bytes < minimum {min})")
            }
            Self::TooLarge { actual, max } => {
                write!(f, "file too large ({actual} bytes > maximum {max})")
            }
            Self::UnexpectedType { extension } => {
                write!(f, "unexpected file type `{extension}`")
            }
            Self::BadSignature { extension } => {
                write!(f, "content does not match `{extension}` signature")
            }
        }
    }
}

impl DownloadError {
    /// Maps a browser collaborator error into the download taxonomy,
    /// naming the operation for context.
    #[must_use]
    pub fn from_browser(error: BrowserError, operation: &str) -> Self {
        match error {
            BrowserError::NotFound { selector } => Self::Extraction { selector },
            BrowserError::TimedOut { what } => Self::Timeout { what },
            BrowserError::Http { message } | BrowserError::Protocol { message } => Self::Network {
                operation: operation.to_string(),
                message,
            },
            BrowserError::Io { path, source } => Self::Io { path, source },
        }
    }
}

impl From<RetryError<DownloadError>> for DownloadError {
    fn from(error: RetryError<DownloadError>) -> Self {
        match error {
            RetryError::Fatal(e) => e,
            RetryError::Exhausted { source, attempts } => Self::RetryExhausted {
                source: Box::new(source),
                attempts,
            },
            RetryError::Cancelled => Self::Cancelled,
        }
    }
}

/// Classifies a download error for the retry controller.
///
/// | Error | Class | Rationale |
/// |-------|-------|-----------|
/// | Network | Transient | Connectivity may recover |
/// | Extraction | Transient | Element may appear after reload |
/// | Timeout | Transient | Slow page or slow export |
/// | Validation | Fatal | Malformed export will not fix itself |
/// | Config | Fatal | Broken config aborts the source |
/// | Io | Fatal | Local filesystem problem |
/// | RetryExhausted | Fatal | Already terminal |
/// | Cancelled | Fatal | Cooperative shutdown, not a fault |
#[must_use]
pub fn classify_download_error(error: &DownloadError) -> ErrorClass {
    match error {
        DownloadError::Network { .. }
        | DownloadError::Extraction { .. }
        | DownloadError::Timeout { .. } => ErrorClass::Transient,
        DownloadError::Config(_)
        | DownloadError::Validation { .. }
        | DownloadError::Io { .. }
        | DownloadError::RetryExhausted { .. }
        | DownloadError::Cancelled => ErrorClass::Fatal,
    }
}
