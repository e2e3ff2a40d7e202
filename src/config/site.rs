//! Per-source site configuration.
//!
//! A [`SiteConfig`] declares everything the extraction engine needs to know
//! about one source: where to navigate, which selectors locate documents and
//! the download trigger, how to clean extracted titles, what a valid artifact
//! looks like, and how aggressively the source may be hit.

use std::collections::HashMap;

use serde::Deserialize;

use super::ConfigError;

/// Identity block for a source.
#[derive(Debug, Clone, Deserialize)]
pub struct SiteInfo {
    /// Stable source identifier (e.g. `consultant_ru`).
    pub name: String,
    /// Base URL all relative locators are joined against.
    pub base_url: String,
    /// Declared page encoding (informational).
    #[serde(default = "default_encoding")]
    pub encoding: String,
    /// Declared content language (informational).
    #[serde(default)]
    pub language: String,
}

fn default_encoding() -> String {
    "utf-8".to_string()
}

/// Pagination behavior for document-list pages.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Pagination {
    /// Selector for the "next page" trigger; absent means a single page.
    #[serde(default)]
    pub next_page_selector: Option<String>,
    /// Upper bound on pages visited per department.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
}

fn default_max_pages() -> u32 {
    1
}

/// Navigation entry point and list-page structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Navigation {
    /// Path (relative to `base_url`) of the document list page.
    pub start_url: String,
    /// Selector matching one element per listed document.
    pub document_list_selector: String,
    /// Optional pagination over the list.
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

/// Title cleanup rules applied to raw extracted titles.
#[derive(Debug, Clone, Deserialize)]
pub struct TitleProcessing {
    /// Prefixes stripped from the front, longest match first.
    #[serde(default)]
    pub remove_prefixes: Vec<String>,
    /// Suffixes stripped from the end, longest match first.
    #[serde(default)]
    pub remove_suffixes: Vec<String>,
    /// Maximum title length in characters after cleanup.
    #[serde(default = "default_max_length")]
    pub max_length: usize,
    /// Pattern whose matches are collapsed via `replacement`.
    #[serde(default = "default_cleanup_regex")]
    pub cleanup_regex: String,
    /// Replacement text for `cleanup_regex` matches.
    #[serde(default = "default_replacement")]
    pub replacement: String,
}

fn default_max_length() -> usize {
    100
}

fn default_cleanup_regex() -> String {
    r"\s+".to_string()
}

fn default_replacement() -> String {
    " ".to_string()
}

impl Default for TitleProcessing {
    fn default() -> Self {
        Self {
            remove_prefixes: Vec::new(),
            remove_suffixes: Vec::new(),
            max_length: default_max_length(),
            cleanup_regex: default_cleanup_regex(),
            replacement: default_replacement(),
        }
    }
}

/// Document extraction rules: the logical selector map and title cleanup.
#[derive(Debug, Clone, Deserialize)]
pub struct Extraction {
    /// Logical selector names mapped to selector strings.
    pub selectors: HashMap<String, String>,
    /// Title cleanup rules.
    #[serde(default)]
    pub title_processing: TitleProcessing,
}

/// Artifact validation bounds.
#[derive(Debug, Clone, Deserialize)]
pub struct FileValidation {
    /// Minimum acceptable artifact size in bytes.
    pub min_size: u64,
    /// Maximum acceptable artifact size in bytes.
    pub max_size: u64,
    /// Whether to verify file-format signatures (magic bytes).
    #[serde(default)]
    pub check_content: bool,
}

/// Download trigger and artifact expectations.
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadSection {
    /// Trigger method (informational; clicking is the only shipped method).
    #[serde(default = "default_method")]
    pub method: String,
    /// Selector of the export/download trigger on a document page.
    pub button_selector: String,
    /// Seconds to allow for the artifact to materialize after the click.
    #[serde(default = "default_wait_after_click")]
    pub wait_after_click: u64,
    /// Extensions the artifact may carry (e.g. `[".docx", ".doc"]`).
    pub expected_file_types: Vec<String>,
    /// Size/content validation bounds.
    pub validation: FileValidation,
}

fn default_method() -> String {
    "click".to_string()
}

fn default_wait_after_click() -> u64 {
    10
}

/// Request pacing limits for one source.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RateLimiting {
    /// Hard ceiling on navigations per minute.
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    /// Minimum seconds between consecutive navigations.
    #[serde(default = "default_delay_between_requests")]
    pub delay_between_requests: f64,
    /// Seconds to pause before the first task of a new department.
    #[serde(default = "default_delay_between_departments")]
    pub delay_between_departments: f64,
}

fn default_requests_per_minute() -> u32 {
    20
}

fn default_delay_between_requests() -> f64 {
    3.0
}

fn default_delay_between_departments() -> f64 {
    10.0
}

impl Default for RateLimiting {
    fn default() -> Self {
        Self {
            requests_per_minute: default_requests_per_minute(),
            delay_between_requests: default_delay_between_requests(),
            delay_between_departments: default_delay_between_departments(),
        }
    }
}

/// Retry behavior for transient failures against this source.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ErrorHandling {
    /// Total attempts per operation, including the first (>= 1).
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Base backoff delay in seconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay: f64,
    /// Whether the delay doubles each attempt.
    #[serde(default = "default_true")]
    pub exponential_backoff: bool,
    /// Whether to re-navigate before retrying an extraction step.
    #[serde(default)]
    pub refresh_page_on_error: bool,
    /// Whether a task is abandoned after its attempts are exhausted.
    /// Resolved as per-task exhaustion; there is no cross-task breaker.
    #[serde(default = "default_true")]
    pub skip_on_repeated_failure: bool,
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay() -> f64 {
    5.0
}

fn default_true() -> bool {
    true
}

impl Default for ErrorHandling {
    fn default() -> Self {
        Self {
            retry_attempts: default_retry_attempts(),
            retry_delay: default_retry_delay(),
            exponential_backoff: true,
            refresh_page_on_error: false,
            skip_on_repeated_failure: true,
        }
    }
}

/// Complete declarative description of one document source.
///
/// Loaded once per source and immutable afterwards. All extraction behavior
/// is driven by this data through one generic engine; there are no per-site
/// code paths.
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Source identity.
    pub site_info: SiteInfo,
    /// Navigation entry point.
    pub navigation: Navigation,
    /// Selector map and title rules.
    pub extraction: Extraction,
    /// Download trigger and validation.
    pub download: DownloadSection,
    /// Request pacing.
    #[serde(default)]
    pub rate_limiting: RateLimiting,
    /// Retry behavior.
    #[serde(default)]
    pub error_handling: ErrorHandling,
}

impl SiteConfig {
    /// Checks structural invariants that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when size bounds are inverted, the
    /// extension set is empty, or retry attempts are zero, and
    /// [`ConfigError::Regex`] when the cleanup pattern does not compile.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let site = &self.site_info.name;

        if self.download.validation.min_size >= self.download.validation.max_size {
            return Err(ConfigError::Invalid {
                site: site.clone(),
                reason: format!(
                    "validation min_size ({}) must be below max_size ({})",
                    self.download.validation.min_size, self.download.validation.max_size
                ),
            });
        }

        if self.download.expected_file_types.is_empty() {
            return Err(ConfigError::Invalid {
                site: site.clone(),
                reason: "expected_file_types must not be empty".to_string(),
            });
        }

        if self.error_handling.retry_attempts == 0 {
            return Err(ConfigError::Invalid {
                site: site.clone(),
                reason: "retry_attempts must be at least 1".to_string(),
            });
        }

        let pattern = &self.extraction.title_processing.cleanup_regex;
        regex::Regex::new(pattern).map_err(|source| ConfigError::Regex {
            pattern: pattern.clone(),
            source,
        })?;

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::fixtures;

    #[test]
    fn test_site_config_parses_and_validates() {
        let config = fixtures::site_config();

        assert_eq!(config.site_info.name, "consultant_ru");
        assert_eq!(config.navigation.start_url, "/document/instructions/");
        assert_eq!(
            config.extraction.selectors.get("document_title").unwrap(),
            "h1.document-title"
        );
        assert_eq!(config.download.wait_after_click, 8);
        assert!(config.download.validation.check_content);
        assert_eq!(config.error_handling.retry_attempts, 3);
        assert!((config.rate_limiting.delay_between_requests - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_site_config_rejects_inverted_size_bounds() {
        let mut config = fixtures::site_config();
        config.download.validation.min_size = 20_000_000;

        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_site_config_rejects_empty_extension_set() {
        let mut config = fixtures::site_config();
        config.download.expected_file_types.clear();

        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_site_config_rejects_zero_retry_attempts() {
        let mut config = fixtures::site_config();
        config.error_handling.retry_attempts = 0;

        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_site_config_rejects_bad_cleanup_regex() {
        let mut config = fixtures::site_config();
        config.extraction.title_processing.cleanup_regex = "[unclosed".to_string();

        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Regex { .. })));
    }

    #[test]
    fn test_error_handling_defaults_applied() {
        let config: ErrorHandling = serde_json::from_str("{}").unwrap();

        assert_eq!(config.retry_attempts, 3);
        assert!(config.exponential_backoff);
        assert!(!config.refresh_page_on_error);
        assert!(config.skip_on_repeated_failure);
    }

    #[test]
    fn test_rate_limiting_defaults_applied() {
        let config: RateLimiting = serde_json::from_str("{}").unwrap();

        assert_eq!(config.requests_per_minute, 20);
        assert!((config.delay_between_requests - 3.0).abs() < f64::EPSILON);
        assert!((config.delay_between_departments - 10.0).abs() < f64::EPSILON);
    }
}
