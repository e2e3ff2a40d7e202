//! Configuration loading for application settings, site descriptions, and
//! department lists.
//!
//! All configuration is JSON on disk, deserialized with serde and validated
//! once at load time. Configuration values are plain data passed explicitly
//! into component constructors; nothing here is global or mutable after load.

mod site;

pub use site::{
    DownloadSection, ErrorHandling, Extraction, FileValidation, Navigation, Pagination,
    RateLimiting, SiteConfig, SiteInfo, TitleProcessing,
};

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a configuration file from disk.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// The file that could not be read.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A configuration file contained invalid JSON.
    #[error("invalid JSON in {path}: {source}")]
    Parse {
        /// The file that failed to parse.
        path: PathBuf,
        /// The underlying serde error.
        #[source]
        source: serde_json::Error,
    },

    /// A required selector key is absent from a site's selector map.
    #[error("missing selector `{name}` in site config `{site}`")]
    MissingSelector {
        /// The site whose config is incomplete.
        site: String,
        /// The missing logical selector name.
        name: String,
    },

    /// A site config violated a structural invariant.
    #[error("invalid site config `{site}`: {reason}")]
    Invalid {
        /// The site whose config is invalid.
        site: String,
        /// Human-readable description of the violation.
        reason: String,
    },

    /// The configured title cleanup pattern failed to compile.
    #[error("invalid cleanup regex `{pattern}`: {source}")]
    Regex {
        /// The offending pattern.
        pattern: String,
        /// The underlying regex error.
        #[source]
        source: regex::Error,
    },
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Cloud storage settings from `settings.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct CloudStorageSettings {
    /// Provider key (informational; only one REST backend ships today).
    pub default_provider: String,
    /// Whether missing remote folders are created on demand.
    #[serde(default = "default_true")]
    pub create_folders_automatically: bool,
    /// Whether existing remote files suppress re-upload.
    #[serde(default = "default_true")]
    pub check_duplicates: bool,
    /// Path to the stored cloud credentials file.
    pub credentials_path: PathBuf,
    /// Name of the top-level remote folder.
    pub root_folder_name: String,
    /// Whether local files are deleted after a successful upload.
    #[serde(default)]
    pub cleanup_after_upload: bool,
}

/// Size bounds shared by document-type and site-level validation.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SizeBounds {
    /// Minimum acceptable file size in bytes.
    pub min_size: u64,
    /// Maximum acceptable file size in bytes.
    pub max_size: u64,
}

/// Per-document-type overrides from `settings.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentTypeSettings {
    /// Extensions accepted for this document type (e.g. `[".docx", ".doc"]`).
    pub supported_extensions: Vec<String>,
    /// Size bounds for this document type.
    pub validation: SizeBounds,
}

/// Download scheduling settings from `settings.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadSettings {
    /// Maximum number of concurrently processed documents.
    #[serde(default = "default_concurrency")]
    pub max_concurrent_downloads: usize,
    /// Per-document download timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout: u64,
}

fn default_true() -> bool {
    true
}

fn default_concurrency() -> usize {
    3
}

fn default_timeout_secs() -> u64 {
    60
}

/// Application-level settings (`settings.json`).
#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    /// Cloud storage behavior.
    pub cloud_storage: CloudStorageSettings,
    /// Per-document-type validation overrides.
    #[serde(default)]
    pub document_types: HashMap<String, DocumentTypeSettings>,
    /// Download scheduling.
    pub download: DownloadSettings,
}

impl AppSettings {
    /// Loads application settings from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] or [`ConfigError::Parse`] on read/parse
    /// failure.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let settings: Self = read_json(path)?;
        info!(path = %path.display(), "Loaded application settings");
        Ok(settings)
    }
}

/// A department (category) of documents to retrieve.
///
/// Departments map one-to-one onto remote folders under the configured
/// root folder.
#[derive(Debug, Clone, Deserialize)]
pub struct Department {
    /// Stable identifier used in persisted state.
    pub id: String,
    /// Display name used in logs and status output.
    pub name: String,
    /// Remote folder name for this department's documents.
    pub folder_name: String,
    /// Lower numbers are processed first.
    #[serde(default = "default_priority")]
    pub priority: i32,
    /// Disabled departments are skipped entirely.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_priority() -> i32 {
    1
}

#[derive(Debug, Deserialize)]
struct DepartmentsFile {
    departments: Vec<Department>,
}

/// Loads the department list from a JSON file, sorted by priority.
///
/// Disabled departments are retained (callers decide whether to skip them)
/// but ordering is priority-first, file-order second.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] or [`ConfigError::Parse`] on read/parse
/// failure.
pub fn load_departments(path: &Path) -> Result<Vec<Department>, ConfigError> {
    let file: DepartmentsFile = read_json(path)?;
    let mut departments = file.departments;
    departments.sort_by_key(|d| d.priority);
    info!(
        path = %path.display(),
        count = departments.len(),
        "Loaded departments"
    );
    Ok(departments)
}

/// Loads a site configuration from `<config_dir>/sites/<name>.json` and
/// validates its invariants.
///
/// # Errors
///
/// Returns [`ConfigError`] on read, parse, or invariant failure.
pub fn load_site_config(config_dir: &Path, site_name: &str) -> Result<SiteConfig, ConfigError> {
    let path = config_dir.join("sites").join(format!("{site_name}.json"));
    let config: SiteConfig = read_json(&path)?;
    config.validate()?;
    info!(path = %path.display(), site = %config.site_info.name, "Loaded site configuration");
    Ok(config)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::SiteConfig;

    /// Canonical site configuration JSON used across unit tests.
    pub(crate) const SITE_JSON: &str = r#"{
        "site_info": {
            "name": "consultant_ru",
            "base_url": "https://www.consultant.ru",
            "encoding": "utf-8",
            "language": "ru"
        },
        "navigation": {
            "start_url": "/document/instructions/",
            "document_list_selector": "a.document-link"
        },
        "extraction": {
            "selectors": {
                "document_links": "a.document-link",
                "document_title": "h1.document-title"
            },
            "title_processing": {
                "remove_prefixes": ["Должностная инструкция"],
                "remove_suffixes": ["(Подготовлен для системы КонсультантПлюс)"],
                "max_length": 100
            }
        },
        "download": {
            "button_selector": "a.export-word",
            "wait_after_click": 8,
            "expected_file_types": [".docx", ".doc"],
            "validation": { "min_size": 30000, "max_size": 10485760, "check_content": true }
        },
        "rate_limiting": {
            "requests_per_minute": 20,
            "delay_between_requests": 3,
            "delay_between_departments": 10
        },
        "error_handling": {
            "retry_attempts": 3,
            "retry_delay": 5,
            "exponential_backoff": true
        }
    }"#;

    /// Parsed and validated form of [`SITE_JSON`].
    #[allow(clippy::unwrap_used)]
    pub(crate) fn site_config() -> SiteConfig {
        let config: SiteConfig = serde_json::from_str(SITE_JSON).unwrap();
        config.validate().unwrap();
        config
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn settings_json() -> &'static str {
        r#"{
            "cloud_storage": {
                "default_provider": "drive",
                "credentials_path": "config/credentials.json",
                "root_folder_name": "Job Instructions"
            },
            "document_types": {
                "job_instruction": {
                    "supported_extensions": [".docx", ".doc"],
                    "validation": { "min_size": 30000, "max_size": 10485760 }
                }
            },
            "download": { "max_concurrent_downloads": 4, "timeout": 90 }
        }"#
    }

    #[test]
    fn test_app_settings_parse_with_defaults() {
        let settings: AppSettings = serde_json::from_str(settings_json()).unwrap();

        assert!(settings.cloud_storage.create_folders_automatically);
        assert!(settings.cloud_storage.check_duplicates);
        assert!(!settings.cloud_storage.cleanup_after_upload);
        assert_eq!(settings.download.max_concurrent_downloads, 4);
        assert_eq!(settings.download.timeout, 90);

        let doc_type = settings.document_types.get("job_instruction").unwrap();
        assert_eq!(doc_type.supported_extensions, vec![".docx", ".doc"]);
        assert_eq!(doc_type.validation.min_size, 30000);
    }

    #[test]
    fn test_app_settings_load_missing_file_is_io_error() {
        let temp = tempfile::tempdir().unwrap();
        let result = AppSettings::load(&temp.path().join("nope.json"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_app_settings_load_invalid_json_is_parse_error() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();
        let result = AppSettings::load(&path);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_load_departments_sorts_by_priority() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("departments.json");
        fs::write(
            &path,
            r#"{
                "departments": [
                    { "id": "hr", "name": "HR", "folder_name": "HR", "priority": 2 },
                    { "id": "sales", "name": "Sales", "folder_name": "Sales", "priority": 1 },
                    { "id": "it", "name": "IT", "folder_name": "IT", "enabled": false }
                ]
            }"#,
        )
        .unwrap();

        let departments = load_departments(&path).unwrap();
        assert_eq!(departments.len(), 3);
        // sales (1) and it (default 1) keep file order under the stable sort,
        // hr (2) moves last
        assert_eq!(departments[0].id, "sales");
        assert_eq!(departments[1].id, "it");
        assert_eq!(departments[2].id, "hr");
        assert!(!departments[1].enabled);
    }

    #[test]
    fn test_department_defaults() {
        let dept: Department = serde_json::from_str(
            r#"{ "id": "sales", "name": "Sales", "folder_name": "Sales Department" }"#,
        )
        .unwrap();
        assert_eq!(dept.priority, 1);
        assert!(dept.enabled);
    }
}
