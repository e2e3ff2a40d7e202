//! Shared fixtures and mock collaborators for integration tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use docsync_core::adapter::ElementSummary;
use docsync_core::browser::{
    BrowserError, BrowserProvider, BrowserSession, ElementHandle,
};
use docsync_core::cloud::{CloudClient, CloudError, RemoteFile};
use docsync_core::config::{Department, SiteConfig};

/// Site configuration tuned for tests: no pacing delays, small retry
/// budget, permissive validation.
pub fn test_site_config() -> SiteConfig {
    let config: SiteConfig = serde_json::from_str(
        r#"{
            "site_info": {
                "name": "test_site",
                "base_url": "https://docs.example.com",
                "language": "ru"
            },
            "navigation": {
                "start_url": "/instructions/",
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
                "wait_after_click": 2,
                "expected_file_types": [".docx"],
                "validation": { "min_size": 100, "max_size": 1000000 }
            },
            "rate_limiting": {
                "requests_per_minute": 0,
                "delay_between_requests": 0,
                "delay_between_departments": 0
            },
            "error_handling": {
                "retry_attempts": 2,
                "retry_delay": 0.01,
                "exponential_backoff": false
            }
        }"#,
    )
    .expect("test site config parses");
    config.validate().expect("test site config is valid");
    config
}

/// A department fixture.
pub fn department(id: &str, name: &str, folder: &str) -> Department {
    serde_json::from_str(&format!(
        r#"{{ "id": "{id}", "name": "{name}", "folder_name": "{folder}" }}"#
    ))
    .expect("department fixture parses")
}

/// Browser provider serving a scripted site: a fixed document list per
/// start URL and a fixed-size artifact per download.
pub struct ScriptedProvider {
    /// Document-list elements returned for any list-page navigation.
    pub listings: HashMap<String, Vec<ElementSummary>>,
    /// Size of the artifact each session "downloads".
    pub artifact_size: usize,
    /// Sessions created so far (observability).
    pub sessions_created: AtomicU32,
    /// When set, document-page navigations fail this many times in total.
    pub navigate_failures: AtomicU32,
}

impl ScriptedProvider {
    pub fn new(artifact_size: usize) -> Self {
        Self {
            listings: HashMap::new(),
            artifact_size,
            sessions_created: AtomicU32::new(0),
            navigate_failures: AtomicU32::new(0),
        }
    }

    /// Registers the element list served when `url` is navigated to.
    pub fn with_listing(mut self, url: &str, elements: Vec<ElementSummary>) -> Self {
        self.listings.insert(url.to_string(), elements);
        self
    }
}

/// Shareable handle implementing [`BrowserProvider`]. The orphan rule
/// forbids implementing the foreign trait directly for `Arc<ScriptedProvider>`,
/// so this local newtype carries the shared `Arc` instead. Each session it
/// creates clones the same `Arc`, so test counters remain observable.
pub struct SharedScriptedProvider(pub Arc<ScriptedProvider>);

#[async_trait]
impl BrowserProvider for SharedScriptedProvider {
    async fn new_session(
        &self,
        download_dir: &Path,
    ) -> Result<Box<dyn BrowserSession>, BrowserError> {
        self.0.sessions_created.fetch_add(1, Ordering::SeqCst);
        tokio::fs::create_dir_all(download_dir)
            .await
            .map_err(|source| BrowserError::Io {
                path: download_dir.to_path_buf(),
                source,
            })?;
        Ok(Box::new(ScriptedSession {
            provider: Arc::clone(&self.0),
            download_dir: download_dir.to_path_buf(),
            current_url: Mutex::new(String::new()),
        }))
    }
}

/// One scripted session bound to its download directory.
pub struct ScriptedSession {
    provider: Arc<ScriptedProvider>,
    download_dir: PathBuf,
    current_url: Mutex<String>,
}

#[async_trait]
impl BrowserSession for ScriptedSession {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        // Scripted flakiness only affects document pages, never the
        // listing page, so tests can target the per-task retry path.
        let is_document_page = !self.provider.listings.contains_key(url);
        if is_document_page && self.provider.navigate_failures.load(Ordering::SeqCst) > 0 {
            self.provider.navigate_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(BrowserError::Http {
                message: "connection reset".to_string(),
            });
        }
        *self.current_url.lock().await = url.to_string();
        Ok(())
    }

    async fn find_element(&self, _selector: &str) -> Result<ElementHandle, BrowserError> {
        Ok(ElementHandle {
            id: "el-1".to_string(),
        })
    }

    async fn find_elements(&self, _selector: &str) -> Result<Vec<ElementSummary>, BrowserError> {
        let url = self.current_url.lock().await.clone();
        Ok(self.provider.listings.get(&url).cloned().unwrap_or_default())
    }

    async fn click(&self, _element: &ElementHandle) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn wait_for_download(&self, _timeout: Duration) -> Result<PathBuf, BrowserError> {
        let artifact = self.download_dir.join("export.docx");
        tokio::fs::write(&artifact, vec![b'x'; self.provider.artifact_size])
            .await
            .map_err(|source| BrowserError::Io {
                path: artifact.clone(),
                source,
            })?;
        Ok(artifact)
    }

    async fn close(&self) -> Result<(), BrowserError> {
        Ok(())
    }
}

/// Element fixture helper.
pub fn link(text: &str, href: &str) -> ElementSummary {
    ElementSummary {
        text: text.to_string(),
        href: Some(href.to_string()),
    }
}

/// In-memory cloud provider with call counters.
#[derive(Default)]
pub struct MockCloud {
    pub folders: Mutex<HashMap<String, (Option<String>, String)>>,
    pub files: Mutex<Vec<(String, RemoteFile)>>,
    pub next_id: AtomicU32,
    pub create_folder_calls: AtomicU32,
    pub upload_calls: AtomicU32,
    pub reject_auth: AtomicBool,
}

impl MockCloud {
    fn assign_id(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Total remote files created.
    pub async fn file_count(&self) -> usize {
        self.files.lock().await.len()
    }
}

#[async_trait]
impl CloudClient for MockCloud {
    async fn ensure_authenticated(&self) -> Result<(), CloudError> {
        if self.reject_auth.load(Ordering::SeqCst) {
            return Err(CloudError::Auth {
                message: "token expired".to_string(),
            });
        }
        Ok(())
    }

    async fn list_files(&self, folder_id: &str) -> Result<Vec<RemoteFile>, CloudError> {
        Ok(self
            .files
            .lock()
            .await
            .iter()
            .filter(|(folder, _)| folder == folder_id)
            .map(|(_, file)| file.clone())
            .collect())
    }

    async fn find_folder(
        &self,
        parent_id: Option<&str>,
        name: &str,
    ) -> Result<Option<String>, CloudError> {
        Ok(self
            .folders
            .lock()
            .await
            .iter()
            .find(|(_, (parent, folder_name))| {
                folder_name == name && parent.as_deref() == parent_id
            })
            .map(|(id, _)| id.clone()))
    }

    async fn create_folder(
        &self,
        parent_id: Option<&str>,
        name: &str,
    ) -> Result<String, CloudError> {
        self.create_folder_calls.fetch_add(1, Ordering::SeqCst);
        let id = self.assign_id("folder");
        self.folders.lock().await.insert(
            id.clone(),
            (parent_id.map(ToString::to_string), name.to_string()),
        );
        Ok(id)
    }

    async fn upload_file(
        &self,
        folder_id: &str,
        _local_path: &Path,
        name: &str,
    ) -> Result<String, CloudError> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        if self.reject_auth.load(Ordering::SeqCst) {
            return Err(CloudError::Auth {
                message: "token expired".to_string(),
            });
        }
        let id = self.assign_id("file");
        self.files.lock().await.push((
            folder_id.to_string(),
            RemoteFile {
                id: id.clone(),
                name: name.to_string(),
                size: None,
            },
        ));
        Ok(id)
    }
}
