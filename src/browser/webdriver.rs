//! WebDriver-protocol browser sessions over plain HTTP.
//!
//! Talks to any W3C WebDriver endpoint (chromedriver, geckodriver, a
//! Selenium server) with reqwest, without browser-specific bindings.
//! Downloads are detected by watching the session's download directory
//! for a new, stable, non-partial file, since the wire protocol has no
//! download event.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use super::{BrowserError, BrowserSession, ElementHandle};
use crate::adapter::ElementSummary;

/// W3C WebDriver element identifier key.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Poll interval while waiting for a download artifact.
const DOWNLOAD_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Extensions of in-progress download artifacts that must be ignored.
const PARTIAL_EXTENSIONS: [&str; 3] = ["crdownload", "part", "tmp"];

fn http_error(e: &reqwest::Error) -> BrowserError {
    BrowserError::Http {
        message: e.to_string(),
    }
}

/// Creates WebDriver sessions against one driver endpoint.
#[derive(Debug, Clone)]
pub struct WebDriverProvider {
    endpoint: String,
    http: Client,
    headless: bool,
    page_load_timeout: Duration,
}

impl WebDriverProvider {
    /// Creates a provider for a driver endpoint such as
    /// `http://localhost:9515`.
    #[must_use]
    pub fn new(endpoint: impl Into<String>, headless: bool) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            http: Client::new(),
            headless,
            page_load_timeout: Duration::from_secs(30),
        }
    }

    /// Overrides the page-load timeout applied to new sessions.
    #[must_use]
    pub fn with_page_load_timeout(mut self, timeout: Duration) -> Self {
        self.page_load_timeout = timeout;
        self
    }

    fn capabilities(&self, download_dir: &Path) -> Value {
        let mut args = vec![
            "--no-sandbox".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--window-size=1920,1080".to_string(),
        ];
        if self.headless {
            args.push("--headless=new".to_string());
        }

        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "timeouts": {
                        "pageLoad": self.page_load_timeout.as_millis() as u64
                    },
                    "goog:chromeOptions": {
                        "args": args,
                        "prefs": {
                            "download.default_directory": download_dir.display().to_string(),
                            "download.prompt_for_download": false,
                            "download.directory_upgrade": true,
                            "safebrowsing.enabled": true
                        }
                    }
                }
            }
        })
    }
}

#[async_trait]
impl super::BrowserProvider for WebDriverProvider {
    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn new_session(
        &self,
        download_dir: &Path,
    ) -> Result<Box<dyn BrowserSession>, BrowserError> {
        tokio::fs::create_dir_all(download_dir)
            .await
            .map_err(|source| BrowserError::Io {
                path: download_dir.to_path_buf(),
                source,
            })?;

        let response = self
            .http
            .post(format!("{}/session", self.endpoint))
            .json(&self.capabilities(download_dir))
            .send()
            .await
            .map_err(|e| http_error(&e))?;

        let value = unwrap_value(response).await?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| BrowserError::Protocol {
                message: "session response carried no sessionId".to_string(),
            })?
            .to_string();

        debug!(session_id = %session_id, "webdriver session created");

        Ok(Box::new(WebDriverBrowser {
            http: self.http.clone(),
            session_url: format!("{}/session/{session_id}", self.endpoint),
            download_dir: download_dir.to_path_buf(),
        }))
    }
}

/// One WebDriver session bound to a download directory.
#[derive(Debug)]
pub struct WebDriverBrowser {
    http: Client,
    session_url: String,
    download_dir: PathBuf,
}

/// Parses a WebDriver response envelope, mapping protocol-level errors.
async fn unwrap_value(response: reqwest::Response) -> Result<Value, BrowserError> {
    let status = response.status();
    let body: Value = response.json().await.map_err(|e| http_error(&e))?;
    let value = body.get("value").cloned().unwrap_or(Value::Null);

    if status.is_success() {
        return Ok(value);
    }

    let error_code = value
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    if error_code == "no such element" {
        // Selector is filled in by the caller, which knows it
        return Err(BrowserError::NotFound {
            selector: String::new(),
        });
    }
    if error_code == "timeout" || error_code == "script timeout" {
        return Err(BrowserError::TimedOut {
            what: format!("webdriver operation ({message})"),
        });
    }

    Err(BrowserError::Protocol {
        message: format!("{error_code}: {message}"),
    })
}

impl WebDriverBrowser {
    async fn post(&self, path: &str, body: Value) -> Result<Value, BrowserError> {
        let response = self
            .http
            .post(format!("{}{path}", self.session_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| http_error(&e))?;
        unwrap_value(response).await
    }

    async fn get(&self, path: &str) -> Result<Value, BrowserError> {
        let response = self
            .http
            .get(format!("{}{path}", self.session_url))
            .send()
            .await
            .map_err(|e| http_error(&e))?;
        unwrap_value(response).await
    }

    fn extract_element_id(value: &Value) -> Result<String, BrowserError> {
        value
            .get(ELEMENT_KEY)
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| BrowserError::Protocol {
                message: "element response carried no element id".to_string(),
            })
    }

    /// Lists complete (non-partial) files currently in the download dir.
    async fn list_complete_files(&self) -> Result<Vec<(PathBuf, u64)>, BrowserError> {
        let mut entries = tokio::fs::read_dir(&self.download_dir)
            .await
            .map_err(|source| BrowserError::Io {
                path: self.download_dir.clone(),
                source,
            })?;

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|source| BrowserError::Io {
            path: self.download_dir.clone(),
            source,
        })? {
            let path = entry.path();
            let file_type = entry.file_type().await.map_err(|source| BrowserError::Io {
                path: path.clone(),
                source,
            })?;
            if !file_type.is_file() {
                continue;
            }
            let is_partial = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| PARTIAL_EXTENSIONS.contains(&ext));
            if is_partial {
                continue;
            }
            let size = entry
                .metadata()
                .await
                .map_err(|source| BrowserError::Io {
                    path: path.clone(),
                    source,
                })?
                .len();
            files.push((path, size));
        }
        Ok(files)
    }
}

#[async_trait]
impl BrowserSession for WebDriverBrowser {
    #[instrument(skip(self), fields(url = %url))]
    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        self.post("/url", json!({ "url": url })).await?;
        Ok(())
    }

    async fn find_element(&self, selector: &str) -> Result<ElementHandle, BrowserError> {
        let value = self
            .post(
                "/element",
                json!({ "using": "css selector", "value": selector }),
            )
            .await
            .map_err(|e| match e {
                BrowserError::NotFound { .. } => BrowserError::NotFound {
                    selector: selector.to_string(),
                },
                other => other,
            })?;

        Ok(ElementHandle {
            id: Self::extract_element_id(&value)?,
        })
    }

    async fn find_elements(&self, selector: &str) -> Result<Vec<ElementSummary>, BrowserError> {
        let value = self
            .post(
                "/elements",
                json!({ "using": "css selector", "value": selector }),
            )
            .await?;

        let ids: Vec<String> = value
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| Self::extract_element_id(item).ok())
                    .collect()
            })
            .unwrap_or_default();

        let mut summaries = Vec::with_capacity(ids.len());
        for id in ids {
            let text_value = self.get(&format!("/element/{id}/text")).await?;
            let href_value = self.get(&format!("/element/{id}/property/href")).await?;
            summaries.push(ElementSummary {
                text: text_value.as_str().unwrap_or_default().to_string(),
                href: href_value.as_str().map(ToString::to_string),
            });
        }
        Ok(summaries)
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), BrowserError> {
        self.post(&format!("/element/{}/click", element.id), json!({}))
            .await?;
        Ok(())
    }

    /// Watches the download directory for a new artifact.
    ///
    /// An artifact counts as complete when it is not a known partial
    /// extension and its size has been stable across two consecutive
    /// polls.
    #[instrument(skip(self), fields(dir = %self.download_dir.display()))]
    async fn wait_for_download(&self, timeout: Duration) -> Result<PathBuf, BrowserError> {
        let before: HashSet<PathBuf> = self
            .list_complete_files()
            .await?
            .into_iter()
            .map(|(path, _)| path)
            .collect();

        let deadline = tokio::time::Instant::now() + timeout;
        let mut last_sizes: Vec<(PathBuf, u64)> = Vec::new();

        while tokio::time::Instant::now() < deadline {
            tokio::time::sleep(DOWNLOAD_POLL_INTERVAL).await;

            let current = self.list_complete_files().await?;
            for (path, size) in &current {
                if before.contains(path) {
                    continue;
                }
                let stable = last_sizes
                    .iter()
                    .any(|(seen, seen_size)| seen == path && seen_size == size);
                if stable {
                    debug!(path = %path.display(), size, "download artifact complete");
                    return Ok(path.clone());
                }
            }
            last_sizes = current;
        }

        Err(BrowserError::TimedOut {
            what: "download artifact".to_string(),
        })
    }

    async fn close(&self) -> Result<(), BrowserError> {
        let response = self
            .http
            .delete(&self.session_url)
            .send()
            .await
            .map_err(|e| http_error(&e));
        match response {
            Ok(resp) => {
                unwrap_value(resp).await?;
            }
            Err(e) => {
                warn!(error = %e, "failed to close webdriver session");
                return Err(e);
            }
        }
        Ok(())
    }
}
