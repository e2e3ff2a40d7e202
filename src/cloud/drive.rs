//! Drive-style REST cloud client.
//!
//! Talks to a Google-Drive-compatible `files` API with plain reqwest:
//! name queries for folders and duplicate checks, JSON metadata for folder
//! creation, and `multipart/related` bodies for uploads. Credentials come
//! from a stored token file; the interactive OAuth dance that produces the
//! token is outside this crate.
//!
//! The base URLs are injectable so tests can point the client at a mock
//! server.

use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, instrument};

use super::{CloudClient, CloudError, RemoteFile};

/// Production API endpoint.
const DEFAULT_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Production upload endpoint.
const DEFAULT_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

/// Folder MIME type in Drive-style APIs.
const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Multipart boundary for `multipart/related` upload bodies.
const UPLOAD_BOUNDARY: &str = "docsync-upload-boundary";

fn network_error(e: &reqwest::Error) -> CloudError {
    CloudError::Network {
        message: e.to_string(),
    }
}

/// Stored credentials file shape: the access token plus optional metadata
/// written by the authentication flow.
#[derive(Debug, Deserialize)]
struct StoredCredentials {
    access_token: String,
}

/// Drive-style REST client.
pub struct DriveClient {
    http: Client,
    api_base: String,
    upload_base: String,
    credentials_path: PathBuf,
    token: RwLock<Option<String>>,
}

impl DriveClient {
    /// Creates a client reading credentials from `credentials_path`.
    #[must_use]
    pub fn new(credentials_path: PathBuf) -> Self {
        Self::with_base_urls(credentials_path, DEFAULT_API_BASE, DEFAULT_UPLOAD_BASE)
    }

    /// Creates a client against custom endpoints. Used by tests to target
    /// a mock server.
    #[must_use]
    pub fn with_base_urls(
        credentials_path: PathBuf,
        api_base: impl Into<String>,
        upload_base: impl Into<String>,
    ) -> Self {
        Self {
            http: Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            upload_base: upload_base.into().trim_end_matches('/').to_string(),
            credentials_path,
            token: RwLock::new(None),
        }
    }

    async fn bearer_token(&self) -> Result<String, CloudError> {
        if let Some(token) = self.token.read().await.as_ref() {
            return Ok(token.clone());
        }
        self.load_token().await
    }

    async fn load_token(&self) -> Result<String, CloudError> {
        let raw = tokio::fs::read_to_string(&self.credentials_path)
            .await
            .map_err(|e| CloudError::Credentials {
                path: self.credentials_path.clone(),
                message: e.to_string(),
            })?;
        let stored: StoredCredentials =
            serde_json::from_str(&raw).map_err(|e| CloudError::Credentials {
                path: self.credentials_path.clone(),
                message: format!("credentials file does not parse: {e}"),
            })?;

        *self.token.write().await = Some(stored.access_token.clone());
        Ok(stored.access_token)
    }

    /// Maps provider error responses into the cloud taxonomy.
    async fn check(response: Response) -> Result<Response, CloudError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            return Err(CloudError::RateLimited { retry_after });
        }

        let message = response.text().await.unwrap_or_default();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(CloudError::Auth { message })
            }
            _ => Err(CloudError::Api {
                status: status.as_u16(),
                message,
            }),
        }
    }

    /// Escapes a value for embedding in a Drive query string literal.
    fn escape_query_value(value: &str) -> String {
        value.replace('\\', "\\\\").replace('\'', "\\'")
    }

    async fn query_files(&self, query: &str) -> Result<Vec<RemoteFile>, CloudError> {
        let token = self.bearer_token().await?;
        let url = format!(
            "{}/files?q={}&fields=files(id,name,size)",
            self.api_base,
            urlencoding::encode(query)
        );

        let response = self
            .http
            .get(&url)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| network_error(&e))?;
        let response = Self::check(response).await?;

        #[derive(Deserialize)]
        struct FileEntry {
            id: String,
            name: String,
            #[serde(default)]
            size: Option<String>,
        }
        #[derive(Deserialize)]
        struct FileList {
            #[serde(default)]
            files: Vec<FileEntry>,
        }

        let list: FileList = response.json().await.map_err(|e| network_error(&e))?;
        Ok(list
            .files
            .into_iter()
            .map(|f| RemoteFile {
                id: f.id,
                name: f.name,
                // Drive reports sizes as decimal strings
                size: f.size.and_then(|s| s.parse().ok()),
            })
            .collect())
    }
}

/// Parses a Retry-After header value: either delta-seconds or an HTTP
/// date.
fn parse_retry_after(value: &str) -> Option<Duration> {
    if let Ok(seconds) = value.trim().parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let when = httpdate::parse_http_date(value).ok()?;
    when.duration_since(std::time::SystemTime::now()).ok()
}

#[async_trait::async_trait]
impl CloudClient for DriveClient {
    /// Loads the stored token and verifies it against the provider with a
    /// minimal metadata request.
    #[instrument(skip(self))]
    async fn ensure_authenticated(&self) -> Result<(), CloudError> {
        let token = self.load_token().await?;

        let response = self
            .http
            .get(format!("{}/about?fields=user", self.api_base))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| network_error(&e))?;
        Self::check(response).await?;

        info!("cloud authentication verified");
        Ok(())
    }

    async fn list_files(&self, folder_id: &str) -> Result<Vec<RemoteFile>, CloudError> {
        let query = format!(
            "'{}' in parents and trashed=false",
            Self::escape_query_value(folder_id)
        );
        self.query_files(&query).await
    }

    async fn find_folder(
        &self,
        parent_id: Option<&str>,
        name: &str,
    ) -> Result<Option<String>, CloudError> {
        let mut query = format!(
            "mimeType='{FOLDER_MIME_TYPE}' and name='{}' and trashed=false",
            Self::escape_query_value(name)
        );
        if let Some(parent) = parent_id {
            query.push_str(&format!(
                " and '{}' in parents",
                Self::escape_query_value(parent)
            ));
        }

        let mut matches = self.query_files(&query).await?;
        Ok(if matches.is_empty() {
            None
        } else {
            Some(matches.remove(0).id)
        })
    }

    #[instrument(skip(self), fields(name = %name))]
    async fn create_folder(
        &self,
        parent_id: Option<&str>,
        name: &str,
    ) -> Result<String, CloudError> {
        let token = self.bearer_token().await?;

        let mut metadata = json!({
            "name": name,
            "mimeType": FOLDER_MIME_TYPE,
        });
        if let Some(parent) = parent_id {
            metadata["parents"] = json!([parent]);
        }

        let response = self
            .http
            .post(format!("{}/files?fields=id", self.api_base))
            .bearer_auth(&token)
            .json(&metadata)
            .send()
            .await
            .map_err(|e| network_error(&e))?;
        let response = Self::check(response).await?;

        #[derive(Deserialize)]
        struct Created {
            id: String,
        }
        let created: Created = response.json().await.map_err(|e| network_error(&e))?;
        debug!(folder_id = %created.id, "created remote folder");
        Ok(created.id)
    }

    #[instrument(skip(self, local_path), fields(name = %name))]
    async fn upload_file(
        &self,
        folder_id: &str,
        local_path: &Path,
        name: &str,
    ) -> Result<String, CloudError> {
        let token = self.bearer_token().await?;

        let io_error = |source: std::io::Error| CloudError::Io {
            path: local_path.to_path_buf(),
            source,
        };
        let file = tokio::fs::File::open(local_path).await.map_err(io_error)?;
        let size = file.metadata().await.map_err(io_error)?.len();

        let metadata = json!({
            "name": name,
            "parents": [folder_id],
        });

        // multipart/related: a JSON metadata part followed by the raw
        // media part, as the Drive upload endpoint expects. The media is
        // streamed from disk rather than buffered whole.
        let head = Bytes::from(format!(
            "--{UPLOAD_BOUNDARY}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n\
             --{UPLOAD_BOUNDARY}\r\nContent-Type: application/octet-stream\r\n\r\n"
        ));
        let tail = Bytes::from(format!("\r\n--{UPLOAD_BOUNDARY}--"));
        let body_stream = stream::iter([Ok::<_, std::io::Error>(head)])
            .chain(ReaderStream::new(file))
            .chain(stream::iter([Ok(tail)]));

        let response = self
            .http
            .post(format!(
                "{}/files?uploadType=multipart&fields=id",
                self.upload_base
            ))
            .bearer_auth(&token)
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={UPLOAD_BOUNDARY}"),
            )
            .body(reqwest::Body::wrap_stream(body_stream))
            .send()
            .await
            .map_err(|e| network_error(&e))?;
        let response = Self::check(response).await?;

        #[derive(Deserialize)]
        struct Uploaded {
            id: String,
        }
        let uploaded: Uploaded = response.json().await.map_err(|e| network_error(&e))?;
        info!(file_id = %uploaded.id, size, "uploaded file");
        Ok(uploaded.id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{header_exists, method, path, query_param_contains};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_with_token(server: &MockServer) -> (DriveClient, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let creds = dir.path().join("credentials.json");
        std::fs::write(&creds, r#"{ "access_token": "test-token-123" }"#).unwrap();
        let client = DriveClient::with_base_urls(creds, server.uri(), server.uri());
        (client, dir)
    }

    #[tokio::test]
    async fn test_missing_credentials_file_is_credentials_error() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let client = DriveClient::with_base_urls(
            dir.path().join("absent.json"),
            server.uri(),
            server.uri(),
        );

        let result = client.ensure_authenticated().await;
        assert!(matches!(result, Err(CloudError::Credentials { .. })));
    }

    #[tokio::test]
    async fn test_ensure_authenticated_sends_bearer_token() {
        let server = MockServer::start().await;
        let (client, _dir) = client_with_token(&server).await;

        Mock::given(method("GET"))
            .and(path("/about"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "user": { "displayName": "tester" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        client.ensure_authenticated().await.unwrap();
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_auth_error() {
        let server = MockServer::start().await;
        let (client, _dir) = client_with_token(&server).await;

        Mock::given(method("GET"))
            .and(path("/about"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid token"))
            .mount(&server)
            .await;

        let result = client.ensure_authenticated().await;
        assert!(matches!(result, Err(CloudError::Auth { .. })));
    }

    #[tokio::test]
    async fn test_rate_limited_maps_with_retry_after_seconds() {
        let server = MockServer::start().await;
        let (client, _dir) = client_with_token(&server).await;

        Mock::given(method("GET"))
            .and(path("/files"))
            .respond_with(
                ResponseTemplate::new(429).insert_header("retry-after", "7"),
            )
            .mount(&server)
            .await;

        let result = client.list_files("folder-1").await;
        assert!(matches!(
            result,
            Err(CloudError::RateLimited {
                retry_after: Some(d)
            }) if d == Duration::from_secs(7)
        ));
    }

    #[tokio::test]
    async fn test_list_files_parses_entries_and_sizes() {
        let server = MockServer::start().await;
        let (client, _dir) = client_with_token(&server).await;

        Mock::given(method("GET"))
            .and(path("/files"))
            .and(query_param_contains("q", "'folder-1' in parents"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "files": [
                    { "id": "f1", "name": "менеджера.docx", "size": "45000" },
                    { "id": "f2", "name": "бухгалтера.docx" }
                ]
            })))
            .mount(&server)
            .await;

        let files = client.list_files("folder-1").await.unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].id, "f1");
        assert_eq!(files[0].size, Some(45000));
        assert_eq!(files[1].size, None);
    }

    #[tokio::test]
    async fn test_find_folder_builds_name_query() {
        let server = MockServer::start().await;
        let (client, _dir) = client_with_token(&server).await;

        Mock::given(method("GET"))
            .and(path("/files"))
            .and(query_param_contains("q", "name='Sales'"))
            .and(query_param_contains("q", "'root-1' in parents"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "files": [{ "id": "folder-sales", "name": "Sales" }]
            })))
            .mount(&server)
            .await;

        let found = client.find_folder(Some("root-1"), "Sales").await.unwrap();
        assert_eq!(found.as_deref(), Some("folder-sales"));
    }

    #[tokio::test]
    async fn test_find_folder_absent_returns_none() {
        let server = MockServer::start().await;
        let (client, _dir) = client_with_token(&server).await;

        Mock::given(method("GET"))
            .and(path("/files"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "files": [] })),
            )
            .mount(&server)
            .await;

        let found = client.find_folder(None, "Missing").await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_create_folder_returns_id() {
        let server = MockServer::start().await;
        let (client, _dir) = client_with_token(&server).await;

        Mock::given(method("POST"))
            .and(path("/files"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "id": "new-folder" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let id = client.create_folder(Some("root-1"), "Sales").await.unwrap();
        assert_eq!(id, "new-folder");
    }

    #[tokio::test]
    async fn test_upload_file_sends_multipart_related() {
        let server = MockServer::start().await;
        let (client, dir) = client_with_token(&server).await;

        let local = dir.path().join("doc.docx");
        std::fs::write(&local, vec![b'x'; 256]).unwrap();

        Mock::given(method("POST"))
            .and(path("/files"))
            .and(wiremock::matchers::query_param("uploadType", "multipart"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "id": "file-99" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let id = client
            .upload_file("folder-1", &local, "менеджера.docx")
            .await
            .unwrap();
        assert_eq!(id, "file-99");
    }

    #[test]
    fn test_escape_query_value_escapes_quotes() {
        assert_eq!(
            DriveClient::escape_query_value("O'Brien's"),
            r"O\'Brien\'s"
        );
    }

    #[test]
    fn test_parse_retry_after_seconds_and_http_date() {
        assert_eq!(parse_retry_after("12"), Some(Duration::from_secs(12)));
        assert!(parse_retry_after("not a date").is_none());
    }
}
