//! Artifact validation: size bounds, extension set, format signatures.

use std::path::Path;

use tracing::{debug, instrument};

use super::error::{DownloadError, ValidationFailure};
use crate::config::{DocumentTypeSettings, SiteConfig};

/// Magic-byte signature of OOXML containers (`.docx` is a zip).
const DOCX_SIGNATURE: &[u8] = b"PK";

/// Magic-byte signature of legacy OLE compound documents (`.doc`).
const DOC_SIGNATURE: &[u8] = &[0xd0, 0xcf, 0x11, 0xe0];

/// Magic-byte signature of PDF files.
const PDF_SIGNATURE: &[u8] = b"%PDF";

/// Effective validation rules for one source's artifacts.
#[derive(Debug, Clone)]
pub struct ValidationRules {
    /// Minimum acceptable size in bytes.
    pub min_size: u64,
    /// Maximum acceptable size in bytes.
    pub max_size: u64,
    /// Allowed extensions, lowercased, with leading dot.
    pub allowed_extensions: Vec<String>,
    /// Whether leading bytes are checked against format signatures.
    pub check_content: bool,
}

impl ValidationRules {
    /// Derives rules from a site configuration.
    #[must_use]
    pub fn from_site(config: &SiteConfig) -> Self {
        Self {
            min_size: config.download.validation.min_size,
            max_size: config.download.validation.max_size,
            allowed_extensions: config
                .download
                .expected_file_types
                .iter()
                .map(|e| e.to_lowercase())
                .collect(),
            check_content: config.download.validation.check_content,
        }
    }

    /// Narrows rules with a document-type override from application
    /// settings: the tighter size window and the intersection-preferring
    /// extension set win.
    #[must_use]
    pub fn merge_document_type(mut self, doc_type: &DocumentTypeSettings) -> Self {
        self.min_size = self.min_size.max(doc_type.validation.min_size);
        self.max_size = self.max_size.min(doc_type.validation.max_size);

        let overrides: Vec<String> = doc_type
            .supported_extensions
            .iter()
            .map(|e| e.to_lowercase())
            .collect();
        let intersection: Vec<String> = self
            .allowed_extensions
            .iter()
            .filter(|e| overrides.contains(e))
            .cloned()
            .collect();
        if !intersection.is_empty() {
            self.allowed_extensions = intersection;
        }
        self
    }
}

/// Extracts the lowercased dotted extension of a path (e.g. `.docx`).
#[must_use]
pub fn file_extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default()
}

/// Validates an artifact against the rules, returning its size.
///
/// Size or extension violations are fatal [`DownloadError::Validation`]
/// errors; filesystem problems surface as [`DownloadError::Io`].
///
/// # Errors
///
/// Returns [`DownloadError::Validation`] on any bound violation and
/// [`DownloadError::Io`] when the file cannot be inspected.
#[instrument(skip(rules), fields(path = %path.display()))]
pub async fn validate_file(path: &Path, rules: &ValidationRules) -> Result<u64, DownloadError> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|source| DownloadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    let size = metadata.len();

    if size < rules.min_size {
        return Err(DownloadError::Validation {
            path: path.to_path_buf(),
            reason: ValidationFailure::TooSmall {
                actual: size,
                min: rules.min_size,
            },
        });
    }
    if size > rules.max_size {
        return Err(DownloadError::Validation {
            path: path.to_path_buf(),
            reason: ValidationFailure::TooLarge {
                actual: size,
                max: rules.max_size,
            },
        });
    }

    let extension = file_extension(path);
    if !rules.allowed_extensions.contains(&extension) {
        return Err(DownloadError::Validation {
            path: path.to_path_buf(),
            reason: ValidationFailure::UnexpectedType { extension },
        });
    }

    if rules.check_content {
        check_signature(path, &extension).await?;
    }

    debug!(size, %extension, "artifact validated");
    Ok(size)
}

/// Compares the artifact's leading bytes against the signature for its
/// extension. Extensions without a known signature pass.
async fn check_signature(path: &Path, extension: &str) -> Result<(), DownloadError> {
    let expected: &[u8] = match extension {
        ".docx" => DOCX_SIGNATURE,
        ".doc" => DOC_SIGNATURE,
        ".pdf" => PDF_SIGNATURE,
        _ => return Ok(()),
    };

    let mut header = vec![0u8; expected.len()];
    let read = read_prefix(path, &mut header).await?;

    if read < expected.len() || &header[..expected.len()] != expected {
        return Err(DownloadError::Validation {
            path: path.to_path_buf(),
            reason: ValidationFailure::BadSignature {
                extension: extension.to_string(),
            },
        });
    }
    Ok(())
}

async fn read_prefix(path: &Path, buf: &mut [u8]) -> Result<usize, DownloadError> {
    use tokio::io::AsyncReadExt;

    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|source| DownloadError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    let mut filled = 0;
    while filled < buf.len() {
        let n = file
            .read(&mut buf[filled..])
            .await
            .map_err(|source| DownloadError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::download::error::DownloadError;

    fn rules() -> ValidationRules {
        ValidationRules {
            min_size: 100,
            max_size: 10_000,
            allowed_extensions: vec![".docx".to_string(), ".doc".to_string()],
            check_content: false,
        }
    }

    async fn write_temp(name: &str, content: &[u8]) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        tokio::fs::write(&path, content).await.unwrap();
        (dir, path)
    }

    #[tokio::test]
    async fn test_validate_accepts_file_within_bounds() {
        let (_dir, path) = write_temp("doc.docx", &vec![b'x'; 500]).await;
        let size = validate_file(&path, &rules()).await.unwrap();
        assert_eq!(size, 500);
    }

    #[tokio::test]
    async fn test_validate_rejects_undersized_file() {
        let (_dir, path) = write_temp("doc.docx", b"tiny").await;
        let result = validate_file(&path, &rules()).await;
        assert!(matches!(
            result,
            Err(DownloadError::Validation {
                reason: ValidationFailure::TooSmall { actual: 4, min: 100 },
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_validate_rejects_oversized_file() {
        let (_dir, path) = write_temp("doc.docx", &vec![b'x'; 20_000]).await;
        let result = validate_file(&path, &rules()).await;
        assert!(matches!(
            result,
            Err(DownloadError::Validation {
                reason: ValidationFailure::TooLarge { .. },
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_validate_rejects_disallowed_extension() {
        let (_dir, path) = write_temp("doc.pdf", &vec![b'x'; 500]).await;
        let result = validate_file(&path, &rules()).await;
        assert!(matches!(
            result,
            Err(DownloadError::Validation {
                reason: ValidationFailure::UnexpectedType { ref extension },
                ..
            }) if extension == ".pdf"
        ));
    }

    #[tokio::test]
    async fn test_validate_extension_check_is_case_insensitive() {
        let (_dir, path) = write_temp("doc.DOCX", &vec![b'x'; 500]).await;
        assert!(validate_file(&path, &rules()).await.is_ok());
    }

    #[tokio::test]
    async fn test_validate_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = validate_file(&dir.path().join("absent.docx"), &rules()).await;
        assert!(matches!(result, Err(DownloadError::Io { .. })));
    }

    #[tokio::test]
    async fn test_content_check_accepts_matching_signature() {
        let mut rules = rules();
        rules.check_content = true;

        let mut content = b"PK\x03\x04".to_vec();
        content.resize(500, 0);
        let (_dir, path) = write_temp("doc.docx", &content).await;

        assert!(validate_file(&path, &rules).await.is_ok());
    }

    #[tokio::test]
    async fn test_content_check_rejects_wrong_signature() {
        let mut rules = rules();
        rules.check_content = true;

        let (_dir, path) = write_temp("doc.docx", &vec![b'x'; 500]).await;
        let result = validate_file(&path, &rules).await;
        assert!(matches!(
            result,
            Err(DownloadError::Validation {
                reason: ValidationFailure::BadSignature { .. },
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_content_check_legacy_doc_signature() {
        let mut rules = rules();
        rules.check_content = true;

        let mut content = vec![0xd0, 0xcf, 0x11, 0xe0];
        content.resize(500, 0);
        let (_dir, path) = write_temp("doc.doc", &content).await;

        assert!(validate_file(&path, &rules).await.is_ok());
    }

    #[test]
    fn test_merge_document_type_tightens_bounds() {
        let doc_type = DocumentTypeSettings {
            supported_extensions: vec![".docx".to_string()],
            validation: crate::config::SizeBounds {
                min_size: 200,
                max_size: 5_000,
            },
        };

        let merged = rules().merge_document_type(&doc_type);
        assert_eq!(merged.min_size, 200);
        assert_eq!(merged.max_size, 5_000);
        assert_eq!(merged.allowed_extensions, vec![".docx".to_string()]);
    }

    #[test]
    fn test_file_extension_lowercases() {
        assert_eq!(file_extension(Path::new("a/b/Doc.DOCX")), ".docx");
        assert_eq!(file_extension(Path::new("no_extension")), "");
    }
}
