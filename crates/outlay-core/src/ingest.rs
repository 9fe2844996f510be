//! Invoice file ingestion
//!
//! Validates an uploaded file (type, size, emptiness) and persists it under the
//! uploads directory with a timestamped, sanitized name. All validation happens
//! before anything touches the filesystem.

use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info};

use crate::config::StorageConfig;
use crate::error::{Error, Result};

/// MIME types accepted for invoices
pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
];

/// Declared MIME types that say nothing about the content
const GENERIC_MIME_TYPES: &[&str] = &["application/octet-stream", "binary/octet-stream"];

/// Public prefix for stored file references
pub const UPLOADS_PREFIX: &str = "/uploads";

/// Broad kind of an accepted file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Pdf,
    Image,
}

/// A validated, persisted upload
#[derive(Debug, Clone, Serialize)]
pub struct IngestedFile {
    /// Reference stored on the expense (`/uploads/<name>`)
    pub stored_ref: String,
    #[serde(skip)]
    pub path: PathBuf,
    pub original_name: String,
    pub kind: FileKind,
    pub mime: String,
    pub size: usize,
    /// SHA-256 of the content, hex encoded
    pub content_hash: String,
}

/// Resolve the effective MIME type of an upload
///
/// A specific declared type must be on the allow-list. An empty or generic
/// declared type falls back to the filename extension.
pub fn resolve_mime(declared: Option<&str>, filename: &str) -> Option<&'static str> {
    let declared = declared
        .map(|m| m.split(';').next().unwrap_or("").trim().to_lowercase())
        .unwrap_or_default();

    if !declared.is_empty() && !GENERIC_MIME_TYPES.contains(&declared.as_str()) {
        return ALLOWED_MIME_TYPES
            .iter()
            .copied()
            .find(|allowed| *allowed == declared);
    }

    let extension = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())?;

    match extension.as_str() {
        "pdf" => Some("application/pdf"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

/// Replace every character outside `[A-Za-z0-9.]` with `_` and strip leading dots
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let trimmed = replaced.trim_start_matches('.');
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Writes validated uploads to the uploads directory
#[derive(Debug, Clone)]
pub struct FileIngestor {
    uploads_dir: PathBuf,
    max_size: usize,
}

impl FileIngestor {
    pub fn new(uploads_dir: impl Into<PathBuf>, max_size: usize) -> Self {
        Self {
            uploads_dir: uploads_dir.into(),
            max_size,
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.uploads_dir.clone(), config.max_upload_bytes)
    }

    pub fn uploads_dir(&self) -> &Path {
        &self.uploads_dir
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Validate and persist an upload
    pub async fn ingest(
        &self,
        bytes: &[u8],
        declared_mime: Option<&str>,
        filename: &str,
    ) -> Result<IngestedFile> {
        if bytes.is_empty() {
            return Err(Error::EmptyUpload);
        }
        if bytes.len() > self.max_size {
            return Err(Error::FileTooLarge {
                size: bytes.len(),
                max: self.max_size,
            });
        }

        let mime = resolve_mime(declared_mime, filename).ok_or_else(|| {
            Error::UnsupportedFileType {
                mime: declared_mime.unwrap_or("").to_string(),
                filename: filename.to_string(),
            }
        })?;
        let kind = if mime == "application/pdf" {
            FileKind::Pdf
        } else {
            FileKind::Image
        };

        tokio::fs::create_dir_all(&self.uploads_dir)
            .await
            .map_err(|e| {
                error!(dir = %self.uploads_dir.display(), "Failed to create uploads dir: {}", e);
                Error::Io(e)
            })?;

        let sanitized = sanitize_filename(filename);
        let millis = chrono::Utc::now().timestamp_millis();
        let (stored_name, path) = self.write_new(millis, &sanitized, bytes).await?;

        let content_hash = hex::encode(Sha256::digest(bytes));
        info!(
            stored = %stored_name,
            size = bytes.len(),
            mime,
            "Invoice file stored"
        );

        Ok(IngestedFile {
            stored_ref: format!("{}/{}", UPLOADS_PREFIX, stored_name),
            path,
            original_name: filename.to_string(),
            kind,
            mime: mime.to_string(),
            size: bytes.len(),
            content_hash,
        })
    }

    /// Write to a fresh file, never overwriting an earlier upload
    async fn write_new(
        &self,
        millis: i64,
        sanitized: &str,
        bytes: &[u8],
    ) -> Result<(String, PathBuf)> {
        let mut attempt = 0u32;
        loop {
            let stored_name = if attempt == 0 {
                format!("{}_{}", millis, sanitized)
            } else {
                format!("{}_{}_{}", millis, attempt, sanitized)
            };
            let path = self.uploads_dir.join(&stored_name);

            let opened = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await;

            match opened {
                Ok(mut file) => {
                    let written = async {
                        file.write_all(bytes).await?;
                        file.flush().await
                    }
                    .await;
                    if let Err(e) = written {
                        error!(path = %path.display(), "Failed to write upload: {}", e);
                        let _ = tokio::fs::remove_file(&path).await;
                        return Err(Error::Io(e));
                    }
                    return Ok((stored_name, path));
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists && attempt < 100 => {
                    debug!(path = %path.display(), "Upload name taken, retrying");
                    attempt += 1;
                }
                Err(e) => {
                    error!(path = %path.display(), "Failed to create upload: {}", e);
                    return Err(Error::Io(e));
                }
            }
        }
    }

    /// Read back the bytes of a stored upload
    pub async fn read(&self, file: &IngestedFile) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(&file.path).await?)
    }
}
