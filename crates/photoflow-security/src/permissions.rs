//! File-level access checks performed before serving a photo.

use std::path::Path;
use std::time::UNIX_EPOCH;

use tracing::warn;

use photoflow_core::error::{AppError, ErrorKind};
use photoflow_core::result::AppResult;

use crate::http_meta::{generate_etag, mime_type};

const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

const ALLOWED_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "bmp", "tif", "tiff", "heic", "svg", "mp4", "mov",
];

/// Optional overrides for a permission check.
#[derive(Debug, Clone, Default)]
pub struct PermissionOptions {
    /// Maximum servable file size in bytes; defaults to 100 MB.
    pub max_file_size: Option<u64>,
    /// When set, only files with these extensions pass.
    pub allowed_extensions: Option<Vec<String>>,
}

/// Metadata about a file that passed all checks.
#[derive(Debug, Clone)]
pub struct FileAccess {
    pub size: u64,
    pub mtime_ms: i64,
    pub etag: String,
    pub mime_type: &'static str,
}

/// Checks that a resolved path points at a servable photo file.
#[derive(Debug, Clone)]
pub struct PermissionChecker {
    max_file_size: u64,
}

impl PermissionChecker {
    pub fn new(max_file_size: u64) -> Self {
        Self { max_file_size }
    }

    /// Verify the file exists, is a regular file, fits the size cap, and
    /// carries an allowed extension. Returns its serving metadata.
    pub async fn check(&self, path: &Path, options: &PermissionOptions) -> AppResult<FileAccess> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AppError::not_found(format!(
                    "File not found: {}",
                    path.display()
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                warn!(path = %path.display(), "Access denied reading file metadata");
                return Err(AppError::new(
                    ErrorKind::Authorization,
                    format!("Access denied: {}", path.display()),
                ));
            }
            Err(e) => {
                return Err(AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to stat file: {}", path.display()),
                    e,
                ));
            }
        };

        if !metadata.is_file() {
            return Err(AppError::validation(format!(
                "Not a regular file: {}",
                path.display()
            )));
        }

        let max = options.max_file_size.unwrap_or(self.max_file_size);
        if metadata.len() > max {
            return Err(AppError::new(
                ErrorKind::ResourceLimit,
                format!(
                    "File exceeds maximum size: {} bytes (limit {})",
                    metadata.len(),
                    max
                ),
            ));
        }

        let path_str = path.to_string_lossy();
        let extension = path_str
            .rsplit('.')
            .next()
            .map(|ext| ext.to_lowercase())
            .unwrap_or_default();
        let allowed = match &options.allowed_extensions {
            Some(list) => list.iter().any(|e| e.eq_ignore_ascii_case(&extension)),
            None => ALLOWED_EXTENSIONS.contains(&extension.as_str()),
        };
        if !allowed {
            return Err(AppError::validation(format!(
                "File type not allowed: .{extension}"
            )));
        }

        let mtime_ms = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);

        Ok(FileAccess {
            size: metadata.len(),
            mtime_ms,
            etag: generate_etag(metadata.len(), mtime_ms),
            mime_type: mime_type(&path_str),
        })
    }
}

impl Default for PermissionChecker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FILE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(bytes).unwrap();
        path
    }

    #[tokio::test]
    async fn passing_files_report_serving_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "photo.jpg", b"fake jpeg bytes");
        let checker = PermissionChecker::default();

        let access = checker
            .check(&path, &PermissionOptions::default())
            .await
            .unwrap();
        assert_eq!(access.size, 15);
        assert_eq!(access.mime_type, "image/jpeg");
        assert!(access.etag.starts_with('"'));
    }

    #[tokio::test]
    async fn missing_files_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let checker = PermissionChecker::default();

        let err = checker
            .check(&dir.path().join("absent.jpg"), &PermissionOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn directories_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("album.jpg");
        std::fs::create_dir(&sub).unwrap();
        let checker = PermissionChecker::default();

        let err = checker
            .check(&sub, &PermissionOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[tokio::test]
    async fn oversized_files_hit_the_resource_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "big.jpg", &[0u8; 64]);
        let checker = PermissionChecker::new(32);

        let err = checker
            .check(&path, &PermissionOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ResourceLimit);
    }

    #[tokio::test]
    async fn disallowed_extensions_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "script.exe", b"MZ");
        let checker = PermissionChecker::default();

        let err = checker
            .check(&path, &PermissionOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[tokio::test]
    async fn explicit_extension_list_overrides_the_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "report.pdf", b"%PDF-1.4");
        let checker = PermissionChecker::default();
        let options = PermissionOptions {
            allowed_extensions: Some(vec!["pdf".to_string()]),
            ..Default::default()
        };

        let access = checker.check(&path, &options).await.unwrap();
        assert_eq!(access.mime_type, "application/pdf");
    }
}
