//! Upload-root path validation and filename sanitization.
//!
//! Containment is checked on the canonicalized path, not by string
//! prefixing the raw input, so `..` sequences and symlinks cannot escape
//! the root.

use std::path::{Component, Path, PathBuf};

use tracing::warn;

use photoflow_core::error::AppError;
use photoflow_core::result::AppResult;

/// Validates request paths against the public upload root.
#[derive(Debug, Clone)]
pub struct PathValidator {
    root: PathBuf,
}

impl PathValidator {
    /// Create a validator rooted at the given directory, creating it if
    /// needed so the root can be canonicalized.
    pub fn new(root: impl Into<PathBuf>) -> AppResult<Self> {
        let root: PathBuf = root.into();
        std::fs::create_dir_all(&root).map_err(|e| {
            AppError::with_source(
                photoflow_core::error::ErrorKind::Storage,
                format!("Failed to create upload root: {}", root.display()),
                e,
            )
        })?;
        let root = root.canonicalize().map_err(|e| {
            AppError::with_source(
                photoflow_core::error::ErrorKind::Storage,
                format!("Failed to canonicalize upload root: {}", root.display()),
                e,
            )
        })?;
        Ok(Self { root })
    }

    /// The canonicalized upload root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Check whether a request path is safe to serve.
    pub fn validate(&self, path: &str) -> bool {
        self.resolve(path).is_some()
    }

    /// Resolve a request path to an absolute path inside the root, or
    /// `None` when the path is unsafe.
    pub fn resolve(&self, path: &str) -> Option<PathBuf> {
        if path.is_empty() || path.len() > 4096 {
            return None;
        }
        // Control characters and NUL never belong in a request path.
        if path.chars().any(|c| c.is_control()) {
            warn!(path, "Rejected path with control characters");
            return None;
        }
        // Absolute paths (POSIX or Windows drive-letter) are rejected
        // outright; request paths are always root-relative.
        if path.starts_with('/') || path.starts_with('\\') || has_drive_prefix(path) {
            return None;
        }

        let candidate = Path::new(path);
        let mut normalized = PathBuf::new();
        for component in candidate.components() {
            match component {
                Component::Normal(part) => normalized.push(part),
                Component::CurDir => {}
                // Any parent-directory component is a traversal attempt.
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    warn!(path, "Rejected traversal path");
                    return None;
                }
            }
        }
        if normalized.as_os_str().is_empty() {
            return None;
        }

        let resolved = self.root.join(&normalized);

        // Canonicalize the deepest existing ancestor so symlinks inside
        // the tree cannot point back out of the root.
        let check = deepest_existing(&resolved);
        match check.canonicalize() {
            Ok(canonical) if canonical.starts_with(&self.root) => Some(resolved),
            Ok(_) => {
                warn!(path, "Rejected path escaping upload root");
                None
            }
            Err(_) => None,
        }
    }
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

fn deepest_existing(path: &Path) -> &Path {
    let mut current = path;
    while !current.exists() {
        match current.parent() {
            Some(parent) => current = parent,
            None => return path,
        }
    }
    current
}

/// Sanitize a filename to the allowed character set: CJK, ASCII
/// alphanumerics, and `._-`. Everything else becomes an underscore;
/// repeated underscores collapse and the result is capped at 255 chars.
pub fn sanitize_file_name(name: &str) -> String {
    let mut sanitized = String::with_capacity(name.len());
    let mut last_was_underscore = false;

    for c in name.chars() {
        let allowed = c.is_ascii_alphanumeric()
            || matches!(c, '.' | '_' | '-')
            || is_cjk(c);
        if allowed {
            sanitized.push(c);
            last_was_underscore = c == '_';
        } else if !last_was_underscore {
            sanitized.push('_');
            last_was_underscore = true;
        }
    }

    sanitized.chars().take(255).collect()
}

fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}'
        | '\u{3400}'..='\u{4DBF}'
        | '\u{3000}'..='\u{303F}'
        | '\u{FF00}'..='\u{FFEF}'
    )
}
