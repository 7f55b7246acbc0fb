//! Facade tying path validation, tokens, permissions and rate limiting
//! together into one photo-serving security service.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use photoflow_core::clock::Clock;
use photoflow_core::config::SecurityConfig;
use photoflow_core::error::{AppError, ErrorKind};
use photoflow_core::result::AppResult;

use crate::path::PathValidator;
use crate::permissions::{FileAccess, PermissionChecker, PermissionOptions};
use crate::rate_limit::{RateLimitDecision, RateLimiter, SweepTask};
use crate::token::{SecureToken, TokenService, TokenValidation};

/// Everything needed to serve a photo once a download request clears all
/// security checks.
#[derive(Debug)]
pub struct AuthorizedDownload {
    pub path: PathBuf,
    pub access: FileAccess,
    pub rate_limit: RateLimitDecision,
}

/// Security service guarding photo downloads.
pub struct FileSecurityService {
    validator: PathValidator,
    permissions: PermissionChecker,
    tokens: TokenService,
    rate_limiter: Arc<RateLimiter>,
    sweep_interval: Duration,
}

impl std::fmt::Debug for FileSecurityService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSecurityService")
            .field("upload_root", &self.validator.root())
            .finish_non_exhaustive()
    }
}

impl FileSecurityService {
    pub fn new(config: &SecurityConfig, clock: Arc<dyn Clock>) -> AppResult<Self> {
        if config.token_secret.is_empty() {
            return Err(AppError::new(
                ErrorKind::Configuration,
                "Token secret must not be empty",
            ));
        }
        let validator = PathValidator::new(&config.upload_root)?;
        info!(upload_root = %validator.root().display(), "File security service initialized");
        Ok(Self {
            validator,
            permissions: PermissionChecker::new(config.max_file_size),
            tokens: TokenService::new(
                config.token_secret.as_bytes().to_vec(),
                config.token_ttl_ms,
                clock.clone(),
            ),
            rate_limiter: Arc::new(RateLimiter::new(
                config.rate_limit_window_ms,
                config.rate_limit_max_requests,
                clock,
            )),
            sweep_interval: Duration::from_millis(config.rate_limit_sweep_interval_ms),
        })
    }

    /// Issue a signed download token for a photo.
    pub fn generate_token(
        &self,
        photo_id: &str,
        user_id: &str,
        resolution: &str,
    ) -> AppResult<SecureToken> {
        self.tokens.generate(photo_id, user_id, resolution)
    }

    /// Validate a presented download token.
    pub fn validate_token(&self, token: &str) -> TokenValidation {
        self.tokens.validate(token)
    }

    /// Check whether a request path is safe to resolve.
    pub fn validate_path(&self, path: &str) -> bool {
        self.validator.validate(path)
    }

    /// Run the full download gate: rate limit, path containment, then
    /// file permission checks.
    pub async fn authorize_download(
        &self,
        identifier: &str,
        path: &str,
        options: &PermissionOptions,
    ) -> AppResult<AuthorizedDownload> {
        let rate_limit = self.rate_limiter.check(identifier);
        if !rate_limit.allowed {
            warn!(identifier, "Download rejected by rate limiter");
            return Err(AppError::new(
                ErrorKind::RateLimit,
                "Too many requests, please try again later",
            ));
        }

        let resolved = self.validator.resolve(path).ok_or_else(|| {
            AppError::new(ErrorKind::Authorization, format!("Invalid file path: {path}"))
        })?;

        let access = self.permissions.check(&resolved, options).await?;
        Ok(AuthorizedDownload {
            path: resolved,
            access,
            rate_limit,
        })
    }

    /// Record and check one request against the rate limiter without
    /// touching the filesystem.
    pub fn check_rate_limit(&self, identifier: &str) -> RateLimitDecision {
        self.rate_limiter.check(identifier)
    }

    /// Spawn the periodic sweep of expired rate-limit windows.
    pub fn start_sweep_task(&self) -> SweepTask {
        SweepTask::spawn(self.rate_limiter.clone(), self.sweep_interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use photoflow_core::clock::ManualClock;
    use std::io::Write;

    fn config(root: &std::path::Path) -> SecurityConfig {
        SecurityConfig {
            upload_root: root.to_string_lossy().into_owned(),
            token_secret: "test-secret".to_string(),
            ..SecurityConfig::default()
        }
    }

    #[tokio::test]
    async fn authorizes_a_valid_download() {
        let dir = tempfile::tempdir().unwrap();
        let photos = dir.path().join("photos");
        std::fs::create_dir_all(&photos).unwrap();
        let mut file = std::fs::File::create(photos.join("site.jpg")).unwrap();
        file.write_all(b"jpeg bytes").unwrap();

        let clock = ManualClock::starting_at(1_700_000_000_000);
        let service = FileSecurityService::new(&config(dir.path()), clock).unwrap();

        let download = service
            .authorize_download("user-1", "photos/site.jpg", &PermissionOptions::default())
            .await
            .unwrap();
        assert_eq!(download.access.mime_type, "image/jpeg");
        assert!(download.rate_limit.allowed);
    }

    #[tokio::test]
    async fn traversal_paths_are_denied() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::starting_at(0);
        let service = FileSecurityService::new(&config(dir.path()), clock).unwrap();

        let err = service
            .authorize_download("user-1", "../outside.jpg", &PermissionOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Authorization);
    }

    #[tokio::test]
    async fn rate_limited_users_are_rejected_before_fs_access() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::starting_at(0);
        let mut cfg = config(dir.path());
        cfg.rate_limit_max_requests = 1;
        let service = FileSecurityService::new(&cfg, clock).unwrap();

        service.check_rate_limit("user-1");
        let err = service
            .authorize_download("user-1", "photo.jpg", &PermissionOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::RateLimit);
    }

    #[test]
    fn empty_token_secret_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::starting_at(0);
        let mut cfg = config(dir.path());
        cfg.token_secret = String::new();

        let err = FileSecurityService::new(&cfg, clock).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);
    }

    #[test]
    fn token_round_trip_through_the_facade() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::starting_at(1_700_000_000_000);
        let service = FileSecurityService::new(&config(dir.path()), clock).unwrap();

        let token = service.generate_token("p1", "u1", "original").unwrap();
        let validation = service.validate_token(&token.token);
        assert!(validation.valid);
        assert_eq!(validation.payload.unwrap().photo_id, "p1");
    }
}
