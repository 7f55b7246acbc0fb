//! Integration tests for the photo download security gate.

use std::io::Write;
use std::sync::Arc;

use photoflow_core::clock::{ManualClock, SystemClock};
use photoflow_core::config::SecurityConfig;
use photoflow_core::error::ErrorKind;
use photoflow_security::{
    parse_range_header, sanitize_file_name, FileSecurityService, PermissionOptions,
};

fn security_config(root: &std::path::Path) -> SecurityConfig {
    SecurityConfig {
        upload_root: root.to_string_lossy().into_owned(),
        token_secret: "integration-secret".to_string(),
        ..SecurityConfig::default()
    }
}

fn seed_photo(root: &std::path::Path, rel: &str, bytes: &[u8]) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut file = std::fs::File::create(path).unwrap();
    file.write_all(bytes).unwrap();
}

#[tokio::test]
async fn token_protected_download_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    seed_photo(dir.path(), "p1/album/site.jpg", &[0xFF; 2_048]);
    let service =
        FileSecurityService::new(&security_config(dir.path()), Arc::new(SystemClock)).unwrap();

    let token = service.generate_token("photo-1", "user-1", "original").unwrap();
    let validation = service.validate_token(&token.token);
    assert!(validation.valid);
    assert_eq!(validation.payload.unwrap().user_id, "user-1");

    let download = service
        .authorize_download("user-1", "p1/album/site.jpg", &PermissionOptions::default())
        .await
        .unwrap();
    assert_eq!(download.access.size, 2_048);
    assert_eq!(download.access.mime_type, "image/jpeg");
    assert!(download.access.etag.starts_with('"'));

    // Partial content against the authorized file size.
    let range = parse_range_header("bytes=0-1023", download.access.size).unwrap();
    assert_eq!(range.length(), 1_024);
    assert_eq!(parse_range_header("bytes=4096-", download.access.size), None);
}

#[tokio::test]
async fn expired_token_is_rejected_while_path_checks_still_hold() {
    let dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::starting_at(1_700_000_000_000);
    let service =
        FileSecurityService::new(&security_config(dir.path()), clock.clone()).unwrap();

    let token = service.generate_token("photo-1", "user-1", "thumbnail").unwrap();
    clock.advance_millis(SecurityConfig::default().token_ttl_ms + 1);

    let validation = service.validate_token(&token.token);
    assert!(!validation.valid);
    assert_eq!(validation.error.as_deref(), Some("Token has expired"));

    assert!(!service.validate_path("../../etc/passwd"));
    assert!(!service.validate_path("/etc/passwd"));
}

#[tokio::test]
async fn repeated_downloads_hit_the_rate_limit() {
    let dir = tempfile::tempdir().unwrap();
    seed_photo(dir.path(), "site.jpg", b"jpeg");
    let mut config = security_config(dir.path());
    config.rate_limit_max_requests = 3;
    let service = FileSecurityService::new(&config, Arc::new(SystemClock)).unwrap();

    for _ in 0..3 {
        service
            .authorize_download("user-1", "site.jpg", &PermissionOptions::default())
            .await
            .unwrap();
    }
    let err = service
        .authorize_download("user-1", "site.jpg", &PermissionOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::RateLimit);

    // Other users are unaffected.
    service
        .authorize_download("user-2", "site.jpg", &PermissionOptions::default())
        .await
        .unwrap();
}

#[tokio::test]
async fn uploaded_names_are_sanitized_before_storage() {
    assert_eq!(sanitize_file_name("現場 寫真 01.jpg"), "現場_寫真_01.jpg");
    assert_eq!(sanitize_file_name("../../../evil.sh"), ".._.._.._evil.sh");
    assert_eq!(sanitize_file_name("report<v2>.png"), "report_v2_.png");
}
