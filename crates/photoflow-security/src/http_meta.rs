//! ETag generation and MIME type lookup for served photos.

use md5::{Digest, Md5};

/// Build a strong ETag from file size and modification time.
///
/// The tag is the quoted hex MD5 of `"{size}-{mtime_ms}"`, so it changes
/// whenever the file is rewritten even if the size stays the same.
pub fn generate_etag(size: u64, mtime_ms: i64) -> String {
    let mut hasher = Md5::new();
    hasher.update(format!("{}-{}", size, mtime_ms).as_bytes());
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(digest.len() * 2 + 2);
    hex.push('"');
    for byte in digest {
        hex.push_str(&format!("{:02x}", byte));
    }
    hex.push('"');
    hex
}

/// Guess the MIME type for a photo path from its extension.
///
/// Unknown extensions fall back to `application/octet-stream` so the
/// response always carries a concrete Content-Type.
pub fn mime_type(path: &str) -> &'static str {
    let ext = match path.rsplit('.').next() {
        Some(ext) if ext.len() < path.len() => ext.to_lowercase(),
        _ => return "application/octet-stream",
    };
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "heic" => "image/heic",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "json" => "application/json",
        "zip" => "application/zip",
        "dwg" => "application/acad",
        "dxf" => "application/dxf",
        _ => "application/octet-stream",
    }
}
