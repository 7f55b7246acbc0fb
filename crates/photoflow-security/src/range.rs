//! HTTP Range header parsing for partial photo downloads.

/// An inclusive byte range within a file of known size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn length(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Parse a single-range `Range` header against a file of `size` bytes.
///
/// Supported forms are `bytes=a-b`, `bytes=a-` and the suffix form
/// `bytes=-n`. Multi-range requests and unsatisfiable ranges return
/// `None`, which callers treat as "serve the whole file".
pub fn parse_range_header(header: &str, size: u64) -> Option<ByteRange> {
    let spec = header.strip_prefix("bytes=")?.trim();
    if size == 0 || spec.is_empty() {
        return None;
    }
    // Multi-range requests are not supported.
    if spec.contains(',') {
        return None;
    }

    let (start_str, end_str) = spec.split_once('-')?;
    let start_str = start_str.trim();
    let end_str = end_str.trim();

    let range = if start_str.is_empty() {
        // Suffix form: last n bytes.
        let suffix: u64 = end_str.parse().ok()?;
        if suffix == 0 {
            return None;
        }
        ByteRange {
            start: size.saturating_sub(suffix),
            end: size - 1,
        }
    } else {
        let start: u64 = start_str.parse().ok()?;
        let end: u64 = if end_str.is_empty() {
            size - 1
        } else {
            // An explicit end must fall inside the file; only the suffix
            // form clamps.
            let end: u64 = end_str.parse().ok()?;
            if end >= size {
                return None;
            }
            end
        };
        ByteRange { start, end }
    };

    if range.start > range.end || range.start >= size {
        return None;
    }
    Some(range)
}
