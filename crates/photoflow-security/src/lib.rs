//! Security layer for serving construction photos: path containment,
//! signed download tokens, file permission checks and rate limiting.

pub mod http_meta;
pub mod path;
pub mod permissions;
pub mod range;
pub mod rate_limit;
pub mod service;
pub mod token;

pub use http_meta::{generate_etag, mime_type};
pub use path::{PathValidator, sanitize_file_name};
pub use permissions::{FileAccess, PermissionChecker, PermissionOptions};
pub use range::{ByteRange, parse_range_header};
pub use rate_limit::{RateLimitDecision, RateLimiter, SweepTask};
pub use service::{AuthorizedDownload, FileSecurityService};
pub use token::{SecureToken, TokenPayload, TokenService, TokenValidation};
