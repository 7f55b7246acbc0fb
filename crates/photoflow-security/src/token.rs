//! Signed photo access tokens.
//!
//! A token is the URL-safe base64 encoding of a JSON document holding the
//! payload plus an HMAC-SHA256 signature computed over the payload alone.
//! Validation never panics and never leaks which check failed beyond a
//! coarse reason string.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;

use photoflow_core::clock::Clock;
use photoflow_core::error::AppError;
use photoflow_core::result::AppResult;

type HmacSha256 = Hmac<Sha256>;

/// Claims carried by a photo access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPayload {
    /// Photo the token grants access to.
    pub photo_id: String,
    /// User the token was issued for.
    pub user_id: String,
    /// Requested resolution variant (e.g. "original", "thumbnail").
    pub resolution: String,
    /// Expiry as epoch milliseconds.
    pub expires_at: i64,
}

/// Wire form of a token: payload plus its signature.
#[derive(Debug, Serialize, Deserialize)]
struct SignedToken {
    #[serde(flatten)]
    payload: TokenPayload,
    signature: String,
}

/// Outcome of validating a presented token.
#[derive(Debug, Clone)]
pub struct TokenValidation {
    pub valid: bool,
    pub payload: Option<TokenPayload>,
    pub error: Option<String>,
}

impl TokenValidation {
    fn ok(payload: TokenPayload) -> Self {
        Self {
            valid: true,
            payload: Some(payload),
            error: None,
        }
    }

    fn rejected(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            payload: None,
            error: Some(reason.into()),
        }
    }
}

/// A freshly issued token with its expiry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecureToken {
    pub token: String,
    pub expires_at: i64,
}

/// Issues and validates HMAC-signed photo access tokens.
pub struct TokenService {
    secret: Vec<u8>,
    ttl_ms: i64,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("ttl_ms", &self.ttl_ms)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(secret: impl Into<Vec<u8>>, ttl_ms: i64, clock: Arc<dyn Clock>) -> Self {
        Self {
            secret: secret.into(),
            ttl_ms,
            clock,
        }
    }

    /// Issue a token for one photo/user/resolution combination.
    pub fn generate(
        &self,
        photo_id: &str,
        user_id: &str,
        resolution: &str,
    ) -> AppResult<SecureToken> {
        let expires_at = self.clock.now_millis() + self.ttl_ms;
        let payload = TokenPayload {
            photo_id: photo_id.to_string(),
            user_id: user_id.to_string(),
            resolution: resolution.to_string(),
            expires_at,
        };

        let signature = self.sign(&payload)?;
        let signed = SignedToken { payload, signature };
        let json = serde_json::to_vec(&signed)
            .map_err(|e| AppError::internal(format!("Failed to encode access token: {e}")))?;

        Ok(SecureToken {
            token: URL_SAFE_NO_PAD.encode(json),
            expires_at,
        })
    }

    /// Validate a presented token against signature and expiry.
    pub fn validate(&self, token: &str) -> TokenValidation {
        let json = match URL_SAFE_NO_PAD.decode(token) {
            Ok(bytes) => bytes,
            Err(_) => {
                debug!("Token rejected: not valid base64");
                return TokenValidation::rejected("Invalid token format");
            }
        };

        let signed: SignedToken = match serde_json::from_slice(&json) {
            Ok(signed) => signed,
            Err(_) => {
                debug!("Token rejected: malformed payload");
                return TokenValidation::rejected("Invalid token format");
            }
        };

        let expected = match self.sign(&signed.payload) {
            Ok(signature) => signature,
            Err(_) => return TokenValidation::rejected("Invalid token format"),
        };
        if !constant_time_eq(expected.as_bytes(), signed.signature.as_bytes()) {
            debug!(photo_id = %signed.payload.photo_id, "Token rejected: bad signature");
            return TokenValidation::rejected("Invalid token signature");
        }

        if signed.payload.expires_at <= self.clock.now_millis() {
            debug!(photo_id = %signed.payload.photo_id, "Token rejected: expired");
            return TokenValidation::rejected("Token has expired");
        }

        TokenValidation::ok(signed.payload)
    }

    fn sign(&self, payload: &TokenPayload) -> AppResult<String> {
        let unsigned = serde_json::to_vec(payload)
            .map_err(|e| AppError::internal(format!("Failed to encode token payload: {e}")))?;
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| AppError::internal(format!("Invalid token secret: {e}")))?;
        mac.update(&unsigned);
        Ok(hex_encode(&mac.finalize().into_bytes()))
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
