use super::config::AuthConfig;

/// Bcrypt cost factor for hashing the API secret at startup.
const BCRYPT_COST: u32 = 10;

/// Header carrying the shared API secret.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Message returned verbatim in the 401 body on a failed key check.
pub const INVALID_API_KEY_MESSAGE: &str = "Invalid API Key";

/// Authentication provider for the `x-api-key` pre-request check.
///
/// The configured secret is bcrypt-hashed once at startup; per-request
/// verification uses bcrypt_verify, which is inherently constant-time.
/// An empty secret enables open mode: every request is accepted.
#[derive(Debug)]
pub struct ApiKeyAuth {
    secret_hash: Option<String>,
}

/// Result of checking an `x-api-key` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStatus {
    Valid,
    Missing,
    Invalid,
}

impl ApiKeyAuth {
    pub fn new(config: &AuthConfig) -> Self {
        let secret_hash = if config.api_secret.is_empty() {
            None
        } else {
            bcrypt::hash(&config.api_secret, BCRYPT_COST).ok()
        };
        Self { secret_hash }
    }

    /// Check the `x-api-key` header value against the configured secret.
    ///
    /// Missing header and mismatched key are distinguished for logging, but
    /// both must be answered with 401 and [`INVALID_API_KEY_MESSAGE`].
    pub fn check(&self, api_key: Option<&str>) -> KeyStatus {
        let Some(hash) = &self.secret_hash else {
            return KeyStatus::Valid;
        };
        match api_key {
            None => KeyStatus::Missing,
            Some(key) => {
                if bcrypt::verify(key, hash).unwrap_or(false) {
                    KeyStatus::Valid
                } else {
                    KeyStatus::Invalid
                }
            }
        }
    }

    /// Check if running in open mode (no secret configured).
    pub fn is_open_mode(&self) -> bool {
        self.secret_hash.is_none()
    }
}
