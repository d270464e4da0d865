//! Admin capability checks.
//!
//! The engine never consults a role table directly: administrative routes
//! ask an injected [`Authorizer`] whether the presented credential grants
//! admin capability. The production implementation compares a SHA-256
//! digest of the configured bearer token; tests substitute a fake.

use axum::http::HeaderMap;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::config::AdminConfig;
use crate::server::api_error::{ApiError, ErrorCode};

/// Capability check for administrative callers.
pub trait Authorizer: Send + Sync {
    /// Whether the presented token grants administrative capability.
    fn is_admin(&self, token: &str) -> bool;
}

/// Hash a token using SHA-256.
fn hash_token(raw_token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Compares the presented token's digest against the configured one.
/// Only the digest is held in memory.
pub struct StaticTokenAuthorizer {
    token_hash: String,
}

impl StaticTokenAuthorizer {
    pub fn new(token: &str) -> Self {
        Self {
            token_hash: hash_token(token),
        }
    }
}

impl Authorizer for StaticTokenAuthorizer {
    fn is_admin(&self, token: &str) -> bool {
        hash_token(token) == self.token_hash
    }
}

/// Rejects everything. Used when no admin token is configured.
pub struct DenyAllAuthorizer;

impl Authorizer for DenyAllAuthorizer {
    fn is_admin(&self, _token: &str) -> bool {
        false
    }
}

/// Build the production authorizer from configuration.
pub fn authorizer_from_config(config: &AdminConfig) -> Arc<dyn Authorizer> {
    if config.api_token.is_empty() {
        Arc::new(DenyAllAuthorizer)
    } else {
        Arc::new(StaticTokenAuthorizer::new(&config.api_token))
    }
}

/// Extract and check the bearer token on an admin route.
///
/// Unauthorized callers get 401/403 and no engine work occurs.
pub fn require_admin(authorizer: &dyn Authorizer, headers: &HeaderMap) -> Result<(), ApiError> {
    let header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            ApiError::new(ErrorCode::MissingToken, "Authorization header is required")
        })?;

    let token = header.strip_prefix("Bearer ").ok_or_else(|| {
        ApiError::new(
            ErrorCode::MissingToken,
            "Authorization header must use the Bearer scheme",
        )
    })?;

    if !authorizer.is_admin(token) {
        return Err(ApiError::new(
            ErrorCode::InvalidToken,
            "Token does not grant administrative access",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn static_token_accepts_only_its_token() {
        let authorizer = StaticTokenAuthorizer::new("secret-admin-token");
        assert!(authorizer.is_admin("secret-admin-token"));
        assert!(!authorizer.is_admin("wrong-token"));
        assert!(!authorizer.is_admin(""));
    }

    #[test]
    fn deny_all_rejects_everything() {
        assert!(!DenyAllAuthorizer.is_admin("anything"));
    }

    #[test]
    fn empty_config_token_denies_all() {
        let authorizer = authorizer_from_config(&AdminConfig::default());
        assert!(!authorizer.is_admin(""));
        assert!(!authorizer.is_admin("token"));
    }

    #[test]
    fn require_admin_needs_bearer_header() {
        let authorizer = StaticTokenAuthorizer::new("tok");

        let headers = HeaderMap::new();
        assert!(require_admin(&authorizer, &headers).is_err());

        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Basic tok"));
        assert!(require_admin(&authorizer, &headers).is_err());

        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer tok"));
        assert!(require_admin(&authorizer, &headers).is_ok());

        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer nope"));
        assert!(require_admin(&authorizer, &headers).is_err());
    }
}
