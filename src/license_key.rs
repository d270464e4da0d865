//! License key format validation, hashing, and generation.
//!
//! Keys are opaque secrets of the form `PREFIX-XXXX-XXXX-XXXX-XXXX`. The
//! raw key is never logged: the verification log stores only the SHA-256
//! digest, and human-readable reason strings use a masked prefix.

use rand::Rng;
use sha2::{Digest, Sha256};

use crate::config::LicenseConfig;

/// Character set for license key generation.
/// Excludes ambiguous characters: 0, O, I, L, 1
const LICENSE_KEY_CHARSET: &[u8] = b"23456789ABCDEFGHJKMNPQRSTUVWXYZ";

/// Configuration for license key generation.
#[derive(Debug, Clone)]
pub struct LicenseKeyConfig {
    /// Prefix for the license key (e.g., "LIC", "KW")
    pub prefix: String,
    /// Number of segments after the prefix
    pub segments: u8,
    /// Length of each segment
    pub segment_length: u8,
}

impl Default for LicenseKeyConfig {
    fn default() -> Self {
        Self {
            prefix: "LIC".to_string(),
            segments: 4,
            segment_length: 4,
        }
    }
}

impl From<&LicenseConfig> for LicenseKeyConfig {
    fn from(config: &LicenseConfig) -> Self {
        Self {
            prefix: config.key_prefix.clone(),
            segments: config.key_segments,
            segment_length: config.key_segment_length,
        }
    }
}

/// Generate a single segment of random characters.
fn generate_segment(length: u8) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| {
            let idx = rng.random_range(0..LICENSE_KEY_CHARSET.len());
            LICENSE_KEY_CHARSET[idx] as char
        })
        .collect()
}

/// Generate a license key with the given configuration.
///
/// Produces keys like `LIC-A2B3-C4D5-E6F7-G8H9`. Minting license rows is
/// the commerce flow's job; this exists for operational tooling and tests.
pub fn generate_license_key(config: &LicenseKeyConfig) -> String {
    let segments: Vec<String> = (0..config.segments)
        .map(|_| generate_segment(config.segment_length))
        .collect();

    format!("{}-{}", config.prefix, segments.join("-"))
}

/// Check that a string looks like a license key.
///
/// Accepts a 2-10 character uppercase alphanumeric prefix followed by 2-5
/// segments of 2-6 unambiguous characters. Intentionally looser than the
/// generator so that keys issued under older prefix settings keep working.
pub fn validate_key_format(value: &str) -> bool {
    let key_regex = regex::Regex::new(r"^[A-Z0-9]{2,10}(-[A-Z2-9]{2,6}){2,5}$").unwrap();
    key_regex.is_match(value)
}

/// SHA-256 digest of a license key, hex-encoded.
///
/// This is the only form of the key that ever reaches the verification log
/// or tracing output.
pub fn hash_key(raw_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Masked form of a key for reason strings: prefix plus first segment.
pub fn mask_key(raw_key: &str) -> String {
    let mut parts = raw_key.splitn(3, '-');
    match (parts.next(), parts.next()) {
        (Some(prefix), Some(first)) => format!("{prefix}-{first}-…"),
        _ => "…".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_validate() {
        let config = LicenseKeyConfig::default();
        for _ in 0..20 {
            let key = generate_license_key(&config);
            assert!(validate_key_format(&key), "generated key failed: {key}");
        }
    }

    #[test]
    fn generated_keys_have_expected_shape() {
        let config = LicenseKeyConfig {
            prefix: "KW".to_string(),
            segments: 3,
            segment_length: 5,
        };
        let key = generate_license_key(&config);
        let parts: Vec<&str> = key.split('-').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "KW");
        assert!(parts[1..].iter().all(|seg| seg.len() == 5));
    }

    #[test]
    fn rejects_malformed_keys() {
        assert!(!validate_key_format(""));
        assert!(!validate_key_format("not a key"));
        assert!(!validate_key_format("LIC"));
        assert!(!validate_key_format("lic-abcd-efgh"));
        assert!(validate_key_format("LIC-ABCD-EFGH-JKMN"));
    }

    #[test]
    fn hash_is_stable_sha256_hex() {
        let hash = hash_key("LIC-ABCD-EFGH-JKMN");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hash, hash_key("LIC-ABCD-EFGH-JKMN"));
        assert_ne!(hash, hash_key("LIC-ABCD-EFGH-JKMP"));
    }

    #[test]
    fn mask_hides_most_of_the_key() {
        let masked = mask_key("LIC-ABCD-EFGH-JKMN");
        assert_eq!(masked, "LIC-ABCD-…");
        assert!(!masked.contains("EFGH"));
    }
}
