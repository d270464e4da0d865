//! License status taxonomy.
//!
//! Two enums cover the two distinct audiences:
//!
//! - [`LicenseStatus`] is what the store persists. Only `Verify` and
//!   administrative overrides ever write it.
//! - [`VerifyStatus`] is what a caller of `Verify` sees. It is a superset:
//!   `in_use`, `invalid`, `not_found`, and `error` are reported to the
//!   caller but never written against any license row.
//!
//! Statuses are stored as text columns and parsed at the engine boundary.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Persisted license status. Single source of truth for "is this license
/// usable right now".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LicenseStatus {
    /// No key activated yet; awaiting first bind.
    Unconfigured,
    /// Valid no-cost tier, perpetual unless revoked.
    Free,
    /// Valid paid tier.
    Active,
    /// Kept usable for a bounded window despite a backend outage.
    GracePeriod,
    /// Past `expires_at`; terminal until administrative renewal.
    Expired,
    /// Administrative: fraud/chargeback. Terminal.
    Revoked,
    /// Administrative: suspended. Terminal.
    Disabled,
}

impl LicenseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LicenseStatus::Unconfigured => "unconfigured",
            LicenseStatus::Free => "free",
            LicenseStatus::Active => "active",
            LicenseStatus::GracePeriod => "grace_period",
            LicenseStatus::Expired => "expired",
            LicenseStatus::Revoked => "revoked",
            LicenseStatus::Disabled => "disabled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unconfigured" => Some(LicenseStatus::Unconfigured),
            "free" => Some(LicenseStatus::Free),
            "active" => Some(LicenseStatus::Active),
            "grace_period" => Some(LicenseStatus::GracePeriod),
            "expired" => Some(LicenseStatus::Expired),
            "revoked" => Some(LicenseStatus::Revoked),
            "disabled" => Some(LicenseStatus::Disabled),
            _ => None,
        }
    }

    /// Administrative states that verification must never override.
    pub fn is_administrative(&self) -> bool {
        matches!(self, LicenseStatus::Revoked | LicenseStatus::Disabled)
    }

    /// Whether a client holding this status may use the software.
    pub fn is_usable(&self) -> bool {
        matches!(
            self,
            LicenseStatus::Free | LicenseStatus::Active | LicenseStatus::GracePeriod
        )
    }
}

impl fmt::Display for LicenseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-visible outcome of a `Verify` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyStatus {
    Unconfigured,
    Free,
    Active,
    GracePeriod,
    Expired,
    Revoked,
    Disabled,
    /// A second installation attempted to bind an already-bound key.
    /// The original binding is unaffected.
    InUse,
    /// Key does not parse or the request is malformed. Not persisted.
    Invalid,
    /// Lookup miss. Not persisted.
    NotFound,
    /// Internal failure during verification. Not persisted.
    Error,
}

impl VerifyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerifyStatus::Unconfigured => "unconfigured",
            VerifyStatus::Free => "free",
            VerifyStatus::Active => "active",
            VerifyStatus::GracePeriod => "grace_period",
            VerifyStatus::Expired => "expired",
            VerifyStatus::Revoked => "revoked",
            VerifyStatus::Disabled => "disabled",
            VerifyStatus::InUse => "in_use",
            VerifyStatus::Invalid => "invalid",
            VerifyStatus::NotFound => "not_found",
            VerifyStatus::Error => "error",
        }
    }
}

impl From<LicenseStatus> for VerifyStatus {
    fn from(status: LicenseStatus) -> Self {
        match status {
            LicenseStatus::Unconfigured => VerifyStatus::Unconfigured,
            LicenseStatus::Free => VerifyStatus::Free,
            LicenseStatus::Active => VerifyStatus::Active,
            LicenseStatus::GracePeriod => VerifyStatus::GracePeriod,
            LicenseStatus::Expired => VerifyStatus::Expired,
            LicenseStatus::Revoked => VerifyStatus::Revoked,
            LicenseStatus::Disabled => VerifyStatus::Disabled,
        }
    }
}

impl fmt::Display for VerifyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result column of a verification log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogResult {
    Allow,
    Deny,
    AutoCheck,
    Error,
}

impl LogResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogResult::Allow => "allow",
            LogResult::Deny => "deny",
            LogResult::AutoCheck => "auto_check",
            LogResult::Error => "error",
        }
    }
}

impl fmt::Display for LogResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            LicenseStatus::Unconfigured,
            LicenseStatus::Free,
            LicenseStatus::Active,
            LicenseStatus::GracePeriod,
            LicenseStatus::Expired,
            LicenseStatus::Revoked,
            LicenseStatus::Disabled,
        ] {
            assert_eq!(LicenseStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(LicenseStatus::parse("in_use"), None);
    }

    #[test]
    fn administrative_states() {
        assert!(LicenseStatus::Revoked.is_administrative());
        assert!(LicenseStatus::Disabled.is_administrative());
        assert!(!LicenseStatus::Expired.is_administrative());
        assert!(!LicenseStatus::Active.is_administrative());
    }

    #[test]
    fn verify_status_serializes_snake_case() {
        let json = serde_json::to_string(&VerifyStatus::InUse).unwrap();
        assert_eq!(json, "\"in_use\"");
        let json = serde_json::to_string(&VerifyStatus::GracePeriod).unwrap();
        assert_eq!(json, "\"grace_period\"");
    }
}
