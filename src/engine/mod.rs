//! The license lifecycle engine.
//!
//! [`LifecycleEngine::verify`] is the single authoritative state-transition
//! function: every status change a license undergoes at runtime flows
//! through it (administrative overrides are the one sanctioned exception,
//! and those are logged through the same sink). The engine owns no global
//! state; it is constructed with an injected store handle and a settings
//! value so tests and the server entry point wire it up explicitly.

use chrono::{NaiveDateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::errors::EngineResult;
use crate::license_key;
use crate::status::{LicenseStatus, LogResult, VerifyStatus};
use crate::store::{Database, License};

mod reconcile;

pub use reconcile::{InactiveFlag, LicenseDiff, PassReport, PassTrigger};

/// Policy knobs the engine is constructed with.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Days without a heartbeat before a bound license is flagged inactive.
    pub inactivity_threshold_days: i64,
    /// Grace window length applied by the administrative suspend action.
    pub grace_period_days: i64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            inactivity_threshold_days: 30,
            grace_period_days: 14,
        }
    }
}

impl From<&EngineConfig> for EngineSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            inactivity_threshold_days: config.inactivity_threshold_days,
            grace_period_days: config.grace_period_days,
        }
    }
}

/// A verification request: one client heartbeat or activation attempt.
#[derive(Debug, Clone)]
pub struct VerifyRequest {
    pub license_key: String,
    pub customer_id: String,
    pub installation_id: String,
    /// Self-reported by the client; trusted input, advisory only.
    pub reported_device_count: i64,
}

/// Who is calling `Verify`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caller {
    /// A running client application (heartbeat or activation).
    Client,
    /// The batch pass replaying a heartbeat. Must not advance
    /// `last_active_at`, or the pass would erase the inactivity signal
    /// it is computing.
    System,
}

/// Call-site context recorded in the verification log.
#[derive(Debug, Clone)]
pub struct VerifyContext {
    pub ip_address: String,
    pub caller: Caller,
}

impl VerifyContext {
    pub fn client(ip_address: impl Into<String>) -> Self {
        Self {
            ip_address: ip_address.into(),
            caller: Caller::Client,
        }
    }

    pub fn system() -> Self {
        Self {
            ip_address: "system".to_string(),
            caller: Caller::System,
        }
    }
}

/// What the caller of `Verify` gets back.
#[derive(Debug, Clone)]
pub struct VerifyOutcome {
    pub status: VerifyStatus,
    pub reason: String,
}

/// The verification and reconciliation engine.
pub struct LifecycleEngine {
    db: Arc<Database>,
    settings: EngineSettings,
    /// Swallowed verification-log write failures. The log must never fail
    /// a transition, but losing entries silently is not acceptable either.
    log_write_failures: AtomicU64,
}

impl LifecycleEngine {
    pub fn new(db: Arc<Database>, settings: EngineSettings) -> Self {
        Self {
            db,
            settings,
            log_write_failures: AtomicU64::new(0),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Number of verification-log writes that failed and were swallowed.
    pub fn log_write_failures(&self) -> u64 {
        self.log_write_failures.load(Ordering::Relaxed)
    }

    /// Verify a license key against a claimed installation.
    ///
    /// This never returns an error: unexpected failures surface as
    /// [`VerifyStatus::Error`] with the license row left untouched. Every
    /// call produces exactly one verification log entry; a log-write
    /// failure is swallowed and counted.
    pub async fn verify(&self, req: &VerifyRequest, ctx: &VerifyContext) -> VerifyOutcome {
        let now = Utc::now().naive_utc();
        let key_hash = license_key::hash_key(&req.license_key);
        let installation_id = req.installation_id.trim();

        let (status, reason, result) = if installation_id.is_empty() {
            (
                VerifyStatus::Invalid,
                "installation_id must be a non-empty string".to_string(),
                LogResult::Deny,
            )
        } else if !license_key::validate_key_format(&req.license_key) {
            (
                VerifyStatus::Invalid,
                format!(
                    "malformed license key {}",
                    license_key::mask_key(&req.license_key)
                ),
                LogResult::Deny,
            )
        } else {
            match self.verify_resolved(req, ctx, now).await {
                Ok(resolved) => resolved,
                Err(e) => {
                    warn!(key_hash = %key_hash, "verification failed: {e}");
                    (
                        VerifyStatus::Error,
                        "internal error during verification".to_string(),
                        LogResult::Error,
                    )
                }
            }
        };

        let logged_installation = (!installation_id.is_empty()).then_some(installation_id);
        self.append_log(
            &key_hash,
            &ctx.ip_address,
            logged_installation,
            result,
            &reason,
            now,
        )
        .await;

        info!(key_hash = %key_hash, status = %status, result = %result, "verification completed");

        VerifyOutcome {
            status,
            reason,
        }
    }

    /// The transition logic once the request itself is well-formed.
    async fn verify_resolved(
        &self,
        req: &VerifyRequest,
        ctx: &VerifyContext,
        now: NaiveDateTime,
    ) -> EngineResult<(VerifyStatus, String, LogResult)> {
        let Some(license) = self.db.get_license_by_key(&req.license_key).await? else {
            return Ok((
                VerifyStatus::NotFound,
                "unknown license key".to_string(),
                LogResult::Deny,
            ));
        };

        let status = license.current_status();

        // Administrative states are never overridden by verification.
        if status.is_administrative() {
            return Ok((
                status.into(),
                format!("license is {status}; administrative action required"),
                LogResult::Deny,
            ));
        }

        // An elapsed grace window hardens into expiry.
        if status == LicenseStatus::GracePeriod {
            if let Some(end) = license.grace_period_end {
                if end < now {
                    self.db.mark_expired(&license.id, now).await?;
                    return Ok((
                        VerifyStatus::Expired,
                        format!("grace period ended at {end}"),
                        LogResult::Deny,
                    ));
                }
            }
        }

        if let Some(at) = license.expires_at {
            if at < now {
                self.db.mark_expired(&license.id, now).await?;
                return Ok((
                    VerifyStatus::Expired,
                    format!("expired at {at}"),
                    LogResult::Deny,
                ));
            }
        }

        if status == LicenseStatus::Expired {
            return Ok((
                VerifyStatus::Expired,
                "license has expired".to_string(),
                LogResult::Deny,
            ));
        }

        match license.bound_installation_id.as_deref() {
            None => self.first_bind(&license, req, ctx, now).await,
            Some(bound) if bound == req.installation_id => {
                self.heartbeat(&license, req, ctx, now).await
            }
            Some(_) => Ok((
                VerifyStatus::InUse,
                "license already bound to another installation".to_string(),
                LogResult::Deny,
            )),
        }
    }

    /// First activation: bind the installation atomically.
    async fn first_bind(
        &self,
        license: &License,
        req: &VerifyRequest,
        ctx: &VerifyContext,
        now: NaiveDateTime,
    ) -> EngineResult<(VerifyStatus, String, LogResult)> {
        let target = license.base_status();

        if self
            .db
            .try_bind(&license.id, &req.installation_id, target, now)
            .await?
        {
            let mut reason = format!("bound to installation {}", req.installation_id);
            append_overflow_note(&mut reason, req.reported_device_count, license.max_devices);
            return Ok((target.into(), reason, LogResult::Allow));
        }

        // Lost the race. Re-read to see who holds the binding now.
        let current = self.db.get_license(&license.id).await?;
        match current.and_then(|l| l.bound_installation_id) {
            Some(bound) if bound == req.installation_id => {
                self.heartbeat(license, req, ctx, now).await
            }
            _ => Ok((
                VerifyStatus::InUse,
                "license already bound to another installation".to_string(),
                LogResult::Deny,
            )),
        }
    }

    /// Heartbeat for the installation that holds the binding.
    async fn heartbeat(
        &self,
        license: &License,
        req: &VerifyRequest,
        ctx: &VerifyContext,
        now: NaiveDateTime,
    ) -> EngineResult<(VerifyStatus, String, LogResult)> {
        let status = license.current_status();

        let (next, mut reason) = match status {
            // The heartbeat reached us, so the portal is reachable again.
            LicenseStatus::GracePeriod => (
                license.base_status(),
                "portal reachable again; restored from grace_period".to_string(),
            ),
            // Bound but never assigned a tier status; normalize it.
            LicenseStatus::Unconfigured => (
                license.base_status(),
                "status assigned on first heartbeat".to_string(),
            ),
            _ => (
                status,
                format!("heartbeat accepted for installation {}", req.installation_id),
            ),
        };

        match ctx.caller {
            Caller::Client => {
                self.db
                    .record_heartbeat(
                        &license.id,
                        &req.installation_id,
                        req.reported_device_count,
                        next,
                        now,
                    )
                    .await?;
            }
            Caller::System => {
                if next != status {
                    self.db.restore_status(&license.id, next, now).await?;
                }
            }
        }

        append_overflow_note(&mut reason, req.reported_device_count, license.max_devices);

        Ok((next.into(), reason, LogResult::Allow))
    }

    /// Write one verification log entry, swallowing any failure.
    pub(crate) async fn append_log(
        &self,
        license_key_hash: &str,
        ip_address: &str,
        installation_id: Option<&str>,
        result: LogResult,
        reason: &str,
        now: NaiveDateTime,
    ) {
        if let Err(e) = self
            .db
            .append_log(license_key_hash, ip_address, installation_id, result, reason, now)
            .await
        {
            self.log_write_failures.fetch_add(1, Ordering::Relaxed);
            warn!("verification log write failed (swallowed): {e}");
        }
    }
}

/// Device-count enforcement is advisory at this layer: overflow is recorded
/// for audit but never blocks usage. Overflow handling belongs to the
/// external device inventory feature.
fn append_overflow_note(reason: &mut String, reported: i64, max_devices: i64) {
    if reported > max_devices {
        reason.push_str(&format!(
            "; device count {reported} exceeds limit {max_devices}"
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_from_config() {
        let config = EngineConfig {
            inactivity_threshold_days: 45,
            grace_period_days: 7,
        };
        let settings = EngineSettings::from(&config);
        assert_eq!(settings.inactivity_threshold_days, 45);
        assert_eq!(settings.grace_period_days, 7);
    }

    #[test]
    fn system_context_uses_system_ip() {
        let ctx = VerifyContext::system();
        assert_eq!(ctx.ip_address, "system");
        assert_eq!(ctx.caller, Caller::System);
    }

    #[test]
    fn overflow_note_only_when_exceeded() {
        let mut reason = "heartbeat accepted".to_string();
        append_overflow_note(&mut reason, 3, 5);
        assert_eq!(reason, "heartbeat accepted");

        append_overflow_note(&mut reason, 8, 5);
        assert!(reason.contains("device count 8 exceeds limit 5"));
    }
}
