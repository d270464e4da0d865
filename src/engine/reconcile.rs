//! The reconciliation pass shared by the scheduled Auto-Check job and the
//! admin-triggered Reconciliation endpoint.
//!
//! Both walk every license that is bound or can expire, apply time-based
//! transitions, flag activity anomalies, and replay the client heartbeat
//! through `Verify` for each bound license. They differ only in trigger and
//! output shape: the scheduled run persists one summary log entry, the
//! manual run returns the full per-license diff report to the caller.
//!
//! The pass is idempotent: an immediate second run produces zero additional
//! transitions, because every transition it applies is conditional on the
//! state that warranted it.

use chrono::{Duration, NaiveDateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::errors::EngineResult;
use crate::status::{LicenseStatus, LogResult, VerifyStatus};
use crate::store::License;

use super::{LifecycleEngine, VerifyContext, VerifyRequest};

/// What kicked off the pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassTrigger {
    /// Cron-invoked Auto-Check. Persists a summary log entry.
    Scheduled,
    /// Admin-invoked Reconciliation. Returns the diff report synchronously.
    Manual,
}

/// One status transition observed during the pass.
#[derive(Debug, Clone, Serialize)]
pub struct LicenseDiff {
    pub license_id: String,
    pub before: String,
    pub after: String,
    pub note: String,
}

/// An advisory inactivity flag. Absence of a heartbeat is not proof of
/// misuse, so this never changes status.
#[derive(Debug, Clone, Serialize)]
pub struct InactiveFlag {
    pub license_id: String,
    pub bound_installation_id: String,
    pub last_active_at: Option<NaiveDateTime>,
}

/// Aggregate result of one pass.
#[derive(Debug, Default, Serialize)]
pub struct PassReport {
    pub examined: usize,
    pub auto_expired: usize,
    pub grace_expired: usize,
    pub inactive_flagged: usize,
    pub reverified: usize,
    pub errors: usize,
    pub status_changes: Vec<LicenseDiff>,
    pub inactive: Vec<InactiveFlag>,
}

impl PassReport {
    fn summary(&self) -> String {
        format!(
            "examined={} auto_expired={} grace_expired={} inactive_flagged={} reverified={} errors={}",
            self.examined,
            self.auto_expired,
            self.grace_expired,
            self.inactive_flagged,
            self.reverified,
            self.errors
        )
    }
}

impl LifecycleEngine {
    /// Run the reconciliation pass over every bound or expiring license.
    ///
    /// Per-license failures are caught and counted so one bad row cannot
    /// abort the whole pass; licenses are processed independently, each
    /// one's steps strictly in order (expire checks before re-verification).
    pub async fn run_pass(&self, trigger: PassTrigger) -> EngineResult<PassReport> {
        let now = Utc::now().naive_utc();
        let licenses = self.db.licenses_for_pass().await?;

        info!(count = licenses.len(), ?trigger, "starting reconciliation pass");

        let mut report = PassReport::default();

        for license in &licenses {
            report.examined += 1;
            if let Err(e) = self.reconcile_one(license, &mut report, now).await {
                report.errors += 1;
                warn!(license_id = %license.id, "reconciliation step failed: {e}");
            }
        }

        info!("reconciliation pass finished: {}", report.summary());

        if trigger == PassTrigger::Scheduled {
            // One summary entry per run; a failure here is swallowed like
            // any other log write.
            self.append_log(
                "system",
                "system",
                None,
                LogResult::AutoCheck,
                &report.summary(),
                now,
            )
            .await;
        }

        Ok(report)
    }

    async fn reconcile_one(
        &self,
        license: &License,
        report: &mut PassReport,
        now: NaiveDateTime,
    ) -> EngineResult<()> {
        let before = license.current_status();

        // Elapsed grace window hardens into expiry. No replay needed: the
        // row is already past saving without administrative renewal.
        if before == LicenseStatus::GracePeriod {
            if let Some(end) = license.grace_period_end {
                if end < now {
                    if self.db.mark_expired(&license.id, now).await? {
                        report.grace_expired += 1;
                        report.status_changes.push(LicenseDiff {
                            license_id: license.id.clone(),
                            before: before.to_string(),
                            after: LicenseStatus::Expired.to_string(),
                            note: format!("grace period ended at {end}"),
                        });
                        debug!(license_id = %license.id, "grace period elapsed, expired");
                    }
                    return Ok(());
                }
            }
        }

        // Direct expiry, no installation round-trip needed.
        if matches!(before, LicenseStatus::Active | LicenseStatus::Free)
            && license.is_expired(now)
        {
            if self.db.mark_expired(&license.id, now).await? {
                report.auto_expired += 1;
                report.status_changes.push(LicenseDiff {
                    license_id: license.id.clone(),
                    before: before.to_string(),
                    after: LicenseStatus::Expired.to_string(),
                    note: format!(
                        "auto_expired: expires_at {}",
                        license
                            .expires_at
                            .map(|at| at.to_string())
                            .unwrap_or_default()
                    ),
                });
                debug!(license_id = %license.id, "auto-expired");
            }
            return Ok(());
        }

        // Inactivity is a signal, not a transition: the client may simply
        // be offline.
        if let Some(bound) = &license.bound_installation_id {
            if matches!(before, LicenseStatus::Active | LicenseStatus::Free) {
                let threshold = now - Duration::days(self.settings.inactivity_threshold_days);
                if license.last_active_at.map_or(true, |at| at < threshold) {
                    report.inactive_flagged += 1;
                    report.inactive.push(InactiveFlag {
                        license_id: license.id.clone(),
                        bound_installation_id: bound.clone(),
                        last_active_at: license.last_active_at,
                    });
                    warn!(
                        license_id = %license.id,
                        last_active_at = ?license.last_active_at,
                        "license inactive beyond threshold, flagged for review"
                    );
                }
            }
        }

        // Replay the heartbeat the client would send and diff the status.
        if let Some(bound) = &license.bound_installation_id {
            let replay = VerifyRequest {
                license_key: license.license_key.clone(),
                customer_id: license.customer_id.clone(),
                installation_id: bound.clone(),
                reported_device_count: license.current_devices,
            };

            let outcome = self.verify(&replay, &VerifyContext::system()).await;
            report.reverified += 1;

            if outcome.status == VerifyStatus::Error {
                report.errors += 1;
            } else if outcome.status != VerifyStatus::from(before) {
                report.status_changes.push(LicenseDiff {
                    license_id: license.id.clone(),
                    before: before.to_string(),
                    after: outcome.status.to_string(),
                    note: outcome.reason,
                });
            }
        }

        Ok(())
    }
}
