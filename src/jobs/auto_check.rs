//! Scheduled Auto-Check job.
//!
//! Walks every bound or expiring license, applies time-based transitions
//! (expiry, elapsed grace windows), flags inactivity, and replays the
//! client heartbeat through the verification path. The pass itself lives
//! in the engine; this wrapper exists so the scheduler and manual triggers
//! share one entry point. Tolerates invocation with no payload or user
//! context: all its log entries carry `ip_address = "system"`.

use tracing::debug;

use crate::engine::{LifecycleEngine, PassReport, PassTrigger};

use super::JobError;

/// Run one Auto-Check pass.
///
/// Returns the aggregate report; the engine has already persisted the
/// summary log entry (`result = auto_check`) by the time this returns.
pub async fn run_auto_check(engine: &LifecycleEngine) -> Result<PassReport, JobError> {
    debug!("Running scheduled auto-check pass");

    let report = engine.run_pass(PassTrigger::Scheduled).await?;

    Ok(report)
}
