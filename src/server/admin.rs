//! Administrative API: reconciliation triggers and status overrides.
//!
//! Every route here checks the injected [`Authorizer`] before touching the
//! engine. Overrides write `status` directly — they are the one sanctioned
//! path besides verification — and each one is recorded in the
//! verification log against the license key hash.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use chrono::{Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::engine::{PassReport, PassTrigger};
use crate::server::api_error::{ApiError, ErrorCode};
use crate::server::auth::require_admin;
use crate::server::handlers::AppState;
use crate::status::{LicenseStatus, LogResult};
use crate::store::{License, VerificationLogEntry};

/// Optional free-text reason attached to an override.
#[derive(Debug, Default, Deserialize)]
pub struct ReasonRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Request to renew an expired license.
#[derive(Debug, Deserialize)]
pub struct RenewRequest {
    /// New expiry; omit for a perpetual license.
    #[serde(default)]
    pub expires_at: Option<NaiveDateTime>,
}

/// Response from an administrative override.
#[derive(Debug, Serialize)]
pub struct AdminActionResponse {
    pub success: bool,
    pub license_id: String,
    pub status: String,
}

async fn load_license(state: &AppState, id: &str) -> Result<License, ApiError> {
    state
        .db
        .get_license(id)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?
        .ok_or_else(|| ApiError::new(ErrorCode::LicenseNotFound, format!("no license with id {id}")))
}

/// Record an administrative action in the verification log.
async fn log_admin_action(state: &AppState, license: &License, result: LogResult, reason: &str) {
    let now = Utc::now().naive_utc();
    state
        .engine
        .append_log(&license.license_key_hash, "admin", None, result, reason, now)
        .await;
}

/// Run the Reconciliation pass and return the full diff report.
///
/// The synchronous twin of the scheduled Auto-Check: same pass, but the
/// caller gets the per-license diff list instead of only a log line.
pub async fn reconcile_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<PassReport>, ApiError> {
    require_admin(state.authorizer.as_ref(), &headers)?;

    info!("Admin-triggered reconciliation pass starting");

    let report = state
        .engine
        .run_pass(PassTrigger::Manual)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    Ok(Json(report))
}

/// Run a scheduled-style Auto-Check pass immediately.
///
/// Tolerates an empty body; all replay log entries carry `ip = "system"`.
pub async fn auto_check_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<PassReport>, ApiError> {
    require_admin(state.authorizer.as_ref(), &headers)?;

    let report = state
        .engine
        .run_pass(PassTrigger::Scheduled)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    Ok(Json(report))
}

/// Revoke a license (fraud/chargeback). Terminal.
pub async fn revoke_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    payload: Option<Json<ReasonRequest>>,
) -> Result<Json<AdminActionResponse>, ApiError> {
    override_status(state, headers, id, LicenseStatus::Revoked, payload, "revoke").await
}

/// Disable (suspend) a license administratively. Terminal until reinstated.
pub async fn disable_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    payload: Option<Json<ReasonRequest>>,
) -> Result<Json<AdminActionResponse>, ApiError> {
    override_status(state, headers, id, LicenseStatus::Disabled, payload, "disable").await
}

async fn override_status(
    state: AppState,
    headers: HeaderMap,
    id: String,
    status: LicenseStatus,
    payload: Option<Json<ReasonRequest>>,
    action: &str,
) -> Result<Json<AdminActionResponse>, ApiError> {
    require_admin(state.authorizer.as_ref(), &headers)?;

    let license = load_license(&state, &id).await?;
    let now = Utc::now().naive_utc();

    state
        .db
        .set_status(&id, status, now)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    let reason = match payload.and_then(|Json(p)| p.reason) {
        Some(text) => format!("admin {action}: {text}"),
        None => format!("admin {action}"),
    };
    log_admin_action(&state, &license, LogResult::Deny, &reason).await;

    info!(license_id = %id, status = %status, "administrative override applied");

    Ok(Json(AdminActionResponse {
        success: true,
        license_id: id,
        status: status.to_string(),
    }))
}

/// Reinstate a revoked or disabled license to its tier's base status.
pub async fn reinstate_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<AdminActionResponse>, ApiError> {
    require_admin(state.authorizer.as_ref(), &headers)?;

    let license = load_license(&state, &id).await?;
    let now = Utc::now().naive_utc();
    let status = license.base_status();

    state
        .db
        .set_status(&id, status, now)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    log_admin_action(&state, &license, LogResult::Allow, "admin reinstate").await;

    Ok(Json(AdminActionResponse {
        success: true,
        license_id: id,
        status: status.to_string(),
    }))
}

/// Renew a license: set a new expiry (or none) and restore the tier's base
/// status. The only exit from `expired` besides deletion, which never
/// happens.
pub async fn renew_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    payload: Option<Json<RenewRequest>>,
) -> Result<Json<AdminActionResponse>, ApiError> {
    require_admin(state.authorizer.as_ref(), &headers)?;

    let mut license = load_license(&state, &id).await?;
    let now = Utc::now().naive_utc();
    let status = license.base_status();

    license.expires_at = payload.and_then(|Json(p)| p.expires_at);
    license.status = status.as_str().to_string();
    license.grace_period_end = None;
    license.updated_at = now;

    let expires_note = license
        .expires_at
        .map(|at| at.to_string())
        .unwrap_or_else(|| "perpetual".to_string());

    state
        .db
        .insert_license(license.clone())
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    log_admin_action(
        &state,
        &license,
        LogResult::Allow,
        &format!("admin renew: expires_at {expires_note}"),
    )
    .await;

    Ok(Json(AdminActionResponse {
        success: true,
        license_id: id,
        status: status.to_string(),
    }))
}

/// Clear the installation binding so the key can be bound again.
///
/// Rebinding is an explicit administrative action, never a side effect of
/// verification.
pub async fn release_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<AdminActionResponse>, ApiError> {
    require_admin(state.authorizer.as_ref(), &headers)?;

    let license = load_license(&state, &id).await?;
    let now = Utc::now().naive_utc();

    let released = state
        .db
        .clear_binding(&id, now)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    let reason = match &license.bound_installation_id {
        Some(bound) => format!("admin release: unbound from installation {bound}"),
        None => "admin release: license was not bound".to_string(),
    };
    log_admin_action(&state, &license, LogResult::Allow, &reason).await;

    Ok(Json(AdminActionResponse {
        success: released,
        license_id: id,
        status: license.status,
    }))
}

/// Place a license into its grace window (e.g., during a planned backend
/// outage or a billing retry). The window length comes from engine
/// settings; the Auto-Check pass hardens an elapsed window into `expired`.
pub async fn suspend_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    payload: Option<Json<ReasonRequest>>,
) -> Result<Json<AdminActionResponse>, ApiError> {
    require_admin(state.authorizer.as_ref(), &headers)?;

    let license = load_license(&state, &id).await?;
    let now = Utc::now().naive_utc();
    let grace_end = now + Duration::days(state.engine.settings().grace_period_days);

    state
        .db
        .enter_grace(&id, grace_end, now)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    let reason = match payload.and_then(|Json(p)| p.reason) {
        Some(text) => format!("admin suspend until {grace_end}: {text}"),
        None => format!("admin suspend until {grace_end}"),
    };
    log_admin_action(&state, &license, LogResult::Deny, &reason).await;

    Ok(Json(AdminActionResponse {
        success: true,
        license_id: id,
        status: LicenseStatus::GracePeriod.to_string(),
    }))
}

/// Forensic review: the verification log entries for one key hash,
/// newest first.
pub async fn audit_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(key_hash): Path<String>,
) -> Result<Json<Vec<VerificationLogEntry>>, ApiError> {
    require_admin(state.authorizer.as_ref(), &headers)?;

    let entries = state
        .db
        .log_entries_for(&key_hash)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    Ok(Json(entries))
}
