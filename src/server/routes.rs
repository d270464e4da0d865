use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::server::admin::{
    audit_handler, auto_check_handler, disable_handler, reconcile_handler, reinstate_handler,
    release_handler, renew_handler, revoke_handler, suspend_handler,
};
use crate::server::handlers::{health_handler, verify_handler, AppState};
use crate::server::logging::request_logging_middleware;

/// Build the application router.
///
/// # Routes
///
/// ## Client endpoints
/// - `POST /api/v1/verify` - Verify a license key for an installation
/// - `GET /api/v1/health` - Service and database health
///
/// ## Admin endpoints (bearer token required)
/// - `POST /api/v1/admin/reconcile` - Run a reconciliation pass, return the diff report
/// - `POST /api/v1/admin/auto-check` - Run a scheduled-style auto-check pass now
/// - `POST /api/v1/admin/licenses/:license_id/revoke` - Revoke a license
/// - `POST /api/v1/admin/licenses/:license_id/disable` - Disable a license
/// - `POST /api/v1/admin/licenses/:license_id/reinstate` - Restore tier base status
/// - `POST /api/v1/admin/licenses/:license_id/release` - Clear the installation binding
/// - `POST /api/v1/admin/licenses/:license_id/suspend` - Enter the grace window
/// - `POST /api/v1/admin/licenses/:license_id/renew` - Set a new expiry, restore base status
/// - `GET /api/v1/admin/audit/:key_hash` - Verification log entries for a key hash
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/verify", post(verify_handler))
        .route("/api/v1/health", get(health_handler))
        .route("/api/v1/admin/reconcile", post(reconcile_handler))
        .route("/api/v1/admin/auto-check", post(auto_check_handler))
        .route(
            "/api/v1/admin/licenses/:license_id/revoke",
            post(revoke_handler),
        )
        .route(
            "/api/v1/admin/licenses/:license_id/disable",
            post(disable_handler),
        )
        .route(
            "/api/v1/admin/licenses/:license_id/reinstate",
            post(reinstate_handler),
        )
        .route(
            "/api/v1/admin/licenses/:license_id/release",
            post(release_handler),
        )
        .route(
            "/api/v1/admin/licenses/:license_id/suspend",
            post(suspend_handler),
        )
        .route(
            "/api/v1/admin/licenses/:license_id/renew",
            post(renew_handler),
        )
        .route("/api/v1/admin/audit/:key_hash", get(audit_handler))
        .layer(middleware::from_fn(request_logging_middleware))
        .with_state(state)
}
