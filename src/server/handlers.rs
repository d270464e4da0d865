//! Public HTTP handlers: verification and health.
//!
//! The verification endpoint answers 200 for every resolved outcome,
//! including deny-type results; only malformed requests and missing auth
//! use 4xx. Clients treat any non-`active`/`free` status as invalid and
//! distinguish soft (`grace_period`) from hard (`expired`, `revoked`)
//! blocks themselves.

use axum::{
    extract::State,
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::engine::{LifecycleEngine, VerifyContext, VerifyRequest};
use crate::server::auth::Authorizer;
use crate::status::VerifyStatus;
use crate::store::Database;

/// Shared application state for handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<LifecycleEngine>,
    pub db: Arc<Database>,
    pub authorizer: Arc<dyn Authorizer>,
}

/// Wire format of a verification request.
#[derive(Debug, Deserialize, Serialize)]
pub struct VerifyApiRequest {
    pub app_license_key: String,
    pub user_id: String,
    pub current_device_count: i64,
    pub installation_id: String,
}

/// Wire format of a verification response.
#[derive(Debug, Deserialize, Serialize)]
pub struct VerifyApiResponse {
    pub status: VerifyStatus,
    pub message: String,
}

/// Best-effort caller address from forwarding headers.
///
/// The address is recorded in the verification log for forensic review,
/// nothing more, so a spoofable header is acceptable here.
fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

/// Handler for license verification (the per-session heartbeat).
///
/// Always returns 200 once the body parses; the business outcome lives in
/// the `status` field. Invalid keys, unknown keys, and `in_use` are
/// resolved outcomes, not HTTP errors.
pub async fn verify_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<VerifyApiRequest>,
) -> Json<VerifyApiResponse> {
    let request = VerifyRequest {
        license_key: payload.app_license_key,
        customer_id: payload.user_id,
        installation_id: payload.installation_id,
        reported_device_count: payload.current_device_count,
    };

    let ctx = VerifyContext::client(client_ip(&headers));
    let outcome = state.engine.verify(&request, &ctx).await;

    info!(status = %outcome.status, "verify request resolved");

    Json(VerifyApiResponse {
        status: outcome.status,
        message: outcome.reason,
    })
}

/// Health check response structure.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Service status ("healthy" or "degraded")
    pub status: String,
    /// Service name
    pub service: String,
    /// Service version
    pub version: String,
    /// Database connectivity status
    pub database: DatabaseHealth,
}

/// Database health status.
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseHealth {
    /// Whether the database is reachable
    pub connected: bool,
    /// Database type (sqlite or postgres)
    pub db_type: String,
}

impl HealthResponse {
    pub fn healthy(db_connected: bool, db_type: &str) -> Self {
        Self {
            status: if db_connected { "healthy" } else { "degraded" }.to_string(),
            service: "keyward".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            database: DatabaseHealth {
                connected: db_connected,
                db_type: db_type.to_string(),
            },
        }
    }
}

/// Handler for the health endpoint.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let connected = state.db.ping().await;
    Json(HealthResponse::healthy(connected, state.db.backend_name()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn client_ip_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.4"));
        assert_eq!(client_ip(&headers), "203.0.113.9");
    }

    #[test]
    fn client_ip_falls_back_to_real_ip_then_unknown() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.4"));
        assert_eq!(client_ip(&headers), "198.51.100.4");

        assert_eq!(client_ip(&HeaderMap::new()), "unknown");
    }

    #[test]
    fn health_response_degrades_without_database() {
        let health = HealthResponse::healthy(true, "sqlite");
        assert_eq!(health.status, "healthy");

        let health = HealthResponse::healthy(false, "postgres");
        assert_eq!(health.status, "degraded");
        assert!(!health.database.connected);
    }
}
