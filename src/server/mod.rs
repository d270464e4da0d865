// src/server/mod.rs

//! HTTP server components.
//!
//! This module contains:
//! - `handlers`  → Axum handlers for verification and health
//! - `admin`     → Admin API for reconciliation and status overrides
//! - `auth`      → Bearer-token authorization for admin routes
//! - `routes`    → Router builder
//! - `api_error` → Wire-format error envelope
//! - `logging`   → Request ID and timing middleware

pub mod admin;
pub mod api_error;
pub mod auth;
pub mod handlers;
pub mod logging;
pub mod routes;

// Convenient re-exports so callers can do `keyward::server::X`
// instead of digging into submodules.

pub use admin::{
    audit_handler, auto_check_handler, disable_handler, reconcile_handler, reinstate_handler,
    release_handler, renew_handler, revoke_handler, suspend_handler, AdminActionResponse,
    ReasonRequest, RenewRequest,
};
pub use api_error::{ApiError, ErrorCode};
pub use auth::{authorizer_from_config, require_admin, Authorizer, StaticTokenAuthorizer};
pub use handlers::{
    health_handler, verify_handler, AppState, DatabaseHealth, HealthResponse, VerifyApiRequest,
    VerifyApiResponse,
};
pub use logging::{request_logging_middleware, REQUEST_ID_HEADER};
pub use routes::build_router;
