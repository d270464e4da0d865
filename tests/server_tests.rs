use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;

use keyward::engine::{EngineSettings, LifecycleEngine};
use keyward::license_key::hash_key;
use keyward::server::{build_router, AppState, StaticTokenAuthorizer};
use keyward::status::LicenseStatus;
use keyward::store::{Database, License};

const ADMIN_TOKEN: &str = "test-admin-token";

async fn setup_app() -> (Arc<Database>, Router) {
    let db = Database::open_sqlite("sqlite::memory:", 1)
        .await
        .expect("in-memory db");
    db.migrate().await.expect("migrate");

    let engine = Arc::new(LifecycleEngine::new(
        Arc::clone(&db),
        EngineSettings::default(),
    ));

    let state = AppState {
        engine,
        db: Arc::clone(&db),
        authorizer: Arc::new(StaticTokenAuthorizer::new(ADMIN_TOKEN)),
    };

    (db, build_router(state))
}

fn fixture_license(id: &str, key: &str, status: LicenseStatus) -> License {
    let now = Utc::now().naive_utc();
    License {
        id: id.to_string(),
        license_key: key.to_string(),
        license_key_hash: hash_key(key),
        customer_id: "cust-1".to_string(),
        product_id: "prod-1".to_string(),
        tier: "paid".to_string(),
        status: status.as_str().to_string(),
        max_devices: 3,
        current_devices: 1,
        bound_installation_id: None,
        last_active_at: None,
        expires_at: None,
        grace_period_end: None,
        created_at: now,
        updated_at: now,
    }
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

fn admin_post(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("authorization", format!("Bearer {ADMIN_TOKEN}"))
        .body(Body::empty())
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn verify_endpoint_resolves_to_200_with_status_in_body() {
    let (db, app) = setup_app().await;
    let key = "LIC-ABCD-EFGH-JKMN";
    db.insert_license(fixture_license("lic-1", key, LicenseStatus::Unconfigured))
        .await
        .unwrap();

    let request = post_json(
        "/api/v1/verify",
        &json!({
            "app_license_key": key,
            "user_id": "cust-1",
            "current_device_count": 1,
            "installation_id": "install-a",
        }),
    );

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["status"], "active");
}

#[tokio::test]
async fn unknown_key_is_still_http_200() {
    let (_db, app) = setup_app().await;

    let request = post_json(
        "/api/v1/verify",
        &json!({
            "app_license_key": "LIC-ZZZZ-YYYY-XXXX",
            "user_id": "cust-1",
            "current_device_count": 1,
            "installation_id": "install-a",
        }),
    );

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["status"], "not_found");
}

#[tokio::test]
async fn malformed_body_is_a_client_error() {
    let (_db, app) = setup_app().await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/verify")
        .header("content-type", "application/json")
        .body(Body::from("{\"app_license_key\":"))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn admin_routes_reject_missing_and_bad_tokens() {
    let (_db, app) = setup_app().await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/admin/reconcile")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/admin/reconcile")
        .header("authorization", "Bearer wrong-token")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_reconcile_returns_the_diff_report() {
    let (db, app) = setup_app().await;
    let mut lic = fixture_license("lic-1", "LIC-ABCD-EFGH-JKMN", LicenseStatus::Active);
    lic.bound_installation_id = Some("install-a".to_string());
    lic.expires_at = Some(Utc::now().naive_utc() - Duration::days(1));
    db.insert_license(lic).await.unwrap();

    let response = app
        .oneshot(admin_post("/api/v1/admin/reconcile"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["examined"], 1);
    assert_eq!(body["auto_expired"], 1);
    assert_eq!(body["status_changes"][0]["after"], "expired");
}

#[tokio::test]
async fn revoked_license_denies_subsequent_verification() {
    let (db, app) = setup_app().await;
    let key = "LIC-ABCD-EFGH-JKMN";
    let mut lic = fixture_license("lic-1", key, LicenseStatus::Active);
    lic.bound_installation_id = Some("install-a".to_string());
    db.insert_license(lic).await.unwrap();

    let response = app
        .clone()
        .oneshot(admin_post("/api/v1/admin/licenses/lic-1/revoke"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "revoked");

    let request = post_json(
        "/api/v1/verify",
        &json!({
            "app_license_key": key,
            "user_id": "cust-1",
            "current_device_count": 1,
            "installation_id": "install-a",
        }),
    );
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "revoked");
}

#[tokio::test]
async fn release_allows_a_new_installation_to_bind() {
    let (db, app) = setup_app().await;
    let key = "LIC-ABCD-EFGH-JKMN";
    let mut lic = fixture_license("lic-1", key, LicenseStatus::Active);
    lic.bound_installation_id = Some("install-a".to_string());
    db.insert_license(lic).await.unwrap();

    let response = app
        .clone()
        .oneshot(admin_post("/api/v1/admin/licenses/lic-1/release"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let request = post_json(
        "/api/v1/verify",
        &json!({
            "app_license_key": key,
            "user_id": "cust-1",
            "current_device_count": 1,
            "installation_id": "install-b",
        }),
    );
    let response = app.oneshot(request).await.unwrap();
    let body = json_body(response).await;
    assert_eq!(body["status"], "active");

    let stored = db.get_license("lic-1").await.unwrap().unwrap();
    assert_eq!(stored.bound_installation_id.as_deref(), Some("install-b"));
}

#[tokio::test]
async fn admin_override_on_unknown_license_is_404() {
    let (_db, app) = setup_app().await;

    let response = app
        .oneshot(admin_post("/api/v1/admin/licenses/no-such-id/revoke"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "LICENSE_NOT_FOUND");
}

#[tokio::test]
async fn renew_restores_an_expired_license() {
    let (db, app) = setup_app().await;
    let key = "LIC-ABCD-EFGH-JKMN";
    let mut lic = fixture_license("lic-1", key, LicenseStatus::Expired);
    lic.bound_installation_id = Some("install-a".to_string());
    lic.expires_at = Some(Utc::now().naive_utc() - Duration::days(1));
    db.insert_license(lic).await.unwrap();

    let renew_at = Utc::now().naive_utc() + Duration::days(365);
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/admin/licenses/lic-1/renew")
        .header("authorization", format!("Bearer {ADMIN_TOKEN}"))
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::to_vec(&json!({ "expires_at": renew_at })).unwrap(),
        ))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let stored = db.get_license("lic-1").await.unwrap().unwrap();
    assert_eq!(stored.current_status(), LicenseStatus::Active);
    assert!(stored.expires_at.is_some());
    assert!(!stored.is_expired(Utc::now().naive_utc()));
}

#[tokio::test]
async fn audit_endpoint_returns_log_entries_for_a_key_hash() {
    let (db, app) = setup_app().await;
    let key = "LIC-ABCD-EFGH-JKMN";
    db.insert_license(fixture_license("lic-1", key, LicenseStatus::Unconfigured))
        .await
        .unwrap();

    let request = post_json(
        "/api/v1/verify",
        &json!({
            "app_license_key": key,
            "user_id": "cust-1",
            "current_device_count": 1,
            "installation_id": "install-a",
        }),
    );
    app.clone().oneshot(request).await.unwrap();

    let uri = format!("/api/v1/admin/audit/{}", hash_key(key));
    let request = Request::builder()
        .method("GET")
        .uri(&uri)
        .header("authorization", format!("Bearer {ADMIN_TOKEN}"))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    let entries = body.as_array().expect("array of log entries");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["result"], "allow");
    assert_eq!(entries[0]["license_key_hash"], hash_key(key));
}

#[tokio::test]
async fn health_endpoint_reports_backend() {
    let (_db, app) = setup_app().await;

    let request = Request::builder()
        .method("GET")
        .uri("/api/v1/health")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"]["db_type"], "sqlite");
    assert_eq!(body["database"]["connected"], true);
}

#[tokio::test]
async fn responses_carry_a_request_id_header() {
    let (_db, app) = setup_app().await;

    let request = Request::builder()
        .method("GET")
        .uri("/api/v1/health")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert!(response.headers().contains_key("X-Request-Id"));
}
