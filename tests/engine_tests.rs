use std::sync::Arc;

use chrono::{Duration, Utc};

use keyward::engine::{
    EngineSettings, LifecycleEngine, VerifyContext, VerifyRequest,
};
use keyward::license_key::hash_key;
use keyward::status::{LicenseStatus, VerifyStatus};
use keyward::store::{Database, License};

/// Helper: in-memory SQLite store plus an engine over it.
///
/// A single connection keeps every query on the same in-memory database.
async fn setup() -> (Arc<Database>, Arc<LifecycleEngine>) {
    let db = Database::open_sqlite("sqlite::memory:", 1)
        .await
        .expect("in-memory db");
    db.migrate().await.expect("migrate");

    let engine = Arc::new(LifecycleEngine::new(
        Arc::clone(&db),
        EngineSettings::default(),
    ));
    (db, engine)
}

/// Helper: a minimal license row.
fn license(id: &str, key: &str, tier: &str, status: LicenseStatus) -> License {
    let now = Utc::now().naive_utc();
    License {
        id: id.to_string(),
        license_key: key.to_string(),
        license_key_hash: hash_key(key),
        customer_id: "cust-1".to_string(),
        product_id: "prod-1".to_string(),
        tier: tier.to_string(),
        status: status.as_str().to_string(),
        max_devices: 3,
        current_devices: 0,
        bound_installation_id: None,
        last_active_at: None,
        expires_at: None,
        grace_period_end: None,
        created_at: now,
        updated_at: now,
    }
}

fn request(key: &str, installation: &str) -> VerifyRequest {
    VerifyRequest {
        license_key: key.to_string(),
        customer_id: "cust-1".to_string(),
        installation_id: installation.to_string(),
        reported_device_count: 1,
    }
}

#[tokio::test]
async fn first_bind_assigns_paid_tier_status() {
    let (db, engine) = setup().await;
    let key = "LIC-ABCD-EFGH-JKMN";
    db.insert_license(license("lic-1", key, "paid", LicenseStatus::Unconfigured))
        .await
        .unwrap();

    let outcome = engine
        .verify(&request(key, "install-a"), &VerifyContext::client("1.2.3.4"))
        .await;

    assert_eq!(outcome.status, VerifyStatus::Active);

    let stored = db.get_license("lic-1").await.unwrap().unwrap();
    assert_eq!(stored.current_status(), LicenseStatus::Active);
    assert_eq!(stored.bound_installation_id.as_deref(), Some("install-a"));
    assert!(stored.last_active_at.is_some());
}

#[tokio::test]
async fn first_bind_assigns_free_tier_status() {
    let (db, engine) = setup().await;
    let key = "LIC-FREE-AAAA-BBBB";
    db.insert_license(license("lic-free", key, "free", LicenseStatus::Unconfigured))
        .await
        .unwrap();

    let outcome = engine
        .verify(&request(key, "install-a"), &VerifyContext::client("1.2.3.4"))
        .await;

    assert_eq!(outcome.status, VerifyStatus::Free);
}

#[tokio::test]
async fn second_installation_is_denied_and_binding_unchanged() {
    let (db, engine) = setup().await;
    let key = "LIC-ABCD-EFGH-JKMN";
    db.insert_license(license("lic-1", key, "paid", LicenseStatus::Unconfigured))
        .await
        .unwrap();

    let ctx = VerifyContext::client("1.2.3.4");
    engine.verify(&request(key, "install-a"), &ctx).await;
    let outcome = engine.verify(&request(key, "install-b"), &ctx).await;

    assert_eq!(outcome.status, VerifyStatus::InUse);

    let stored = db.get_license("lic-1").await.unwrap().unwrap();
    assert_eq!(stored.bound_installation_id.as_deref(), Some("install-a"));
    assert_eq!(stored.current_status(), LicenseStatus::Active);
}

#[tokio::test]
async fn heartbeat_is_idempotent_and_advances_last_active_at() {
    let (db, engine) = setup().await;
    let key = "LIC-ABCD-EFGH-JKMN";
    db.insert_license(license("lic-1", key, "paid", LicenseStatus::Unconfigured))
        .await
        .unwrap();

    let ctx = VerifyContext::client("1.2.3.4");
    engine.verify(&request(key, "install-a"), &ctx).await;
    let first = db.get_license("lic-1").await.unwrap().unwrap();

    let outcome = engine.verify(&request(key, "install-a"), &ctx).await;
    assert_eq!(outcome.status, VerifyStatus::Active);

    let second = db.get_license("lic-1").await.unwrap().unwrap();
    assert_eq!(second.current_status(), LicenseStatus::Active);
    assert_eq!(second.bound_installation_id, first.bound_installation_id);
    assert!(second.last_active_at >= first.last_active_at);
}

#[tokio::test]
async fn administrative_states_are_never_overridden() {
    let (db, engine) = setup().await;
    let revoked_key = "LIC-REVK-AAAA-BBBB";
    let disabled_key = "LIC-DISA-AAAA-BBBB";

    let mut revoked = license("lic-r", revoked_key, "paid", LicenseStatus::Revoked);
    revoked.bound_installation_id = Some("install-a".to_string());
    db.insert_license(revoked).await.unwrap();

    let mut disabled = license("lic-d", disabled_key, "paid", LicenseStatus::Disabled);
    disabled.bound_installation_id = Some("install-a".to_string());
    db.insert_license(disabled).await.unwrap();

    let ctx = VerifyContext::client("1.2.3.4");

    let outcome = engine.verify(&request(revoked_key, "install-a"), &ctx).await;
    assert_eq!(outcome.status, VerifyStatus::Revoked);
    let stored = db.get_license("lic-r").await.unwrap().unwrap();
    assert_eq!(stored.current_status(), LicenseStatus::Revoked);

    let outcome = engine
        .verify(&request(disabled_key, "install-a"), &ctx)
        .await;
    assert_eq!(outcome.status, VerifyStatus::Disabled);
    let stored = db.get_license("lic-d").await.unwrap().unwrap();
    assert_eq!(stored.current_status(), LicenseStatus::Disabled);
}

#[tokio::test]
async fn overdue_expiry_is_applied_during_verify() {
    let (db, engine) = setup().await;
    let key = "LIC-ABCD-EFGH-JKMN";
    let mut lic = license("lic-1", key, "paid", LicenseStatus::Active);
    lic.bound_installation_id = Some("install-a".to_string());
    lic.expires_at = Some(Utc::now().naive_utc() - Duration::days(1));
    db.insert_license(lic).await.unwrap();

    let outcome = engine
        .verify(&request(key, "install-a"), &VerifyContext::client("1.2.3.4"))
        .await;

    assert_eq!(outcome.status, VerifyStatus::Expired);
    let stored = db.get_license("lic-1").await.unwrap().unwrap();
    assert_eq!(stored.current_status(), LicenseStatus::Expired);
}

#[tokio::test]
async fn unknown_key_resolves_to_not_found() {
    let (_db, engine) = setup().await;

    let outcome = engine
        .verify(
            &request("LIC-ZZZZ-YYYY-XXXX", "install-a"),
            &VerifyContext::client("1.2.3.4"),
        )
        .await;

    assert_eq!(outcome.status, VerifyStatus::NotFound);
}

#[tokio::test]
async fn malformed_requests_resolve_to_invalid() {
    let (db, engine) = setup().await;
    let key = "LIC-ABCD-EFGH-JKMN";
    db.insert_license(license("lic-1", key, "paid", LicenseStatus::Unconfigured))
        .await
        .unwrap();

    let ctx = VerifyContext::client("1.2.3.4");

    // Empty installation id.
    let outcome = engine.verify(&request(key, "  "), &ctx).await;
    assert_eq!(outcome.status, VerifyStatus::Invalid);

    // Key that does not parse.
    let outcome = engine.verify(&request("not a key", "install-a"), &ctx).await;
    assert_eq!(outcome.status, VerifyStatus::Invalid);

    // Neither attempt touched the row.
    let stored = db.get_license("lic-1").await.unwrap().unwrap();
    assert_eq!(stored.current_status(), LicenseStatus::Unconfigured);
    assert!(stored.bound_installation_id.is_none());
}

#[tokio::test]
async fn device_overflow_is_advisory_not_blocking() {
    let (db, engine) = setup().await;
    let key = "LIC-ABCD-EFGH-JKMN";
    db.insert_license(license("lic-1", key, "paid", LicenseStatus::Unconfigured))
        .await
        .unwrap();

    let mut req = request(key, "install-a");
    req.reported_device_count = 10;

    let outcome = engine
        .verify(&req, &VerifyContext::client("1.2.3.4"))
        .await;

    assert_eq!(outcome.status, VerifyStatus::Active);
    assert!(outcome.reason.contains("exceeds limit"));
}

#[tokio::test]
async fn grace_period_restores_on_successful_heartbeat() {
    let (db, engine) = setup().await;
    let key = "LIC-ABCD-EFGH-JKMN";
    let mut lic = license("lic-1", key, "paid", LicenseStatus::GracePeriod);
    lic.bound_installation_id = Some("install-a".to_string());
    lic.grace_period_end = Some(Utc::now().naive_utc() + Duration::days(7));
    db.insert_license(lic).await.unwrap();

    let outcome = engine
        .verify(&request(key, "install-a"), &VerifyContext::client("1.2.3.4"))
        .await;

    assert_eq!(outcome.status, VerifyStatus::Active);
    let stored = db.get_license("lic-1").await.unwrap().unwrap();
    assert_eq!(stored.current_status(), LicenseStatus::Active);
    assert!(stored.grace_period_end.is_none());
}

#[tokio::test]
async fn elapsed_grace_period_hardens_into_expiry() {
    let (db, engine) = setup().await;
    let key = "LIC-ABCD-EFGH-JKMN";
    let mut lic = license("lic-1", key, "paid", LicenseStatus::GracePeriod);
    lic.bound_installation_id = Some("install-a".to_string());
    lic.grace_period_end = Some(Utc::now().naive_utc() - Duration::days(1));
    db.insert_license(lic).await.unwrap();

    let outcome = engine
        .verify(&request(key, "install-a"), &VerifyContext::client("1.2.3.4"))
        .await;

    assert_eq!(outcome.status, VerifyStatus::Expired);
    let stored = db.get_license("lic-1").await.unwrap().unwrap();
    assert_eq!(stored.current_status(), LicenseStatus::Expired);
}

#[tokio::test]
async fn every_verify_call_writes_exactly_one_log_entry() {
    let (db, engine) = setup().await;
    let key = "LIC-ABCD-EFGH-JKMN";
    db.insert_license(license("lic-1", key, "paid", LicenseStatus::Unconfigured))
        .await
        .unwrap();

    let ctx = VerifyContext::client("1.2.3.4");
    engine.verify(&request(key, "install-a"), &ctx).await; // allow (bind)
    engine.verify(&request(key, "install-a"), &ctx).await; // allow (heartbeat)
    engine.verify(&request(key, "install-b"), &ctx).await; // deny (in_use)
    engine.verify(&request(key, ""), &ctx).await; // deny (invalid)

    let entries = db.log_entries_for(&hash_key(key)).await.unwrap();
    assert_eq!(entries.len(), 4);
    assert_eq!(engine.log_write_failures(), 0);

    // Newest first; raw key never appears in any entry.
    assert!(entries[0].created_at >= entries[3].created_at);
    for entry in &entries {
        assert!(!entry.reason.contains(key));
        assert_eq!(entry.license_key_hash, hash_key(key));
    }
}

#[tokio::test]
async fn storage_failure_resolves_to_error_and_is_counted() {
    let (db, engine) = setup().await;
    let key = "LIC-ABCD-EFGH-JKMN";
    db.insert_license(license("lic-1", key, "paid", LicenseStatus::Unconfigured))
        .await
        .unwrap();

    // Take the backend away mid-flight.
    #[allow(irrefutable_let_patterns)]
    if let Database::SQLite(pool) = &*db {
        pool.close().await;
    }

    let outcome = engine
        .verify(&request(key, "install-a"), &VerifyContext::client("1.2.3.4"))
        .await;

    assert_eq!(outcome.status, VerifyStatus::Error);
    // The log write fails too; it is swallowed and counted, not propagated.
    assert_eq!(engine.log_write_failures(), 1);
}

#[tokio::test]
async fn concurrent_first_binds_admit_exactly_one_installation() {
    let (db, engine) = setup().await;
    let key = "LIC-ABCD-EFGH-JKMN";
    db.insert_license(license("lic-1", key, "paid", LicenseStatus::Unconfigured))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..5 {
        let engine = Arc::clone(&engine);
        let key = key.to_string();
        handles.push(tokio::spawn(async move {
            let req = VerifyRequest {
                license_key: key,
                customer_id: "cust-1".to_string(),
                installation_id: format!("install-{i}"),
                reported_device_count: 1,
            };
            engine.verify(&req, &VerifyContext::client("1.2.3.4")).await
        }));
    }

    let mut allowed = 0;
    let mut denied = 0;
    for handle in handles {
        match handle.await.unwrap().status {
            VerifyStatus::Active => allowed += 1,
            VerifyStatus::InUse => denied += 1,
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    assert_eq!(allowed, 1);
    assert_eq!(denied, 4);

    let stored = db.get_license("lic-1").await.unwrap().unwrap();
    assert!(stored.bound_installation_id.is_some());
}
