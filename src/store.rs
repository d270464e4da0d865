//! License Store and Verification Log access layer.
//!
//! The `licenses` table is the authoritative record of every license and
//! its status. It is mutated only through the engine's verification path
//! and administrative overrides; there is no second write path for
//! `status`. The `verification_log` table is append-only and keyed by a
//! SHA-256 hash of the license key, never the raw key.

use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::{query, query_as, FromRow};
use std::sync::Arc;
use tracing::error;

#[cfg(feature = "sqlite")]
use sqlx::sqlite::SqlitePoolOptions;
#[cfg(feature = "sqlite")]
use sqlx::SqlitePool;

#[cfg(feature = "postgres")]
use sqlx::postgres::PgPoolOptions;
#[cfg(feature = "postgres")]
use sqlx::PgPool;

use crate::config::get_config;
use crate::errors::{EngineError, EngineResult};
use crate::status::{LicenseStatus, LogResult};

/// A license record as stored in the `licenses` table.
#[derive(Debug, Clone, FromRow)]
pub struct License {
    /// Opaque identifier, immutable.
    pub id: String,
    /// Opaque secret; never logged in cleartext.
    pub license_key: String,
    /// SHA-256 of `license_key`, the only form surfaced in logs.
    pub license_key_hash: String,
    pub customer_id: String,
    pub product_id: String,
    /// "free" or "paid"; copied from the product entitlement at issuance.
    pub tier: String,
    pub status: String,
    /// Device ceiling copied at issuance, not referenced live.
    pub max_devices: i64,
    /// Self-reported by the client at verification time. Trusted input:
    /// clients can misreport. Display/advisory only, never billing truth.
    pub current_devices: i64,
    /// Set on first successful bind; cleared only administratively.
    pub bound_installation_id: Option<String>,
    /// Most recent successful client verification for the bound installation.
    pub last_active_at: Option<NaiveDateTime>,
    /// Null means perpetual.
    pub expires_at: Option<NaiveDateTime>,
    /// Set when the license enters `grace_period`.
    pub grace_period_end: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl License {
    /// Parse the stored status text. Unknown text maps to `Disabled` so a
    /// corrupted row fails closed rather than granting access.
    pub fn current_status(&self) -> LicenseStatus {
        LicenseStatus::parse(&self.status).unwrap_or(LicenseStatus::Disabled)
    }

    pub fn is_bound(&self) -> bool {
        self.bound_installation_id.is_some()
    }

    pub fn is_expired(&self, now: NaiveDateTime) -> bool {
        self.expires_at.is_some_and(|at| at < now)
    }

    /// The status a usable license of this tier carries.
    pub fn base_status(&self) -> LicenseStatus {
        if self.tier == "free" {
            LicenseStatus::Free
        } else {
            LicenseStatus::Active
        }
    }
}

/// An append-only verification log entry.
///
/// Nothing on the verification path reads this back; it exists for
/// forensic review (the admin audit endpoint) and abuse detection.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct VerificationLogEntry {
    pub id: i64,
    pub license_key_hash: String,
    /// Caller address, or "system" for scheduled runs.
    pub ip_address: String,
    pub installation_id: Option<String>,
    /// One of: allow, deny, auto_check, error.
    pub result: String,
    pub reason: String,
    pub created_at: NaiveDateTime,
}

/// Unified database abstraction over SQLite and Postgres.
///
/// Available variants depend on enabled features:
/// - `sqlite` feature enables `Database::SQLite`
/// - `postgres` feature enables `Database::Postgres`
#[derive(Debug, Clone)]
pub enum Database {
    #[cfg(feature = "sqlite")]
    SQLite(SqlitePool),
    #[cfg(feature = "postgres")]
    Postgres(PgPool),
}

impl Database {
    /// Initialize the database connection based on configuration.
    pub async fn new() -> EngineResult<Arc<Self>> {
        let config = get_config()?;
        let db_config = &config.database;

        match db_config.db_type.as_str() {
            #[cfg(feature = "sqlite")]
            "sqlite" => {
                Self::open_sqlite(&db_config.sqlite_url, db_config.max_connections).await
            }
            #[cfg(not(feature = "sqlite"))]
            "sqlite" => Err(EngineError::Config(
                "SQLite support not compiled in. Enable the 'sqlite' feature.".to_string(),
            )),
            #[cfg(feature = "postgres")]
            "postgres" => {
                let pool = PgPoolOptions::new()
                    .max_connections(db_config.max_connections)
                    .connect(&db_config.postgres_url)
                    .await
                    .map_err(|e| {
                        error!("Failed to connect to PostgreSQL: {e}");
                        EngineError::Storage(format!("failed to connect to PostgreSQL: {e}"))
                    })?;

                Ok(Arc::new(Database::Postgres(pool)))
            }
            #[cfg(not(feature = "postgres"))]
            "postgres" => Err(EngineError::Config(
                "PostgreSQL support not compiled in. Enable the 'postgres' feature.".to_string(),
            )),
            other => Err(EngineError::Config(format!(
                "unsupported database type: {other}"
            ))),
        }
    }

    /// Open a SQLite database directly.
    ///
    /// Tests use `open_sqlite("sqlite::memory:", 1)`; the single connection
    /// keeps the in-memory database shared across all queries.
    #[cfg(feature = "sqlite")]
    pub async fn open_sqlite(url: &str, max_connections: u32) -> EngineResult<Arc<Self>> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| {
                error!("Failed to connect to SQLite: {e}");
                EngineError::Storage(format!("failed to connect to SQLite: {e}"))
            })?;

        Ok(Arc::new(Database::SQLite(pool)))
    }

    /// Create the `licenses` and `verification_log` tables if absent.
    pub async fn migrate(&self) -> EngineResult<()> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                query(
                    r#"
                    CREATE TABLE IF NOT EXISTS licenses (
                        id TEXT PRIMARY KEY,
                        license_key TEXT NOT NULL UNIQUE,
                        license_key_hash TEXT NOT NULL,
                        customer_id TEXT NOT NULL,
                        product_id TEXT NOT NULL,
                        tier TEXT NOT NULL DEFAULT 'paid',
                        status TEXT NOT NULL DEFAULT 'unconfigured',
                        max_devices INTEGER NOT NULL DEFAULT 1,
                        current_devices INTEGER NOT NULL DEFAULT 0,
                        bound_installation_id TEXT,
                        last_active_at TEXT,
                        expires_at TEXT,
                        grace_period_end TEXT,
                        created_at TEXT NOT NULL,
                        updated_at TEXT NOT NULL
                    )
                    "#,
                )
                .execute(pool)
                .await
                .map_err(|e| EngineError::Storage(format!("migration failed: {e}")))?;

                query(
                    r#"
                    CREATE TABLE IF NOT EXISTS verification_log (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        license_key_hash TEXT NOT NULL,
                        ip_address TEXT NOT NULL,
                        installation_id TEXT,
                        result TEXT NOT NULL,
                        reason TEXT NOT NULL,
                        created_at TEXT NOT NULL
                    )
                    "#,
                )
                .execute(pool)
                .await
                .map_err(|e| EngineError::Storage(format!("migration failed: {e}")))?;
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query(
                    r#"
                    CREATE TABLE IF NOT EXISTS licenses (
                        id TEXT PRIMARY KEY,
                        license_key TEXT NOT NULL UNIQUE,
                        license_key_hash TEXT NOT NULL,
                        customer_id TEXT NOT NULL,
                        product_id TEXT NOT NULL,
                        tier TEXT NOT NULL DEFAULT 'paid',
                        status TEXT NOT NULL DEFAULT 'unconfigured',
                        max_devices BIGINT NOT NULL DEFAULT 1,
                        current_devices BIGINT NOT NULL DEFAULT 0,
                        bound_installation_id TEXT,
                        last_active_at TIMESTAMP,
                        expires_at TIMESTAMP,
                        grace_period_end TIMESTAMP,
                        created_at TIMESTAMP NOT NULL,
                        updated_at TIMESTAMP NOT NULL
                    )
                    "#,
                )
                .execute(pool)
                .await
                .map_err(|e| EngineError::Storage(format!("migration failed: {e}")))?;

                query(
                    r#"
                    CREATE TABLE IF NOT EXISTS verification_log (
                        id BIGSERIAL PRIMARY KEY,
                        license_key_hash TEXT NOT NULL,
                        ip_address TEXT NOT NULL,
                        installation_id TEXT,
                        result TEXT NOT NULL,
                        reason TEXT NOT NULL,
                        created_at TIMESTAMP NOT NULL
                    )
                    "#,
                )
                .execute(pool)
                .await
                .map_err(|e| EngineError::Storage(format!("migration failed: {e}")))?;
            }
        }

        Ok(())
    }

    /// Insert a new license or update an existing one, keyed on `id`.
    ///
    /// License rows are minted by the commerce flow; this upsert is its
    /// entry point (and the test fixture path).
    pub async fn insert_license(&self, license: License) -> EngineResult<()> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                query(
                    r#"
                    INSERT INTO licenses (
                        id, license_key, license_key_hash, customer_id, product_id,
                        tier, status, max_devices, current_devices,
                        bound_installation_id, last_active_at, expires_at,
                        grace_period_end, created_at, updated_at
                    )
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    ON CONFLICT(id) DO UPDATE SET
                        license_key           = excluded.license_key,
                        license_key_hash      = excluded.license_key_hash,
                        customer_id           = excluded.customer_id,
                        product_id            = excluded.product_id,
                        tier                  = excluded.tier,
                        status                = excluded.status,
                        max_devices           = excluded.max_devices,
                        current_devices       = excluded.current_devices,
                        bound_installation_id = excluded.bound_installation_id,
                        last_active_at        = excluded.last_active_at,
                        expires_at            = excluded.expires_at,
                        grace_period_end      = excluded.grace_period_end,
                        updated_at            = excluded.updated_at
                    "#,
                )
                .bind(&license.id)
                .bind(&license.license_key)
                .bind(&license.license_key_hash)
                .bind(&license.customer_id)
                .bind(&license.product_id)
                .bind(&license.tier)
                .bind(&license.status)
                .bind(license.max_devices)
                .bind(license.current_devices)
                .bind(&license.bound_installation_id)
                .bind(license.last_active_at)
                .bind(license.expires_at)
                .bind(license.grace_period_end)
                .bind(license.created_at)
                .bind(license.updated_at)
                .execute(pool)
                .await
                .map_err(|e| {
                    error!("SQLite insert_license failed: {e}");
                    EngineError::Storage(format!("database error: {e}"))
                })?;
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query(
                    r#"
                    INSERT INTO licenses (
                        id, license_key, license_key_hash, customer_id, product_id,
                        tier, status, max_devices, current_devices,
                        bound_installation_id, last_active_at, expires_at,
                        grace_period_end, created_at, updated_at
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
                    ON CONFLICT (id) DO UPDATE SET
                        license_key           = EXCLUDED.license_key,
                        license_key_hash      = EXCLUDED.license_key_hash,
                        customer_id           = EXCLUDED.customer_id,
                        product_id            = EXCLUDED.product_id,
                        tier                  = EXCLUDED.tier,
                        status                = EXCLUDED.status,
                        max_devices           = EXCLUDED.max_devices,
                        current_devices       = EXCLUDED.current_devices,
                        bound_installation_id = EXCLUDED.bound_installation_id,
                        last_active_at        = EXCLUDED.last_active_at,
                        expires_at            = EXCLUDED.expires_at,
                        grace_period_end      = EXCLUDED.grace_period_end,
                        updated_at            = EXCLUDED.updated_at
                    "#,
                )
                .bind(&license.id)
                .bind(&license.license_key)
                .bind(&license.license_key_hash)
                .bind(&license.customer_id)
                .bind(&license.product_id)
                .bind(&license.tier)
                .bind(&license.status)
                .bind(license.max_devices)
                .bind(license.current_devices)
                .bind(&license.bound_installation_id)
                .bind(license.last_active_at)
                .bind(license.expires_at)
                .bind(license.grace_period_end)
                .bind(license.created_at)
                .bind(license.updated_at)
                .execute(pool)
                .await
                .map_err(|e| {
                    error!("Postgres insert_license failed: {e}");
                    EngineError::Storage(format!("database error: {e}"))
                })?;
            }
        }

        Ok(())
    }

    /// Fetch a license by its ID.
    pub async fn get_license(&self, id: &str) -> EngineResult<Option<License>> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                let license = query_as::<_, License>("SELECT * FROM licenses WHERE id = ?")
                    .bind(id)
                    .fetch_optional(pool)
                    .await
                    .map_err(|e| {
                        error!("SQLite get_license failed: {e}");
                        EngineError::Storage(format!("database error: {e}"))
                    })?;

                Ok(license)
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                let license = query_as::<_, License>("SELECT * FROM licenses WHERE id = $1")
                    .bind(id)
                    .fetch_optional(pool)
                    .await
                    .map_err(|e| {
                        error!("Postgres get_license failed: {e}");
                        EngineError::Storage(format!("database error: {e}"))
                    })?;

                Ok(license)
            }
        }
    }

    /// Resolve a raw license key to its row.
    pub async fn get_license_by_key(&self, license_key: &str) -> EngineResult<Option<License>> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                let license =
                    query_as::<_, License>("SELECT * FROM licenses WHERE license_key = ?")
                        .bind(license_key)
                        .fetch_optional(pool)
                        .await
                        .map_err(|e| {
                            error!("SQLite get_license_by_key failed: {e}");
                            EngineError::Storage(format!("database error: {e}"))
                        })?;

                Ok(license)
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                let license =
                    query_as::<_, License>("SELECT * FROM licenses WHERE license_key = $1")
                        .bind(license_key)
                        .fetch_optional(pool)
                        .await
                        .map_err(|e| {
                            error!("Postgres get_license_by_key failed: {e}");
                            EngineError::Storage(format!("database error: {e}"))
                        })?;

                Ok(license)
            }
        }
    }

    /// Bind an installation to a license, but only if no installation is
    /// currently bound.
    ///
    /// This is the one genuine concurrency hazard in the system: two
    /// simultaneous first activations must not both succeed. The
    /// `bound_installation_id IS NULL` guard makes the check-and-set a
    /// single conditional write in the store, so it holds across multiple
    /// engine instances where an in-process mutex would not.
    ///
    /// Returns `true` if this call won the binding.
    pub async fn try_bind(
        &self,
        id: &str,
        installation_id: &str,
        status: LicenseStatus,
        now: NaiveDateTime,
    ) -> EngineResult<bool> {
        let rows_affected = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query(
                "UPDATE licenses \
                     SET bound_installation_id = ?, status = ?, last_active_at = ?, updated_at = ? \
                     WHERE id = ? AND bound_installation_id IS NULL",
            )
            .bind(installation_id)
            .bind(status.as_str())
            .bind(now)
            .bind(now)
            .bind(id)
            .execute(pool)
            .await
            .map_err(|e| {
                error!("SQLite try_bind failed: {e}");
                EngineError::Storage(format!("database error: {e}"))
            })?
            .rows_affected(),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query(
                "UPDATE licenses \
                     SET bound_installation_id = $1, status = $2, last_active_at = $3, updated_at = $4 \
                     WHERE id = $5 AND bound_installation_id IS NULL",
            )
            .bind(installation_id)
            .bind(status.as_str())
            .bind(now)
            .bind(now)
            .bind(id)
            .execute(pool)
            .await
            .map_err(|e| {
                error!("Postgres try_bind failed: {e}");
                EngineError::Storage(format!("database error: {e}"))
            })?
            .rows_affected(),
        };

        Ok(rows_affected > 0)
    }

    /// Record a successful client heartbeat for the bound installation.
    ///
    /// Advances `last_active_at`, stores the self-reported device count,
    /// writes the (possibly restored) status, and clears any grace window.
    /// Guarded on the installation so a stale caller cannot touch a row
    /// that was rebound underneath it.
    pub async fn record_heartbeat(
        &self,
        id: &str,
        installation_id: &str,
        device_count: i64,
        status: LicenseStatus,
        now: NaiveDateTime,
    ) -> EngineResult<bool> {
        let rows_affected = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query(
                "UPDATE licenses \
                     SET last_active_at = ?, current_devices = ?, status = ?, \
                         grace_period_end = NULL, updated_at = ? \
                     WHERE id = ? AND bound_installation_id = ?",
            )
            .bind(now)
            .bind(device_count)
            .bind(status.as_str())
            .bind(now)
            .bind(id)
            .bind(installation_id)
            .execute(pool)
            .await
            .map_err(|e| {
                error!("SQLite record_heartbeat failed: {e}");
                EngineError::Storage(format!("database error: {e}"))
            })?
            .rows_affected(),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query(
                "UPDATE licenses \
                     SET last_active_at = $1, current_devices = $2, status = $3, \
                         grace_period_end = NULL, updated_at = $4 \
                     WHERE id = $5 AND bound_installation_id = $6",
            )
            .bind(now)
            .bind(device_count)
            .bind(status.as_str())
            .bind(now)
            .bind(id)
            .bind(installation_id)
            .execute(pool)
            .await
            .map_err(|e| {
                error!("Postgres record_heartbeat failed: {e}");
                EngineError::Storage(format!("database error: {e}"))
            })?
            .rows_affected(),
        };

        Ok(rows_affected > 0)
    }

    /// Restore a license's status without touching `last_active_at`.
    ///
    /// Used by system replays: the batch pass must not refresh the
    /// activity timestamp, or it would erase the inactivity signal it is
    /// computing. Clears any grace window.
    pub async fn restore_status(
        &self,
        id: &str,
        status: LicenseStatus,
        now: NaiveDateTime,
    ) -> EngineResult<bool> {
        let rows_affected = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query(
                "UPDATE licenses \
                     SET status = ?, grace_period_end = NULL, updated_at = ? \
                     WHERE id = ?",
            )
            .bind(status.as_str())
            .bind(now)
            .bind(id)
            .execute(pool)
            .await
            .map_err(|e| {
                error!("SQLite restore_status failed: {e}");
                EngineError::Storage(format!("database error: {e}"))
            })?
            .rows_affected(),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query(
                "UPDATE licenses \
                     SET status = $1, grace_period_end = NULL, updated_at = $2 \
                     WHERE id = $3",
            )
            .bind(status.as_str())
            .bind(now)
            .bind(id)
            .execute(pool)
            .await
            .map_err(|e| {
                error!("Postgres restore_status failed: {e}");
                EngineError::Storage(format!("database error: {e}"))
            })?
            .rows_affected(),
        };

        Ok(rows_affected > 0)
    }

    /// Transition a license to `expired`.
    ///
    /// Conditional on not already being expired so a repeated pass (or a
    /// concurrent verification) records the transition exactly once.
    pub async fn mark_expired(&self, id: &str, now: NaiveDateTime) -> EngineResult<bool> {
        let rows_affected = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query(
                "UPDATE licenses \
                     SET status = 'expired', updated_at = ? \
                     WHERE id = ? AND status != 'expired'",
            )
            .bind(now)
            .bind(id)
            .execute(pool)
            .await
            .map_err(|e| {
                error!("SQLite mark_expired failed: {e}");
                EngineError::Storage(format!("database error: {e}"))
            })?
            .rows_affected(),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query(
                "UPDATE licenses \
                     SET status = 'expired', updated_at = $1 \
                     WHERE id = $2 AND status != 'expired'",
            )
            .bind(now)
            .bind(id)
            .execute(pool)
            .await
            .map_err(|e| {
                error!("Postgres mark_expired failed: {e}");
                EngineError::Storage(format!("database error: {e}"))
            })?
            .rows_affected(),
        };

        Ok(rows_affected > 0)
    }

    /// Administrative status override (revoke, disable, reinstate).
    pub async fn set_status(
        &self,
        id: &str,
        status: LicenseStatus,
        now: NaiveDateTime,
    ) -> EngineResult<bool> {
        let rows_affected = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                query("UPDATE licenses SET status = ?, updated_at = ? WHERE id = ?")
                    .bind(status.as_str())
                    .bind(now)
                    .bind(id)
                    .execute(pool)
                    .await
                    .map_err(|e| {
                        error!("SQLite set_status failed: {e}");
                        EngineError::Storage(format!("database error: {e}"))
                    })?
                    .rows_affected()
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query("UPDATE licenses SET status = $1, updated_at = $2 WHERE id = $3")
                    .bind(status.as_str())
                    .bind(now)
                    .bind(id)
                    .execute(pool)
                    .await
                    .map_err(|e| {
                        error!("Postgres set_status failed: {e}");
                        EngineError::Storage(format!("database error: {e}"))
                    })?
                    .rows_affected()
            }
        };

        Ok(rows_affected > 0)
    }

    /// Administrative release: clear the installation binding so the key
    /// can be bound again. Rebinding is never a side effect of `Verify`.
    pub async fn clear_binding(&self, id: &str, now: NaiveDateTime) -> EngineResult<bool> {
        let rows_affected = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query(
                "UPDATE licenses \
                     SET bound_installation_id = NULL, current_devices = 0, updated_at = ? \
                     WHERE id = ? AND bound_installation_id IS NOT NULL",
            )
            .bind(now)
            .bind(id)
            .execute(pool)
            .await
            .map_err(|e| {
                error!("SQLite clear_binding failed: {e}");
                EngineError::Storage(format!("database error: {e}"))
            })?
            .rows_affected(),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query(
                "UPDATE licenses \
                     SET bound_installation_id = NULL, current_devices = 0, updated_at = $1 \
                     WHERE id = $2 AND bound_installation_id IS NOT NULL",
            )
            .bind(now)
            .bind(id)
            .execute(pool)
            .await
            .map_err(|e| {
                error!("Postgres clear_binding failed: {e}");
                EngineError::Storage(format!("database error: {e}"))
            })?
            .rows_affected(),
        };

        Ok(rows_affected > 0)
    }

    /// Place a license into its grace window (administrative suspend).
    pub async fn enter_grace(
        &self,
        id: &str,
        grace_period_end: NaiveDateTime,
        now: NaiveDateTime,
    ) -> EngineResult<bool> {
        let rows_affected = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query(
                "UPDATE licenses \
                     SET status = 'grace_period', grace_period_end = ?, updated_at = ? \
                     WHERE id = ?",
            )
            .bind(grace_period_end)
            .bind(now)
            .bind(id)
            .execute(pool)
            .await
            .map_err(|e| {
                error!("SQLite enter_grace failed: {e}");
                EngineError::Storage(format!("database error: {e}"))
            })?
            .rows_affected(),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query(
                "UPDATE licenses \
                     SET status = 'grace_period', grace_period_end = $1, updated_at = $2 \
                     WHERE id = $3",
            )
            .bind(grace_period_end)
            .bind(now)
            .bind(id)
            .execute(pool)
            .await
            .map_err(|e| {
                error!("Postgres enter_grace failed: {e}");
                EngineError::Storage(format!("database error: {e}"))
            })?
            .rows_affected(),
        };

        Ok(rows_affected > 0)
    }

    /// Licenses the reconciliation pass examines: anything bound, plus
    /// anything that can expire.
    pub async fn licenses_for_pass(&self) -> EngineResult<Vec<License>> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                let licenses = query_as::<_, License>(
                    "SELECT * FROM licenses \
                         WHERE bound_installation_id IS NOT NULL OR expires_at IS NOT NULL \
                         ORDER BY id",
                )
                .fetch_all(pool)
                .await
                .map_err(|e| {
                    error!("SQLite licenses_for_pass failed: {e}");
                    EngineError::Storage(format!("database error: {e}"))
                })?;

                Ok(licenses)
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                let licenses = query_as::<_, License>(
                    "SELECT * FROM licenses \
                         WHERE bound_installation_id IS NOT NULL OR expires_at IS NOT NULL \
                         ORDER BY id",
                )
                .fetch_all(pool)
                .await
                .map_err(|e| {
                    error!("Postgres licenses_for_pass failed: {e}");
                    EngineError::Storage(format!("database error: {e}"))
                })?;

                Ok(licenses)
            }
        }
    }

    /// Append one verification log entry.
    ///
    /// Callers are expected to swallow a failure here: the log must never
    /// block or fail the primary transition.
    pub async fn append_log(
        &self,
        license_key_hash: &str,
        ip_address: &str,
        installation_id: Option<&str>,
        result: LogResult,
        reason: &str,
        now: NaiveDateTime,
    ) -> EngineResult<()> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                query(
                    "INSERT INTO verification_log \
                         (license_key_hash, ip_address, installation_id, result, reason, created_at) \
                         VALUES (?, ?, ?, ?, ?, ?)",
                )
                .bind(license_key_hash)
                .bind(ip_address)
                .bind(installation_id)
                .bind(result.as_str())
                .bind(reason)
                .bind(now)
                .execute(pool)
                .await
                .map_err(|e| {
                    error!("SQLite append_log failed: {e}");
                    EngineError::Storage(format!("database error: {e}"))
                })?;
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query(
                    "INSERT INTO verification_log \
                         (license_key_hash, ip_address, installation_id, result, reason, created_at) \
                         VALUES ($1, $2, $3, $4, $5, $6)",
                )
                .bind(license_key_hash)
                .bind(ip_address)
                .bind(installation_id)
                .bind(result.as_str())
                .bind(reason)
                .bind(now)
                .execute(pool)
                .await
                .map_err(|e| {
                    error!("Postgres append_log failed: {e}");
                    EngineError::Storage(format!("database error: {e}"))
                })?;
            }
        }

        Ok(())
    }

    /// Log entries for one key hash, newest first. Forensic review only.
    pub async fn log_entries_for(
        &self,
        license_key_hash: &str,
    ) -> EngineResult<Vec<VerificationLogEntry>> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                let entries = query_as::<_, VerificationLogEntry>(
                    "SELECT * FROM verification_log \
                         WHERE license_key_hash = ? ORDER BY id DESC",
                )
                .bind(license_key_hash)
                .fetch_all(pool)
                .await
                .map_err(|e| {
                    error!("SQLite log_entries_for failed: {e}");
                    EngineError::Storage(format!("database error: {e}"))
                })?;

                Ok(entries)
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                let entries = query_as::<_, VerificationLogEntry>(
                    "SELECT * FROM verification_log \
                         WHERE license_key_hash = $1 ORDER BY id DESC",
                )
                .bind(license_key_hash)
                .fetch_all(pool)
                .await
                .map_err(|e| {
                    error!("Postgres log_entries_for failed: {e}");
                    EngineError::Storage(format!("database error: {e}"))
                })?;

                Ok(entries)
            }
        }
    }

    /// Cheap connectivity probe for the health endpoint.
    pub async fn ping(&self) -> bool {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query("SELECT 1").execute(pool).await.is_ok(),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query("SELECT 1").execute(pool).await.is_ok(),
        }
    }

    /// Human-readable backend name for the health endpoint.
    pub fn backend_name(&self) -> &'static str {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(_) => "sqlite",
            #[cfg(feature = "postgres")]
            Database::Postgres(_) => "postgres",
        }
    }
}
