//! Configuration for the keyward server.
//!
//! Configuration is loaded from multiple sources with the following precedence:
//! 1. Environment variables (highest priority)
//! 2. `config.toml` file
//! 3. Default values (lowest priority)
//!
//! # Environment Variables
//!
//! - `KEYWARD_SERVER_HOST` - Server bind address
//! - `KEYWARD_SERVER_PORT` - Server port
//! - `KEYWARD_DATABASE_TYPE` - "sqlite" or "postgres"
//! - `KEYWARD_DATABASE_URL` - Database connection URL
//! - `KEYWARD_DATABASE_MAX_CONNECTIONS` - Connection pool size
//! - `KEYWARD_LICENSE_KEY_PREFIX` - License key prefix
//! - `KEYWARD_INACTIVITY_THRESHOLD_DAYS` - Days before a bound license is flagged inactive
//! - `KEYWARD_GRACE_PERIOD_DAYS` - Grace window length for suspended licenses
//! - `KEYWARD_JOBS_ENABLED` - Enable the scheduled auto-check job
//! - `KEYWARD_AUTO_CHECK_CRON` - Cron expression for the auto-check job
//! - `KEYWARD_LOG_LEVEL` - Log level (trace, debug, info, warn, error)
//! - `KEYWARD_ADMIN_TOKEN` - Bearer token for the admin API

use config::Config;
use serde::Deserialize;
use std::env;
use std::sync::OnceLock;

use crate::errors::{EngineError, EngineResult};

/// Global configuration singleton.
static CONFIG: OnceLock<KeywardConfig> = OnceLock::new();

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct KeywardConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// License key configuration
    pub license: LicenseConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Engine policy knobs
    pub engine: EngineConfig,
    /// Scheduled job configuration
    pub jobs: JobsConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Admin API configuration
    pub admin: AdminConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// License key generation configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LicenseConfig {
    /// Prefix for generated license keys (e.g., "LIC" -> "LIC-XXXX-XXXX-XXXX")
    pub key_prefix: String,
    /// Number of segments in the license key
    pub key_segments: u8,
    /// Characters per segment
    pub key_segment_length: u8,
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self {
            key_prefix: "LIC".to_string(),
            key_segments: 4,
            key_segment_length: 4,
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database type: "sqlite" or "postgres"
    pub db_type: String,
    /// SQLite connection URL
    pub sqlite_url: String,
    /// PostgreSQL connection URL
    pub postgres_url: String,
    /// Connection pool size
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_type: "sqlite".to_string(),
            sqlite_url: "sqlite://keyward.db".to_string(),
            postgres_url: "postgres://localhost/keyward".to_string(),
            max_connections: 5,
        }
    }
}

/// Policy knobs for the lifecycle engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Days without a heartbeat before a bound license is flagged inactive
    pub inactivity_threshold_days: i64,
    /// Grace window length, in days, applied by the admin suspend action
    pub grace_period_days: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            inactivity_threshold_days: 30,
            grace_period_days: 14,
        }
    }
}

/// Scheduled job configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Whether the in-process scheduler runs the auto-check job
    pub enabled: bool,
    /// Cron expression for the auto-check pass (default: monthly, 03:00 on the 1st)
    pub auto_check_cron: String,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_check_cron: "0 0 3 1 * *".to_string(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Bearer token required by admin endpoints. Empty disables the admin API.
    pub api_token: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            api_token: String::new(),
        }
    }
}

impl KeywardConfig {
    /// Load configuration from file and environment.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. `config.toml` file (optional)
    /// 3. Environment variables
    fn load() -> EngineResult<Self> {
        let builder = Config::builder()
            // Load from config.toml (optional)
            .add_source(config::File::with_name("config").required(false))
            // Override with environment variables
            .set_override_option("server.host", env::var("KEYWARD_SERVER_HOST").ok())
            .map_err(|e| EngineError::Config(e.to_string()))?
            .set_override_option(
                "server.port",
                env::var("KEYWARD_SERVER_PORT")
                    .ok()
                    .and_then(|v| v.parse::<i64>().ok()),
            )
            .map_err(|e| EngineError::Config(e.to_string()))?
            .set_override_option(
                "license.key_prefix",
                env::var("KEYWARD_LICENSE_KEY_PREFIX").ok(),
            )
            .map_err(|e| EngineError::Config(e.to_string()))?
            .set_override_option("database.db_type", env::var("KEYWARD_DATABASE_TYPE").ok())
            .map_err(|e| EngineError::Config(e.to_string()))?
            .set_override_option(
                "database.sqlite_url",
                env::var("KEYWARD_DATABASE_URL")
                    .ok()
                    .filter(|url| url.starts_with("sqlite")),
            )
            .map_err(|e| EngineError::Config(e.to_string()))?
            .set_override_option(
                "database.postgres_url",
                env::var("KEYWARD_DATABASE_URL")
                    .ok()
                    .filter(|url| url.starts_with("postgres")),
            )
            .map_err(|e| EngineError::Config(e.to_string()))?
            .set_override_option(
                "database.max_connections",
                env::var("KEYWARD_DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|v| v.parse::<i64>().ok()),
            )
            .map_err(|e| EngineError::Config(e.to_string()))?
            .set_override_option(
                "engine.inactivity_threshold_days",
                env::var("KEYWARD_INACTIVITY_THRESHOLD_DAYS")
                    .ok()
                    .and_then(|v| v.parse::<i64>().ok()),
            )
            .map_err(|e| EngineError::Config(e.to_string()))?
            .set_override_option(
                "engine.grace_period_days",
                env::var("KEYWARD_GRACE_PERIOD_DAYS")
                    .ok()
                    .and_then(|v| v.parse::<i64>().ok()),
            )
            .map_err(|e| EngineError::Config(e.to_string()))?
            .set_override_option(
                "jobs.enabled",
                env::var("KEYWARD_JOBS_ENABLED")
                    .ok()
                    .and_then(|v| v.parse::<bool>().ok()),
            )
            .map_err(|e| EngineError::Config(e.to_string()))?
            .set_override_option("jobs.auto_check_cron", env::var("KEYWARD_AUTO_CHECK_CRON").ok())
            .map_err(|e| EngineError::Config(e.to_string()))?
            .set_override_option("logging.level", env::var("KEYWARD_LOG_LEVEL").ok())
            .map_err(|e| EngineError::Config(e.to_string()))?
            .set_override_option("admin.api_token", env::var("KEYWARD_ADMIN_TOKEN").ok())
            .map_err(|e| EngineError::Config(e.to_string()))?;

        let settings = builder
            .build()
            .map_err(|e| EngineError::Config(format!("failed to build config: {e}")))?;

        settings
            .try_deserialize()
            .map_err(|e| EngineError::Config(format!("failed to deserialize config: {e}")))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> EngineResult<()> {
        if self.server.port == 0 {
            return Err(EngineError::Config(
                "server.port must be greater than 0".to_string(),
            ));
        }

        match self.database.db_type.as_str() {
            "sqlite" | "postgres" => {}
            other => {
                return Err(EngineError::Config(format!(
                    "database.db_type must be 'sqlite' or 'postgres', got '{other}'"
                )));
            }
        }

        if self.database.max_connections == 0 {
            return Err(EngineError::Config(
                "database.max_connections must be greater than 0".to_string(),
            ));
        }

        if self.license.key_prefix.is_empty() {
            return Err(EngineError::Config(
                "license.key_prefix cannot be empty".to_string(),
            ));
        }

        if self.engine.inactivity_threshold_days <= 0 {
            return Err(EngineError::Config(
                "engine.inactivity_threshold_days must be greater than 0".to_string(),
            ));
        }
        if self.engine.grace_period_days <= 0 {
            return Err(EngineError::Config(
                "engine.grace_period_days must be greater than 0".to_string(),
            ));
        }

        if self.jobs.auto_check_cron.trim().is_empty() {
            return Err(EngineError::Config(
                "jobs.auto_check_cron cannot be empty".to_string(),
            ));
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(EngineError::Config(format!(
                    "logging.level must be one of: trace, debug, info, warn, error. Got '{other}'"
                )));
            }
        }

        Ok(())
    }
}

/// Get the global configuration.
///
/// This loads the configuration on first access and caches it.
/// Returns an error if configuration loading or validation fails.
pub fn get_config() -> EngineResult<&'static KeywardConfig> {
    if let Some(config) = CONFIG.get() {
        return Ok(config);
    }

    let config = KeywardConfig::load()?;
    config.validate()?;

    // Another thread may have won the race; either value is equivalent.
    let _ = CONFIG.set(config.clone());

    Ok(CONFIG.get().expect("config was just set"))
}

/// Initialize configuration explicitly.
///
/// Call this early in your application to catch configuration errors.
pub fn init_config() -> EngineResult<&'static KeywardConfig> {
    get_config()
}
