//! Keyward - a license lifecycle and reconciliation engine
//!
//! # Features
//!
//! Keyward uses feature flags to allow you to include only what you need:
//!
//! - `sqlite` - SQLite database backend. Enabled by default.
//! - `postgres` - PostgreSQL database backend.
//! - `background-jobs` - In-process cron scheduler for the Auto-Check pass.
//!   Enabled by default.
//!
//! # Example
//!
//! ```toml
//! # Use defaults (sqlite + background-jobs)
//! keyward = { git = "https://github.com/keyward/keyward" }
//!
//! # Postgres, no in-process scheduler (run the pass from an external cron)
//! keyward = { git = "https://github.com/keyward/keyward", default-features = false, features = ["postgres"] }
//! ```

// Core modules (always available)
pub mod config;
pub mod engine;
pub mod errors;
pub mod license_key;
pub mod status;
pub mod store;

// HTTP server components
pub mod server;

// Scheduled jobs (requires "background-jobs" feature)
#[cfg(feature = "background-jobs")]
pub mod jobs;
