//! Error taxonomy for the license engine.
//!
//! Storage and logging failures are deliberately coarse-grained here: the
//! engine classifies them at the call site (transient vs. terminal) rather
//! than encoding that policy in the error type.

use thiserror::Error;

/// Errors produced by the engine, store, and configuration layers.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Result alias used throughout the crate.
pub type EngineResult<T> = Result<T, EngineError>;
