//! Error types for prompter-engine.

use std::path::PathBuf;

use thiserror::Error;

use prompter_core::error::ConfigError;
use prompter_core::validate::ValidationError;

/// All errors that can arise from engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// An error from configuration handling.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error (tier records, payloads).
    #[error("content record JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A proposed field value failed validation; no tier was mutated.
    #[error(transparent)]
    ValidationRejected(#[from] ValidationError),

    /// A field write was staged while editing mode was off.
    #[error("editing mode is not enabled; enable editing before staging edits")]
    EditingDisabled,

    /// The remote content API was unreachable or answered with an error.
    /// Transient: existing tiers are left untouched and the next trigger
    /// retries.
    #[error("remote content API error: {0}")]
    Network(String),
}

/// Convenience constructor for [`EngineError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> EngineError {
    EngineError::Io {
        path: path.into(),
        source,
    }
}
