use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the daemon runtime and message protocol.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config error: {0}")]
    Config(#[from] prompter_core::ConfigError),

    #[error("engine error: {0}")]
    Engine(#[from] prompter_engine::EngineError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("daemon protocol error: {0}")]
    Protocol(String),

    #[error("daemon is not running (socket missing: {socket})")]
    DaemonNotRunning { socket: PathBuf },

    #[error("save-content RPC timed out after {timeout_ms} ms; pending edits preserved")]
    SaveTimeout { timeout_ms: u64 },

    #[error("no editor is attached to the message channel")]
    NoEditorAttached,
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
