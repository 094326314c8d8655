//! Engine error type.
//!
//! Collaborator callbacks (trainer, speech source, action sink) report
//! failures as `anyhow::Error`; those are logged where they are caught and
//! never reach this type. `EngineError` covers the failures a caller of the
//! library can actually act on.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to access persisted state at {path}: {source}")]
    Store {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed JSON in {what}: {source}")]
    Json {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("speech recognition unavailable: {0}")]
    SpeechUnavailable(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
