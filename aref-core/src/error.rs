//! Fatal startup errors
//!
//! Everything in here terminates a run before any stage executes.

use thiserror::Error;

/// Errors raised by the core model (validation, configuration, vault)
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("{0} env var required.")]
    MissingEnv(&'static str),

    #[error("Missing {field} in {provider} creds")]
    MissingCredential { provider: String, field: String },

    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    pub(crate) fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

/// Result alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
