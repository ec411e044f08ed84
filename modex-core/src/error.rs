//! Error types for modex-core.

use thiserror::Error;

/// Result type alias for modex operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for modex operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (invalid window, slice count, mode combination).
    #[error("configuration error: {0}")]
    Config(String),

    /// Pulse definition does not fit inside its period.
    #[error("invalid pulse definition '{label}': {reason}")]
    InvalidPulseDefinition { label: String, reason: String },

    /// Timestamp not in `YYYY-MM-DDThh:mm:ss` form.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// Malformed experiment file.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
