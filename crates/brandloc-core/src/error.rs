//! Error types for brandloc

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The main error type for brandloc operations
#[derive(Debug, Error)]
pub enum LocalizerError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("TOML parse error: {0}")]
    TomlParse(String),

    #[error("TOML serialization error: {0}")]
    TomlSer(String),

    #[error("Image error: {0}")]
    Image(String),

    #[error("Invalid job transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Config error: {0}")]
    Config(String),

    #[error("Recovery error: {0}")]
    Recovery(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Result type alias for brandloc operations
pub type Result<T> = std::result::Result<T, LocalizerError>;

/// Error taxonomy recorded in the structured error log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Malformed master/region input, never retried
    ValidationError,
    /// Generation or signing collaborator failure
    ExternalServiceError,
    /// Disk write failure, retried with backoff
    TransientIoError,
    /// A batch finished with failed jobs
    PartialBatchFailure,
    /// Anything else (bugs, corrupt snapshots)
    InternalError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::ValidationError => "VALIDATION_ERROR",
            ErrorKind::ExternalServiceError => "EXTERNAL_SERVICE_ERROR",
            ErrorKind::TransientIoError => "TRANSIENT_IO_ERROR",
            ErrorKind::PartialBatchFailure => "PARTIAL_BATCH_FAILURE",
            ErrorKind::InternalError => "INTERNAL_ERROR",
        };
        write!(f, "{}", s)
    }
}

impl LocalizerError {
    /// Map this error onto the logged taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            LocalizerError::Validation(_)
            | LocalizerError::TomlParse(_)
            | LocalizerError::Config(_)
            | LocalizerError::NotFound(_) => ErrorKind::ValidationError,
            LocalizerError::ExternalService(_) => ErrorKind::ExternalServiceError,
            LocalizerError::Io(_) | LocalizerError::Image(_) => ErrorKind::TransientIoError,
            LocalizerError::Json(_)
            | LocalizerError::TomlSer(_)
            | LocalizerError::InvalidTransition { .. }
            | LocalizerError::Recovery(_) => ErrorKind::InternalError,
        }
    }
}

impl From<serde_json::Error> for LocalizerError {
    fn from(err: serde_json::Error) -> Self {
        LocalizerError::Json(err.to_string())
    }
}

impl From<toml::de::Error> for LocalizerError {
    fn from(err: toml::de::Error) -> Self {
        LocalizerError::TomlParse(err.to_string())
    }
}

impl From<toml::ser::Error> for LocalizerError {
    fn from(err: toml::ser::Error) -> Self {
        LocalizerError::TomlSer(err.to_string())
    }
}

impl From<image::ImageError> for LocalizerError {
    fn from(err: image::ImageError) -> Self {
        LocalizerError::Image(err.to_string())
    }
}
