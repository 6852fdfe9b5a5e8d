//! Error types for gembatch.
//!
//! Library crates use [`GembatchError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level error type for all gembatch operations.
#[derive(Debug, thiserror::Error)]
pub enum GembatchError {
    /// Malformed or missing caller input.
    #[error("invalid parameters: {message}")]
    InvalidParams { message: String },

    /// Source file extension cannot be converted to JSONL.
    #[error("unsupported source format `{format}` for {path:?}")]
    UnsupportedFormat { format: String, path: PathBuf },

    /// One or more JSONL lines are malformed or schema-mismatched.
    #[error("validation failed with {} error(s): {}", errors.len(), errors.join("; "))]
    ValidationFailed { errors: Vec<String> },

    /// The remote API rejected a request.
    #[error("remote operation `{operation}` failed: {message}")]
    RemoteOperationFailed { operation: String, message: String },

    /// Deadline exceeded while the job was still running remotely.
    #[error("polling timed out after {elapsed:?} while job {job} was still {state}")]
    PollingTimeout {
        job: String,
        state: String,
        elapsed: Duration,
    },

    /// Terminal job carries neither inline nor file results.
    #[error("no results available for job {job}")]
    NoResultsAvailable { job: String },

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Transport-level HTTP error.
    #[error("network error: {0}")]
    Network(String),

    /// Response or file content could not be decoded.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, GembatchError>;

impl GembatchError {
    /// Create an invalid-parameters error from any displayable message.
    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::InvalidParams {
            message: msg.into(),
        }
    }

    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a remote-operation error tagged with the operation name.
    pub fn remote(operation: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::RemoteOperationFailed {
            operation: operation.into(),
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Short machine-readable category, used by the tool layer.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidParams { .. } => "InvalidParams",
            Self::UnsupportedFormat { .. } => "UnsupportedFormat",
            Self::ValidationFailed { .. } => "ValidationFailed",
            Self::RemoteOperationFailed { .. } => "RemoteOperationFailed",
            Self::PollingTimeout { .. } => "PollingTimeout",
            Self::NoResultsAvailable { .. } => "NoResultsAvailable",
            Self::Config { .. } => "Config",
            Self::Network(_) => "Network",
            Self::Parse { .. } => "Parse",
            Self::Io { .. } => "Io",
        }
    }
}
