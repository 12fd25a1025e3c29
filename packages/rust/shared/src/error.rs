//! Error types for gitblog.
//!
//! Library crates use [`BlogError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all gitblog operations.
#[derive(Debug, thiserror::Error)]
pub enum BlogError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// A key is absent from both the override and the bundled tier.
    #[error("config key missing: {key}")]
    ConfigKeyMissing { key: String },

    /// A key exists but holds a value of the wrong shape.
    #[error("config key {key} is not a valid {expected}")]
    ConfigType { key: String, expected: &'static str },

    /// Clone, fetch, or history lookup against the content repository failed.
    #[error("mirror error: {0}")]
    Mirror(String),

    /// A bounded operation ran past its deadline.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Content file parsing error (front matter, encoding).
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (duplicate names, missing history, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Markdown-to-HTML conversion error.
    #[error("conversion error: {0}")]
    Conversion(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, BlogError>;

impl BlogError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a missing-key error for a dotted config path.
    pub fn key_missing(key: impl Into<String>) -> Self {
        Self::ConfigKeyMissing { key: key.into() }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a mirror error from any displayable message.
    pub fn mirror(msg: impl Into<String>) -> Self {
        Self::Mirror(msg.into())
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
