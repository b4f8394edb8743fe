//! Error types for Pagewright.
//!
//! Library crates use [`PagewrightError`] via `thiserror`.
//! The server binary wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all Pagewright operations.
#[derive(Debug, thiserror::Error)]
pub enum PagewrightError {
    /// Configuration loading or validation error (missing credentials, bad TOML).
    #[error("config error: {message}")]
    Config { message: String },

    /// Transport-level HTTP failure (connect, timeout, unreadable body).
    #[error("network error: {0}")]
    Network(String),

    /// The Notion API answered with a non-success status.
    #[error("notion error ({status} {code}): {message}")]
    Notion {
        status: u16,
        code: String,
        message: String,
    },

    /// Appending a child failed because the target block type cannot hold children.
    #[error("block {block_id} does not support children")]
    ChildrenNotSupported { block_id: String },

    /// Language model or embedding provider failure.
    #[error("llm error: {0}")]
    Llm(String),

    /// Model output did not conform to the requested output schema.
    #[error("schema error: {0}")]
    Schema(String),

    /// Embedding cache (libSQL) error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Vector index misuse (e.g. searching before initialization).
    #[error("index error: {0}")]
    Index(String),

    /// Payload or response parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (missing page id, malformed value, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PagewrightError>;

impl PagewrightError {
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

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
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

    /// True for the one failure class the reconciler downgrades to a comment.
    pub fn is_children_not_supported(&self) -> bool {
        matches!(self, Self::ChildrenNotSupported { .. })
    }
}
