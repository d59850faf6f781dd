//! Error types for Doki.
//!
//! Library crates use [`DokiError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all Doki operations.
#[derive(Debug, thiserror::Error)]
pub enum DokiError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error during crawl or a provider call.
    #[error("network error: {0}")]
    Network(String),

    /// HTML parsing or content extraction error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Vector index or content store error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad parameters, malformed records, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// The embedding capability failed or returned an unusable vector.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// The language model call failed during reformulation or synthesis.
    #[error("generation error: {0}")]
    Generation(String),

    /// Ingestion could not produce an index; the previous index is untouched.
    #[error("ingestion aborted: {message}")]
    Ingestion { message: String },

    /// The vector index is missing, unbuilt, or cannot be opened.
    #[error("vector index unavailable at {path:?}: {reason}")]
    IndexUnavailable { path: PathBuf, reason: String },

    /// A vector does not match the dimensionality recorded in the index.
    #[error("embedding dimension mismatch: index has {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, DokiError>;

impl DokiError {
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

    /// Create an ingestion abort error.
    pub fn ingestion(msg: impl Into<String>) -> Self {
        Self::Ingestion {
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

    /// Mark the index at `path` as unavailable.
    pub fn index_unavailable(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::IndexUnavailable {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// True when the caller should report a service-unavailable condition.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::IndexUnavailable { .. })
    }

    /// True for language model failures.
    pub fn is_generation(&self) -> bool {
        matches!(self, Self::Generation(_))
    }
}
