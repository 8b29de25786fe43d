//! Error types and Result aliases for docsync.
//!
//! This module defines the error hierarchy used throughout the crate.
//! All public functions return `Result<T, Error>` or `Result<T>`.
//!
//! Errors fall into two scopes. Per-file errors (a loader could not read a
//! file, the file type has no loader) only affect the file being synced and
//! never abort a batch. Storage errors mean the index is unavailable and abort
//! the whole sync cycle; the next worker tick is the retry.

use thiserror::Error;

/// Result type alias using docsync's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for docsync operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Index storage error. The index is considered unavailable.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Content loading error.
    #[error("loader error: {0}")]
    Loader(#[from] LoaderError),

    /// File watching error.
    #[error("watcher error: {0}")]
    Watcher(#[from] WatcherError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Storage-specific errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// `SQLite` database error.
    #[error("database error: {0}")]
    Database(String),

    /// Schema migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// Vector operation error.
    #[error("vector error: {0}")]
    Vector(String),

    /// Metadata could not be encoded or decoded.
    #[error("metadata error: {0}")]
    Metadata(String),
}

/// Content loader errors.
#[derive(Error, Debug)]
pub enum LoaderError {
    /// No loader is registered for the file extension.
    #[error("unsupported file type '{extension}' for '{path}'")]
    UnsupportedFileType { extension: String, path: String },

    /// The loader could not extract content.
    #[error("failed to load '{path}': {reason}")]
    Failed { path: String, reason: String },
}

/// File watcher errors.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// Failed to watch path.
    #[error("failed to watch path '{path}': {reason}")]
    WatchFailed { path: String, reason: String },

    /// Path is not inside the watched root.
    #[error("path '{path}' is outside the watched root '{root}'")]
    OutsideRoot { path: String, root: String },

    /// Path cannot be turned into an index key.
    #[error("path '{path}' is not valid UTF-8")]
    NonUtf8Path { path: String },

    /// Directory enumeration error.
    #[error("failed to scan '{path}': {reason}")]
    ScanFailed { path: String, reason: String },
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error is confined to a single file.
    ///
    /// Per-file errors are logged and the batch continues; anything else
    /// aborts the current sync cycle.
    #[must_use]
    pub const fn is_per_file(&self) -> bool {
        matches!(self, Self::Loader(_) | Self::Io(_) | Self::Watcher(_))
    }

    /// Short label used for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Storage(_) => "index_unavailable",
            Self::Loader(LoaderError::UnsupportedFileType { .. }) => "unsupported_file_type",
            Self::Loader(LoaderError::Failed { .. }) => "loader_failure",
            Self::Watcher(_) => "watcher",
            Self::Io(_) => "io",
            Self::Internal(_) => "internal",
        }
    }
}

impl LoaderError {
    /// Create a loader failure for a path.
    pub fn failed(path: &std::path::Path, reason: impl std::fmt::Display) -> Self {
        Self::Failed {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }
}
