//! Error types for vendo-fs

use std::path::PathBuf;

/// Result type for vendo-fs operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in vendo-fs operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Lock acquisition failed for {path}")]
    LockFailed { path: PathBuf },

    #[error("Archive entry escapes destination: {entry}")]
    PathTraversal { entry: String },

    #[error("Unsupported archive format for {path}")]
    UnsupportedArchive { path: PathBuf },

    #[error("Failed to read zip archive {path}: {message}")]
    Zip { path: PathBuf, message: String },

    #[error("Invalid path pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Expected new root path '{path}' to be a directory inside fetched content")]
    NewRootPathMissing { path: String },

    #[error("Checksum mismatch for {subject}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        subject: String,
        expected: String,
        actual: String,
    },
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
