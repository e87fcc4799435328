//! Error types for vendo-cache

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Fs(#[from] vendo_fs::Error),

    #[error("Cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to lock cache at {path}")]
    LockFailed { path: PathBuf },

    #[error("Invalid cache size '{input}': {reason}")]
    InvalidSize { input: String, reason: String },

    #[error("Cache index at {path} is unreadable: {message}")]
    Index { path: PathBuf, message: String },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
