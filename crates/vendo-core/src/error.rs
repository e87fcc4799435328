//! Error types for vendo-core

use std::path::PathBuf;

/// Result type for vendo-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during a sync
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Directories or engine paths that cannot coexist
    #[error("Conflicting configuration: {message}")]
    ConfigConflict { message: String },

    /// Locked mode found no lock entry for a content
    #[error("Expected to find lock entry for directory '{directory}' content '{path}'")]
    LockEntryMissing { directory: String, path: String },

    /// Locked mode without a lock document
    #[error("Locked sync requires a lock file at {path}")]
    LockFileMissing { path: PathBuf },

    /// A fetched directory could not be moved into place
    #[error("Placing directory {path}: {source}")]
    Placement {
        path: PathBuf,
        #[source]
        source: vendo_fs::Error,
    },

    /// Fetching one content entry failed
    #[error("Fetching '{directory}/{path}' ({kind}): {source}")]
    ContentFailed {
        directory: String,
        path: String,
        kind: &'static str,
        #[source]
        source: Box<Error>,
    },

    /// An external tool (hg, helm) failed or could not be started
    #[error("Running {tool}: {message}")]
    Tool { tool: String, message: String },

    /// An HTTP download failed
    #[error("Downloading {url}: {reason}")]
    Http { url: String, reason: String },

    /// A source points at something unusable
    #[error("Invalid source: {message}")]
    InvalidSource { message: String },

    // Transparent wrappers for underlying crate errors
    #[error(transparent)]
    Fs(#[from] vendo_fs::Error),

    #[error(transparent)]
    Meta(#[from] vendo_meta::Error),

    #[error(transparent)]
    Cache(#[from] vendo_cache::Error),

    #[error(transparent)]
    Git(#[from] vendo_git::Error),

    #[error(transparent)]
    Oci(#[from] vendo_oci::Error),
}

impl Error {
    /// The innermost error, looking through [`Error::ContentFailed`].
    pub fn root(&self) -> &Error {
        match self {
            Self::ContentFailed { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether a git signature check rejected the fetched reference.
    pub fn is_verification(&self) -> bool {
        matches!(self.root(), Self::Git(e) if e.is_verification())
    }
}
