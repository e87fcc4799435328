//! Error types for vendo-git

use crate::signature::ObjectKind;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error(transparent)]
    Fs(#[from] vendo_fs::Error),

    #[error(transparent)]
    Meta(#[from] vendo_meta::Error),

    #[error("Reference '{reference}' not found in {url}")]
    RefNotFound { reference: String, url: String },

    #[error("Fetching {url}: {message}")]
    FetchFailed { url: String, message: String },

    #[error("Expected to find {kind} signature: Expected to find section 'PGP SIGNATURE', but did not")]
    MissingSignature { kind: ObjectKind },

    #[error("Checking {kind} signature: openpgp: signature made by unknown entity (checked {checked} trusted keys)")]
    UnknownSigner { kind: ObjectKind, checked: usize },

    #[error("Checking {kind} signature: malformed signature block: {message}")]
    MalformedSignature { kind: ObjectKind, message: String },

    #[error("Reading trusted public key '{name}': {message}")]
    InvalidPublicKey { name: String, message: String },

    #[error("Snapshot cache error: {0}")]
    Cache(#[from] vendo_cache::Error),
}

impl Error {
    /// Whether this is one of the signature verification failures.
    pub fn is_verification(&self) -> bool {
        matches!(
            self,
            Self::MissingSignature { .. }
                | Self::UnknownSigner { .. }
                | Self::MalformedSignature { .. }
        )
    }
}
