//! Error types for vendo-oci

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Fs(#[from] vendo_fs::Error),

    #[error(transparent)]
    Meta(#[from] vendo_meta::Error),

    #[error("Invalid image reference '{reference}': {reason}")]
    InvalidReference { reference: String, reason: String },

    #[error("Request to {url} failed: {reason}")]
    Http { url: String, reason: String },

    #[error("Not found: {url}")]
    NotFound { url: String },

    #[error("Unauthorized: {url}")]
    Unauthorized { url: String },

    #[error("Digest mismatch for {subject}: expected {expected}, got {actual}")]
    DigestMismatch {
        subject: String,
        expected: String,
        actual: String,
    },

    #[error("Unsupported manifest media type '{media_type}' for {reference}")]
    UnsupportedManifest {
        reference: String,
        media_type: String,
    },

    #[error("Image index for {reference} has no usable manifest")]
    NoPlatformManifest { reference: String },

    #[error("Expected image '{reference}' to be an imgpkg bundle")]
    NotABundle { reference: String },

    #[error("Cycle detected in bundle references: {chain}")]
    CycleDetected { digest: String, chain: String },

    #[error("Failed to decode {context}: {message}")]
    Decode { context: String, message: String },
}

impl Error {
    pub(crate) fn decode(context: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Decode {
            context: context.into(),
            message: err.to_string(),
        }
    }
}
