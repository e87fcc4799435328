//! Error types for vendo-meta

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Filesystem error: {0}")]
    Fs(#[from] vendo_fs::Error),

    #[error("Failed to parse YAML document {index}: {message}")]
    Parse { index: usize, message: String },

    #[error("Unsupported document kind '{kind}' (apiVersion '{api_version}')")]
    UnknownKind { kind: String, api_version: String },

    #[error("Expected exactly one Config document, found {count}")]
    ConfigCount { count: usize },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Conflicting configuration: {message}")]
    ConfigConflict { message: String },

    #[error("Secret '{name}' not found in manifest")]
    SecretNotFound { name: String },

    #[error("ConfigMap '{name}' not found in manifest")]
    ConfigMapNotFound { name: String },

    #[error("Secret '{name}' key '{key}' is not valid base64: {message}")]
    InvalidSecretData {
        name: String,
        key: String,
        message: String,
    },

    #[error("Manifest requires vendo >= {required}, running {current}")]
    VersionTooOld { required: String, current: String },

    #[error("Invalid version constraint '{constraint}': {reason}")]
    VersionConstraintParse { constraint: String, reason: String },

    #[error("Expected to find at least one version matching '{constraint}' among {candidates} candidates")]
    NoMatchingVersion { constraint: String, candidates: usize },

    #[error("Failed to read lock document at {path}: {message}")]
    LockParse { path: PathBuf, message: String },

    #[error("Lock entry for '{path}' is a {found} lock, expected {expected}")]
    LockKindMismatch {
        path: String,
        expected: &'static str,
        found: &'static str,
    },
}
