//! Manifest and lock document schema for vendo.
//!
//! The manifest is a multi-document YAML stream: exactly one `Config`
//! document describing directories and their contents, plus any number of
//! `Secret` and `ConfigMap` documents referenced by name from the config.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;
pub mod version;

pub use error::{Error, Result};
pub use loader::Manifest;
pub use schema::{
    BundleSource, Config, ContentSpec, DirectorySource, DirectorySpec, GitSource, HelmChartSource,
    HgSource, HttpSource, ImageSource, InlineSource, LockConfig, LockContent, LockDirectory,
    LockedSource, ResourceRef, SourceSpec,
};
pub use version::{VersionConstraint, VersionSelection};

/// `apiVersion` of vendo's own documents.
pub const API_VERSION: &str = "vendo.dev/v1alpha1";
