//! Schema definitions for manifest, companion resources and lock documents
//!
//! - [`config`] - the `Config` document: directories and their contents
//! - [`source`] - one struct per source kind plus the closed [`SourceSpec`] set
//! - [`resources`] - `Secret` and `ConfigMap` documents
//! - [`lock`] - the `LockConfig` document written after a successful sync

pub mod config;
pub mod lock;
pub mod resources;
pub mod source;

pub use config::{Config, ContentSpec, DirectorySpec};
pub use lock::{
    BundleLock, DirectoryLock, GitLock, HelmChartLock, HgLock, HttpLock, ImageLock, InlineLock,
    LockConfig, LockContent, LockDirectory, LockedSource,
};
pub use resources::{ConfigMap, Metadata, Secret};
pub use source::{
    BundleSource, DirectorySource, GitSource, GitVerification, HelmChartSource, HelmRepository,
    HgSource, HttpSource, ImageSource, InlineRef, InlineSource, InlineSourceRef, ResourceRef,
    SourceSpec,
};
