//! Source fetchers
//!
//! [`fetch`] is the single entry point: it dispatches on the closed
//! [`SourceSpec`] set and returns the locked identity of what was fetched
//! together with the cache events seen on the way.

mod directory;
mod git;
mod helm;
mod hg;
mod http;
mod inline;
mod oci;
mod tool;

use std::collections::BTreeMap;
use std::path::Path;

use vendo_cache::{CacheStatus, ContentCache};
use vendo_meta::{LockedSource, Manifest, SourceSpec};
use vendo_oci::Registry;

use crate::Result;

pub use tool::{HELM_BINARY_ENV, HG_BINARY_ENV, ToolPaths};

/// Everything a fetcher may consult besides its own source settings.
#[derive(Clone, Copy)]
pub struct FetchContext<'a> {
    /// Source of Secrets and ConfigMaps
    pub manifest: &'a Manifest,
    /// Base for relative local paths
    pub root: &'a Path,
    pub cache: Option<&'a ContentCache>,
    /// Registry used instead of the network for OCI sources
    pub registry: Option<&'a dyn Registry>,
    pub tools: &'a ToolPaths,
}

impl FetchContext<'_> {
    /// Decoded entries of the named Secret.
    pub(crate) fn secret_entries(&self, name: &str) -> Result<BTreeMap<String, Vec<u8>>> {
        Ok(self.manifest.secret(name)?.entries()?)
    }
}

/// How one artifact of a fetch interacted with the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEvent {
    /// What was looked up, e.g. a repository URL or bundle reference
    pub subject: String,
    pub status: CacheStatus,
}

/// Outcome of fetching one content entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    pub locked: LockedSource,
    pub cache_events: Vec<CacheEvent>,
    /// Whether anything was retrieved over the network
    pub pulled: bool,
}

impl FetchResult {
    fn local(locked: LockedSource) -> Self {
        Self {
            locked,
            cache_events: Vec::new(),
            pulled: false,
        }
    }

    fn remote(locked: LockedSource, cache_events: Vec<CacheEvent>) -> Self {
        let pulled = cache_events.is_empty() || cache_events.iter().any(|e| e.status != CacheStatus::Hit);
        Self {
            locked,
            cache_events,
            pulled,
        }
    }
}

/// Fetch `source` into `dest`, using `work` as private scratch space.
///
/// `dest` is created by the fetcher and holds only the fetched tree on
/// success. Nothing is left in `dest` when verification fails.
pub fn fetch(ctx: &FetchContext<'_>, source: &SourceSpec, work: &Path, dest: &Path) -> Result<FetchResult> {
    tracing::debug!(kind = source.kind_name(), dest = %dest.display(), "Fetching");
    match source {
        SourceSpec::Git(git) => git::fetch(ctx, git, work, dest),
        SourceSpec::Hg(hg) => hg::fetch(ctx, hg, work, dest),
        SourceSpec::Http(http) => http::fetch(ctx, http, work, dest),
        SourceSpec::Image(image) => oci::fetch_image(ctx, image, work, dest),
        SourceSpec::ImgpkgBundle(bundle) => oci::fetch_bundle(ctx, bundle, work, dest),
        SourceSpec::HelmChart(chart) => helm::fetch(ctx, chart, work, dest),
        SourceSpec::Inline(inline) => inline::fetch(ctx, inline, dest),
        SourceSpec::Directory(directory) => directory::fetch(ctx, directory, dest),
    }
}
