//! Image fetching: resolve, pull layers (through the cache), extract

use std::fs::{self, File};
use std::path::Path;

use vendo_cache::{CacheStatus, ContentCache};
use vendo_meta::VersionSelection;

use crate::layer::apply_layer;
use crate::manifest::{ImageConfig, ImageManifest, ManifestDocument};
use crate::reference::ImageRef;
use crate::registry::Registry;
use crate::{Error, Result};

/// Result of pulling an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageOutcome {
    /// `registry/repository@digest`
    pub url: String,
    pub digest: String,
    /// Tag the image was requested or selected by
    pub tag: Option<String>,
    pub cache: CacheStatus,
}

/// Pulls an image's filesystem into a directory.
#[derive(Clone, Copy)]
pub struct ImageFetch<'a> {
    pub registry: &'a dyn Registry,
    pub cache: Option<&'a ContentCache>,
}

impl<'a> ImageFetch<'a> {
    pub fn new(registry: &'a dyn Registry, cache: Option<&'a ContentCache>) -> Self {
        Self { registry, cache }
    }

    /// Pull `url` (tag selected via `selection` when it names neither tag
    /// nor digest) and extract its layers into `dest`.
    pub fn run(
        &self,
        url: &str,
        selection: Option<&VersionSelection>,
        work: &Path,
        dest: &Path,
    ) -> Result<ImageOutcome> {
        let image = resolve_tag(self.registry, &ImageRef::parse(url)?, selection)?;
        let (digest, manifest) = fetch_manifest(self.registry, &image)?;
        let pinned = image.pinned(&digest);

        fs::create_dir_all(work).map_err(|e| vendo_fs::Error::io(work, e))?;
        let cache = pull_layers(self.registry, &pinned, &manifest, self.cache, work, dest)?;

        tracing::info!(image = %pinned, layers = manifest.layers.len(), "Pulled image");
        Ok(ImageOutcome {
            url: pinned.to_string(),
            digest,
            tag: image.tag.clone(),
            cache,
        })
    }
}

/// Pick a tag with `selection` if `image` names neither tag nor digest.
pub(crate) fn resolve_tag(
    registry: &dyn Registry,
    image: &ImageRef,
    selection: Option<&VersionSelection>,
) -> Result<ImageRef> {
    match selection {
        Some(selection) if image.tag.is_none() && image.digest.is_none() => {
            let tags = registry.tags(image)?;
            let tag = selection.select(&tags)?;
            tracing::debug!(image = %image.name(), tag, "Selected tag");
            Ok(image.with_tag(tag))
        }
        _ => Ok(image.clone()),
    }
}

/// Fetch and verify the manifest of `image`, descending through an index.
///
/// Returns the digest of the top-level document, which pins the image.
pub(crate) fn fetch_manifest(registry: &dyn Registry, image: &ImageRef) -> Result<(String, ImageManifest)> {
    let fetched = registry.manifest(image)?;
    let digest = vendo_fs::checksum::digest_of(&fetched.body);
    if let Some(expected) = &image.digest
        && expected != &digest
    {
        return Err(Error::DigestMismatch {
            subject: image.to_string(),
            expected: expected.clone(),
            actual: digest,
        });
    }

    match ManifestDocument::parse(&image.to_string(), &fetched.media_type, &fetched.body)? {
        ManifestDocument::Image(manifest) => Ok((digest, manifest)),
        ManifestDocument::Index(index) => {
            let entry = index
                .select_platform()
                .ok_or_else(|| Error::NoPlatformManifest {
                    reference: image.to_string(),
                })?;
            let platform = image.pinned(&entry.digest);
            let (_, manifest) = fetch_manifest(registry, &platform)?;
            Ok((digest, manifest))
        }
    }
}

/// Download blob `digest` to `dest` and check its content hash.
pub(crate) fn download_blob(registry: &dyn Registry, image: &ImageRef, digest: &str, dest: &Path) -> Result<()> {
    registry.blob(image, digest, dest)?;
    let actual = format!(
        "{}{}",
        vendo_fs::checksum::PREFIX,
        vendo_fs::checksum::file_sha256_hex(dest)?
    );
    if actual != digest {
        return Err(Error::DigestMismatch {
            subject: format!("{}@{}", image.name(), digest),
            expected: digest.to_string(),
            actual,
        });
    }
    Ok(())
}

pub(crate) fn read_config(
    registry: &dyn Registry,
    image: &ImageRef,
    manifest: &ImageManifest,
    work: &Path,
) -> Result<ImageConfig> {
    fs::create_dir_all(work).map_err(|e| vendo_fs::Error::io(work, e))?;
    let path = work.join(blob_file_name(&manifest.config.digest));
    download_blob(registry, image, &manifest.config.digest, &path)?;
    let body = fs::read(&path).map_err(|e| vendo_fs::Error::io(&path, e))?;
    ImageConfig::parse(&image.to_string(), &body)
}

/// Pull each layer (from the cache when possible) and apply it to `dest`.
pub(crate) fn pull_layers(
    registry: &dyn Registry,
    image: &ImageRef,
    manifest: &ImageManifest,
    cache: Option<&ContentCache>,
    work: &Path,
    dest: &Path,
) -> Result<CacheStatus> {
    let mut hits = 0;
    let mut stored = 0;
    let mut skipped: Option<String> = None;

    for layer in &manifest.layers {
        let blob_path = work.join(blob_file_name(&layer.digest));
        let key = format!("oci-layer:{}", layer.digest);

        if cache.is_some_and(|cache| restore_blob(cache, &key, &blob_path)) {
            hits += 1;
        } else {
            tracing::debug!(digest = %layer.digest, size = layer.size, "Pulling layer");
            download_blob(registry, image, &layer.digest, &blob_path)?;
            if let Some(cache) = cache {
                match CacheStatus::from(cache.store_file(&key, &blob_path)) {
                    CacheStatus::Stored => stored += 1,
                    CacheStatus::Skipped { reason } => skipped = Some(reason),
                    _ => {}
                }
            }
        }
        apply_layer(&blob_path, dest)?;
    }

    Ok(match cache {
        None => CacheStatus::Disabled,
        Some(_) if hits == manifest.layers.len() && hits > 0 => CacheStatus::Hit,
        Some(_) if stored > 0 => CacheStatus::Stored,
        Some(_) => skipped
            .map(|reason| CacheStatus::Skipped { reason })
            .unwrap_or_default(),
    })
}

/// Copy a cached blob to `dest`. Any failure counts as a miss.
pub(crate) fn restore_blob(cache: &ContentCache, key: &str, dest: &Path) -> bool {
    let artifact = match cache.get(key) {
        Ok(Some(artifact)) => artifact,
        Ok(None) => return false,
        Err(e) => {
            tracing::warn!(key, error = %e, "Cache lookup failed; pulling instead");
            return false;
        }
    };
    let copied = File::create(dest).and_then(|mut out| {
        let mut file = artifact.file;
        std::io::copy(&mut file, &mut out)
    });
    match copied {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!(key, error = %e, "Cached blob unusable; pulling instead");
            false
        }
    }
}

pub(crate) fn blob_file_name(digest: &str) -> String {
    digest.replace(':', "-")
}
