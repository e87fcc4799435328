//! Bundle fetching
//!
//! A bundle is pulled like an image, but its extracted tree is cached as a
//! whole under the bundle digest: a later fetch of the same digest unpacks
//! ("unbundles") the stored tree without pulling layers. In recursive mode
//! the bundles listed in `.imgpkg/images.yml` are pulled, depth first, into
//! `.imgpkg/bundles/<algorithm>-<hex>/` of the root bundle.

use std::fs;
use std::path::Path;

use vendo_cache::{CacheStatus, ContentCache};
use vendo_fs::ArchiveKind;
use vendo_meta::VersionSelection;

use crate::image::{blob_file_name, fetch_manifest, pull_layers, read_config, resolve_tag};
use crate::manifest::{ImageManifest, ImagesLock};
use crate::reference::ImageRef;
use crate::registry::Registry;
use crate::{Error, Result};

const IMAGES_LOCK: &str = ".imgpkg/images.yml";
const NESTED_BUNDLES: &str = ".imgpkg/bundles";

/// A bundle pulled because another bundle references it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NestedBundle {
    /// `registry/repository@digest`
    pub url: String,
    /// Location relative to the root bundle
    pub path: String,
    pub cache: CacheStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleOutcome {
    pub url: String,
    pub digest: String,
    pub tag: Option<String>,
    pub cache: CacheStatus,
    pub nested: Vec<NestedBundle>,
}

#[derive(Clone, Copy)]
pub struct BundleFetch<'a> {
    pub registry: &'a dyn Registry,
    pub cache: Option<&'a ContentCache>,
}

impl<'a> BundleFetch<'a> {
    pub fn new(registry: &'a dyn Registry, cache: Option<&'a ContentCache>) -> Self {
        Self { registry, cache }
    }

    pub fn run(
        &self,
        url: &str,
        selection: Option<&VersionSelection>,
        recursive: bool,
        work: &Path,
        dest: &Path,
    ) -> Result<BundleOutcome> {
        let image = resolve_tag(self.registry, &ImageRef::parse(url)?, selection)?;
        let (digest, manifest) = match &image.digest {
            Some(digest) => (digest.clone(), None),
            None => {
                let (digest, manifest) = fetch_manifest(self.registry, &image)?;
                (digest, Some(manifest))
            }
        };
        let pinned = image.pinned(&digest);

        let cache = self.unbundle(&pinned, &digest, manifest, &work.join("root"), dest)?;

        let mut nested = Vec::new();
        if recursive {
            let mut ancestors = vec![digest.clone()];
            self.pull_nested(dest, dest, &mut ancestors, work, &mut nested)?;
        }

        Ok(BundleOutcome {
            url: pinned.to_string(),
            digest,
            tag: image.tag.clone(),
            cache,
            nested,
        })
    }

    /// Materialize bundle `digest` into `dest`, from the cache if possible.
    fn unbundle(
        &self,
        pinned: &ImageRef,
        digest: &str,
        manifest: Option<ImageManifest>,
        work: &Path,
        dest: &Path,
    ) -> Result<CacheStatus> {
        let key = format!("oci-bundle:{digest}");

        if let Some(cache) = self.cache
            && restore_tree(cache, &key, dest)
        {
            tracing::info!(bundle = %pinned, "Using cached bundle (unbundle)");
            return Ok(CacheStatus::Hit);
        }

        let manifest = match manifest {
            Some(manifest) => manifest,
            None => fetch_manifest(self.registry, pinned)?.1,
        };
        let config = read_config(self.registry, pinned, &manifest, work)?;
        if !config.is_bundle() {
            return Err(Error::NotABundle {
                reference: pinned.to_string(),
            });
        }

        let contents = work.join("contents");
        fs::create_dir_all(&contents).map_err(|e| vendo_fs::Error::io(&contents, e))?;
        pull_layers(self.registry, pinned, &manifest, None, work, &contents)?;
        tracing::info!(bundle = %pinned, "Pulled bundle");

        let status = match self.cache {
            Some(cache) => {
                let archive = work.join(format!("{}.tar.gz", blob_file_name(digest)));
                match vendo_fs::archive::pack_tar_gz(&contents, &archive) {
                    Ok(()) => cache.store_file(&key, &archive).into(),
                    Err(e) => {
                        tracing::warn!(bundle = %pinned, error = %e, "Failed to pack bundle for cache");
                        CacheStatus::Skipped {
                            reason: e.to_string(),
                        }
                    }
                }
            }
            None => CacheStatus::Disabled,
        };

        vendo_fs::copy::copy_dir(&contents, dest)?;
        Ok(status)
    }

    /// Depth-first pull of bundles referenced from `bundle_root`.
    fn pull_nested(
        &self,
        root: &Path,
        bundle_root: &Path,
        ancestors: &mut Vec<String>,
        work: &Path,
        nested: &mut Vec<NestedBundle>,
    ) -> Result<()> {
        let lock_path = bundle_root.join(IMAGES_LOCK);
        if !lock_path.exists() {
            return Ok(());
        }
        let content = vendo_fs::io::read_text(&lock_path)?;
        let lock: ImagesLock = serde_yaml::from_str(&content)
            .map_err(|e| Error::decode(lock_path.display().to_string(), e))?;

        for locked in &lock.images {
            let image = ImageRef::parse(&locked.image)?;
            let Some(digest) = image.digest.clone() else {
                tracing::debug!(image = %locked.image, "Skipping unpinned image reference");
                continue;
            };
            check_cycle(ancestors, &digest)?;

            let relative = format!("{NESTED_BUNDLES}/{}", blob_file_name(&digest));
            let target = root.join(&relative);
            if target.exists() {
                continue;
            }

            let key = format!("oci-bundle:{digest}");
            let known_bundle = self
                .cache
                .is_some_and(|cache| cache.contains(&key).unwrap_or(false));
            let nested_work = work.join(blob_file_name(&digest));
            let manifest = if known_bundle {
                None
            } else {
                let (_, manifest) = fetch_manifest(self.registry, &image)?;
                if !read_config(self.registry, &image, &manifest, &nested_work)?.is_bundle() {
                    continue;
                }
                Some(manifest)
            };

            let cache = self.unbundle(&image, &digest, manifest, &nested_work, &target)?;
            nested.push(NestedBundle {
                url: image.to_string(),
                path: relative,
                cache,
            });

            ancestors.push(digest);
            self.pull_nested(root, &target, ancestors, work, nested)?;
            ancestors.pop();
        }
        Ok(())
    }
}

/// Fail if `digest` already appears on the current traversal path.
pub(crate) fn check_cycle(ancestors: &[String], digest: &str) -> Result<()> {
    if ancestors.iter().any(|a| a == digest) {
        let chain = ancestors
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(digest))
            .collect::<Vec<_>>()
            .join(" -> ");
        return Err(Error::CycleDetected {
            digest: digest.to_string(),
            chain,
        });
    }
    Ok(())
}

/// Unpack a cached bundle tree into `dest`. Any failure counts as a miss.
fn restore_tree(cache: &ContentCache, key: &str, dest: &Path) -> bool {
    let artifact = match cache.get(key) {
        Ok(Some(artifact)) => artifact,
        Ok(None) => return false,
        Err(e) => {
            tracing::warn!(key, error = %e, "Cache lookup failed; pulling instead");
            return false;
        }
    };
    match vendo_fs::archive::unpack_reader(artifact.file, ArchiveKind::TarGz, Path::new(key), dest) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(key, error = %e, "Cached bundle unusable; pulling instead");
            if let Err(e) = fs::remove_dir_all(dest) {
                tracing::debug!(error = %e, "Failed to clear partial unbundle");
            }
            false
        }
    }
}
