//! In-memory registry
//!
//! Holds manifests, tags and blobs in process. Used by tests and by callers
//! that assemble images locally; it counts blob reads so cache behavior can
//! be observed.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::json;

use crate::layer::tar_layer;
use crate::manifest::{BUNDLE_LABEL, Descriptor, ImageManifest, OCI_CONFIG, OCI_MANIFEST};
use crate::reference::ImageRef;
use crate::registry::{FetchedManifest, Registry};
use crate::{Error, Result};

const OCI_LAYER: &str = "application/vnd.oci.image.layer.v1.tar";

#[derive(Default)]
struct Repository {
    tags: BTreeMap<String, String>,
    manifests: HashMap<String, FetchedManifest>,
}

#[derive(Default)]
struct State {
    repositories: HashMap<String, Repository>,
    blobs: HashMap<String, Vec<u8>>,
}

#[derive(Default)]
pub struct MemoryRegistry {
    state: Mutex<State>,
    blob_reads: AtomicUsize,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of blobs served so far.
    pub fn blob_reads(&self) -> usize {
        self.blob_reads.load(Ordering::SeqCst)
    }

    /// Store a blob and describe it.
    pub fn push_blob(&self, media_type: &str, content: &[u8]) -> Descriptor {
        let digest = vendo_fs::checksum::digest_of(content);
        self.state().blobs.insert(digest.clone(), content.to_vec());
        Descriptor {
            media_type: media_type.to_string(),
            digest,
            size: content.len() as u64,
            platform: None,
        }
    }

    /// Store a manifest under `reference`, tagging it if the reference has a
    /// tag. Returns the manifest digest.
    pub fn push_manifest(&self, reference: &str, media_type: &str, body: Vec<u8>) -> Result<String> {
        let image = ImageRef::parse(reference)?;
        let digest = vendo_fs::checksum::digest_of(&body);
        let mut state = self.state();
        let repository = state.repositories.entry(image.name()).or_default();
        if let Some(tag) = &image.tag {
            repository.tags.insert(tag.clone(), digest.clone());
        }
        repository.manifests.insert(
            digest.clone(),
            FetchedManifest {
                media_type: media_type.to_string(),
                body,
            },
        );
        Ok(digest)
    }

    /// Push a single-platform image built from uncompressed tar `layers`.
    pub fn push_image(&self, reference: &str, labels: &[(&str, &str)], layers: &[Vec<u8>]) -> Result<String> {
        let labels: BTreeMap<&str, &str> = labels.iter().copied().collect();
        let config = json!({
            "architecture": "amd64",
            "os": "linux",
            "config": { "Labels": labels },
            "rootfs": { "type": "layers", "diff_ids": [] },
        });
        let config = serde_json::to_vec(&config).map_err(|e| Error::decode("image config", e))?;
        let config = self.push_blob(OCI_CONFIG, &config);
        let layers = layers
            .iter()
            .map(|layer| self.push_blob(OCI_LAYER, layer))
            .collect();

        let manifest = ImageManifest {
            schema_version: 2,
            media_type: Some(OCI_MANIFEST.to_string()),
            config,
            layers,
        };
        let body = serde_json::to_vec(&manifest).map_err(|e| Error::decode("image manifest", e))?;
        self.push_manifest(reference, OCI_MANIFEST, body)
    }

    /// Push a bundle whose single layer holds `files`.
    pub fn push_bundle(&self, reference: &str, files: &[(&str, &[u8])]) -> Result<String> {
        let layer = tar_layer(files)?;
        self.push_image(reference, &[(BUNDLE_LABEL, "true")], &[layer])
    }
}

impl Registry for MemoryRegistry {
    fn manifest(&self, image: &ImageRef) -> Result<FetchedManifest> {
        let state = self.state();
        let not_found = || Error::NotFound {
            url: image.to_string(),
        };
        let repository = state.repositories.get(&image.name()).ok_or_else(not_found)?;
        let digest = match (&image.digest, &image.tag) {
            (Some(digest), _) => digest,
            (None, Some(tag)) => repository.tags.get(tag).ok_or_else(not_found)?,
            (None, None) => repository.tags.get("latest").ok_or_else(not_found)?,
        };
        repository.manifests.get(digest).cloned().ok_or_else(not_found)
    }

    fn blob(&self, image: &ImageRef, digest: &str, dest: &Path) -> Result<()> {
        let content = self.state().blobs.get(digest).cloned().ok_or_else(|| Error::NotFound {
            url: format!("{}@{}", image.name(), digest),
        })?;
        self.blob_reads.fetch_add(1, Ordering::SeqCst);
        fs::write(dest, content).map_err(|e| vendo_fs::Error::io(dest, e))?;
        Ok(())
    }

    fn tags(&self, image: &ImageRef) -> Result<Vec<String>> {
        let state = self.state();
        let repository = state.repositories.get(&image.name()).ok_or_else(|| Error::NotFound {
            url: image.name(),
        })?;
        Ok(repository.tags.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn tag_and_digest_lookups_agree() {
        let registry = MemoryRegistry::new();
        let digest = registry
            .push_image("localhost:5000/app:1.0.0", &[], &[tar_layer(&[("a.txt", b"a")]).unwrap()])
            .unwrap();

        let by_tag = registry.manifest(&ImageRef::parse("localhost:5000/app:1.0.0").unwrap()).unwrap();
        let by_digest = registry
            .manifest(&ImageRef::parse(&format!("localhost:5000/app@{digest}")).unwrap())
            .unwrap();
        assert_eq!(by_tag, by_digest);
        assert_eq!(vendo_fs::checksum::digest_of(&by_tag.body), digest);
    }

    #[test]
    fn lists_tags_and_reports_missing_repositories() {
        let registry = MemoryRegistry::new();
        for tag in ["1.0.0", "1.1.0"] {
            registry
                .push_image(&format!("localhost:5000/app:{tag}"), &[], &[])
                .unwrap();
        }
        let tags = registry.tags(&ImageRef::parse("localhost:5000/app").unwrap()).unwrap();
        assert_eq!(tags, vec!["1.0.0".to_string(), "1.1.0".to_string()]);

        let missing = registry.manifest(&ImageRef::parse("localhost:5000/other:1").unwrap());
        assert!(matches!(missing, Err(Error::NotFound { .. })));
    }
}
