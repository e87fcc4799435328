//! Manifest, index and config documents

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub const OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
pub const OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";
pub const DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";
pub const DOCKER_MANIFEST_LIST: &str = "application/vnd.docker.distribution.manifest.list.v2+json";
pub const OCI_CONFIG: &str = "application/vnd.oci.image.config.v1+json";
pub const OCI_LAYER_GZIP: &str = "application/vnd.oci.image.layer.v1.tar+gzip";

/// Media types sent in `Accept` when requesting manifests.
pub const MANIFEST_ACCEPT: [&str; 4] = [OCI_MANIFEST, OCI_INDEX, DOCKER_MANIFEST, DOCKER_MANIFEST_LIST];

/// Config label marking an image as a bundle.
pub const BUNDLE_LABEL: &str = "dev.carvel.imgpkg.bundle";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    #[serde(default)]
    pub media_type: String,
    pub digest: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    pub architecture: String,
    pub os: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageManifest {
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub config: Descriptor,
    #[serde(default)]
    pub layers: Vec<Descriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageIndex {
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub manifests: Vec<Descriptor>,
}

/// A manifest response, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestDocument {
    Image(ImageManifest),
    Index(ImageIndex),
}

impl ManifestDocument {
    /// Classify by the response media type, falling back to the body's
    /// own `mediaType` and shape.
    pub fn parse(reference: &str, media_type: &str, body: &[u8]) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_slice(body).map_err(|e| Error::decode(format!("manifest of {reference}"), e))?;
        let declared = value
            .get("mediaType")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let media_type = media_type
            .split(';')
            .next()
            .map(str::trim)
            .filter(|m| !m.is_empty() && *m != "application/json")
            .unwrap_or(declared.as_str());

        let is_index = match media_type {
            OCI_INDEX | DOCKER_MANIFEST_LIST => true,
            OCI_MANIFEST | DOCKER_MANIFEST => false,
            "" => value.get("manifests").is_some(),
            other => {
                return Err(Error::UnsupportedManifest {
                    reference: reference.to_string(),
                    media_type: other.to_string(),
                });
            }
        };

        let context = || format!("manifest of {reference}");
        if is_index {
            serde_json::from_value(value)
                .map(Self::Index)
                .map_err(|e| Error::decode(context(), e))
        } else {
            serde_json::from_value(value)
                .map(Self::Image)
                .map_err(|e| Error::decode(context(), e))
        }
    }
}

impl ImageIndex {
    /// Pick linux/amd64, else the first entry.
    pub fn select_platform(&self) -> Option<&Descriptor> {
        self.manifests
            .iter()
            .find(|d| {
                d.platform
                    .as_ref()
                    .is_some_and(|p| p.os == "linux" && p.architecture == "amd64")
            })
            .or_else(|| self.manifests.first())
    }
}

/// The parts of an image config blob we read.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageConfig {
    #[serde(default)]
    pub config: Option<ContainerConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContainerConfig {
    #[serde(default, rename = "Labels")]
    pub labels: Option<BTreeMap<String, String>>,
}

impl ImageConfig {
    pub fn parse(reference: &str, body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body).map_err(|e| Error::decode(format!("config of {reference}"), e))
    }

    pub fn is_bundle(&self) -> bool {
        self.config
            .as_ref()
            .and_then(|c| c.labels.as_ref())
            .is_some_and(|labels| labels.contains_key(BUNDLE_LABEL))
    }
}

/// `.imgpkg/images.yml` inside a bundle.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagesLock {
    #[serde(default)]
    pub images: Vec<LockedImage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LockedImage {
    pub image: String,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}
