//! The `Config` document
//!
//! # Example YAML
//!
//! ```yaml
//! apiVersion: vendo.dev/v1alpha1
//! kind: Config
//! directories:
//! - path: vendor
//!   contents:
//!   - path: lib
//!     git:
//!       url: https://example.com/lib.git
//!       ref: v1.2.0
//!     includePaths: ["src/**/*"]
//! ```

use serde::Deserialize;

use super::source::{
    BundleSource, DirectorySource, GitSource, HelmChartSource, HgSource, HttpSource, ImageSource,
    InlineSource, SourceSpec,
};

/// Top-level sync configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub api_version: String,
    pub kind: String,
    /// Oldest vendo release able to honour this config
    #[serde(default)]
    pub minimum_required_version: Option<String>,
    #[serde(default)]
    pub directories: Vec<DirectorySpec>,
}

/// A destination directory and the ordered contents assembled into it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DirectorySpec {
    pub path: String,
    #[serde(default)]
    pub contents: Vec<ContentSpec>,
}

/// One source-to-destination mapping within a directory.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawContentSpec")]
pub struct ContentSpec {
    /// Path relative to the owning directory
    pub path: String,
    pub source: SourceSpec,
    pub include_paths: Vec<String>,
    pub exclude_paths: Vec<String>,
    pub legal_paths: Vec<String>,
    pub new_root_path: Option<String>,
}

/// Wire form of a content entry: every source kind is an optional key and
/// exactly one must be present.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawContentSpec {
    path: String,
    git: Option<GitSource>,
    hg: Option<HgSource>,
    http: Option<HttpSource>,
    image: Option<ImageSource>,
    imgpkg_bundle: Option<BundleSource>,
    helm_chart: Option<HelmChartSource>,
    inline: Option<InlineSource>,
    directory: Option<DirectorySource>,
    #[serde(default)]
    include_paths: Vec<String>,
    #[serde(default)]
    exclude_paths: Vec<String>,
    #[serde(default)]
    legal_paths: Vec<String>,
    #[serde(default)]
    new_root_path: Option<String>,
}

impl TryFrom<RawContentSpec> for ContentSpec {
    type Error = String;

    fn try_from(raw: RawContentSpec) -> Result<Self, Self::Error> {
        let mut sources: Vec<SourceSpec> = Vec::with_capacity(1);
        sources.extend(raw.git.map(SourceSpec::Git));
        sources.extend(raw.hg.map(SourceSpec::Hg));
        sources.extend(raw.http.map(SourceSpec::Http));
        sources.extend(raw.image.map(SourceSpec::Image));
        sources.extend(raw.imgpkg_bundle.map(SourceSpec::ImgpkgBundle));
        sources.extend(raw.helm_chart.map(SourceSpec::HelmChart));
        sources.extend(raw.inline.map(SourceSpec::Inline));
        sources.extend(raw.directory.map(SourceSpec::Directory));

        if sources.len() != 1 {
            return Err(format!(
                "Expected exactly one source for content '{}', found {} ({})",
                raw.path,
                sources.len(),
                sources
                    .iter()
                    .map(SourceSpec::kind_name)
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }

        Ok(Self {
            path: raw.path,
            source: sources.remove(0),
            include_paths: raw.include_paths,
            exclude_paths: raw.exclude_paths,
            legal_paths: raw.legal_paths,
            new_root_path: raw.new_root_path,
        })
    }
}
