//! Source definitions, one per content kind

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::version::VersionSelection;

/// Reference to a companion document by name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceRef {
    pub name: String,
}

/// The closed set of source kinds a content entry can fetch from.
#[derive(Debug, Clone)]
pub enum SourceSpec {
    Git(GitSource),
    Hg(HgSource),
    Http(HttpSource),
    Image(ImageSource),
    ImgpkgBundle(BundleSource),
    HelmChart(HelmChartSource),
    Inline(InlineSource),
    Directory(DirectorySource),
}

impl SourceSpec {
    /// Manifest key of this source kind.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Git(_) => "git",
            Self::Hg(_) => "hg",
            Self::Http(_) => "http",
            Self::Image(_) => "image",
            Self::ImgpkgBundle(_) => "imgpkgBundle",
            Self::HelmChart(_) => "helmChart",
            Self::Inline(_) => "inline",
            Self::Directory(_) => "directory",
        }
    }

    /// Names of the Secrets this source reads, in declaration order.
    pub fn secret_names(&self) -> Vec<&str> {
        let refs: Vec<&ResourceRef> = match self {
            Self::Git(git) => git
                .secret_ref
                .iter()
                .chain(git.verification.iter().map(|v| &v.public_keys_secret_ref))
                .collect(),
            Self::Hg(hg) => hg.secret_ref.iter().collect(),
            Self::Http(http) => http.secret_ref.iter().collect(),
            Self::Image(image) => image.secret_ref.iter().collect(),
            Self::ImgpkgBundle(bundle) => bundle.secret_ref.iter().collect(),
            Self::HelmChart(chart) => chart
                .repository
                .iter()
                .filter_map(|r| r.secret_ref.as_ref())
                .collect(),
            Self::Inline(inline) => {
                return inline
                    .paths_from
                    .iter()
                    .filter_map(|p| p.secret_ref.as_ref())
                    .map(|r| r.name.as_str())
                    .collect();
            }
            Self::Directory(_) => Vec::new(),
        };
        refs.into_iter().map(|r| r.name.as_str()).collect()
    }

    /// Names of the ConfigMaps this source reads.
    pub fn config_map_names(&self) -> Vec<&str> {
        match self {
            Self::Inline(inline) => inline
                .paths_from
                .iter()
                .filter_map(|p| p.config_map_ref.as_ref())
                .map(|r| r.name.as_str())
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Git repository source.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GitSource {
    pub url: String,
    /// Branch, tag, `origin/<branch>` or commit SHA
    #[serde(default, rename = "ref")]
    pub git_ref: Option<String>,
    /// Select the highest tag matching a constraint instead of `ref`
    #[serde(default)]
    pub ref_selection: Option<VersionSelection>,
    /// Secret with `username` and `password` keys for HTTPS remotes
    #[serde(default)]
    pub secret_ref: Option<ResourceRef>,
    #[serde(default)]
    pub verification: Option<GitVerification>,
    #[serde(default)]
    pub skip_init_submodules: bool,
}

/// Signature verification settings for a git source.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GitVerification {
    /// Secret whose values hold ASCII-armored public keys
    pub public_keys_secret_ref: ResourceRef,
}

/// Mercurial repository source.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HgSource {
    pub url: String,
    #[serde(default, rename = "ref")]
    pub hg_ref: Option<String>,
    #[serde(default)]
    pub secret_ref: Option<ResourceRef>,
}

/// Archive or single file downloaded over HTTP(S).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HttpSource {
    pub url: String,
    /// Expected hex SHA-256 of the downloaded file
    #[serde(default)]
    pub sha256: Option<String>,
    /// Keep the downloaded file as-is instead of unpacking it
    #[serde(default)]
    pub disable_unpack: bool,
    #[serde(default)]
    pub secret_ref: Option<ResourceRef>,
}

/// OCI image whose layers are extracted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ImageSource {
    /// `registry/repo[:tag][@sha256:...]`
    pub url: String,
    #[serde(default)]
    pub tag_selection: Option<VersionSelection>,
    #[serde(default)]
    pub secret_ref: Option<ResourceRef>,
    #[serde(default, rename = "dangerousSkipTLSVerify")]
    pub dangerous_skip_tls_verify: bool,
}

/// OCI bundle (configuration plus references to further images).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BundleSource {
    pub image: String,
    #[serde(default)]
    pub tag_selection: Option<VersionSelection>,
    /// Also pull bundles referenced by this bundle, transitively
    #[serde(default)]
    pub recursive: bool,
    #[serde(default)]
    pub secret_ref: Option<ResourceRef>,
    #[serde(default, rename = "dangerousSkipTLSVerify")]
    pub dangerous_skip_tls_verify: bool,
}

/// Packaged Helm chart fetched with the `helm` tool.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HelmChartSource {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub repository: Option<HelmRepository>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HelmRepository {
    pub url: String,
    #[serde(default)]
    pub secret_ref: Option<ResourceRef>,
}

/// Literal file contents.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct InlineSource {
    /// Relative file path to file content
    #[serde(default)]
    pub paths: BTreeMap<String, String>,
    #[serde(default)]
    pub paths_from: Vec<InlineSourceRef>,
}

/// Inline content taken from a companion Secret or ConfigMap.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct InlineSourceRef {
    #[serde(default)]
    pub secret_ref: Option<InlineRef>,
    #[serde(default)]
    pub config_map_ref: Option<InlineRef>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct InlineRef {
    pub name: String,
    /// Subdirectory the referenced entries are written into
    #[serde(default)]
    pub directory_path: Option<String>,
}

/// Local directory copied as-is.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DirectorySource {
    pub path: String,
}
