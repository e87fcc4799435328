//! The `LockConfig` document
//!
//! Mirrors the config's directory/content structure with the resolved,
//! immutable identifier of every content entry. Replaying a sync against a
//! lock pins each source to exactly what was fetched before.
//!
//! # Example YAML
//!
//! ```yaml
//! apiVersion: vendo.dev/v1alpha1
//! kind: LockConfig
//! directories:
//! - path: vendor
//!   contents:
//!   - path: lib
//!     git:
//!       sha: 3f786850e387550fdab836ed7e6dc881de23001b
//!       commitTitle: Release v1.2.0
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::source::SourceSpec;
use crate::{API_VERSION, Error, Result};

pub const LOCK_KIND: &str = "LockConfig";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockConfig {
    pub api_version: String,
    pub kind: String,
    #[serde(default)]
    pub directories: Vec<LockDirectory>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockDirectory {
    pub path: String,
    #[serde(default)]
    pub contents: Vec<LockContent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockContent {
    pub path: String,
    #[serde(flatten)]
    pub source: LockedSource,
}

/// Resolved identity of one fetched content entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LockedSource {
    Git(GitLock),
    Hg(HgLock),
    Http(HttpLock),
    Image(ImageLock),
    ImgpkgBundle(BundleLock),
    HelmChart(HelmChartLock),
    Inline(InlineLock),
    Directory(DirectoryLock),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitLock {
    pub sha: String,
    pub commit_title: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HgLock {
    pub sha: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpLock {
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageLock {
    /// Digest reference, `registry/repo@sha256:...`
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleLock {
    /// Digest reference, `registry/repo@sha256:...`
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelmChartLock {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineLock {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryLock {}

impl LockedSource {
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

    /// Short human-readable form of the resolved identifier.
    pub fn describe(&self) -> String {
        match self {
            Self::Git(git) => git.sha.clone(),
            Self::Hg(hg) => hg.sha.clone(),
            Self::Http(http) => format!("sha256:{}", http.sha256),
            Self::Image(image) => image.url.clone(),
            Self::ImgpkgBundle(bundle) => bundle.image.clone(),
            Self::HelmChart(chart) => chart.version.clone(),
            Self::Inline(_) => "inline".to_string(),
            Self::Directory(_) => "directory".to_string(),
        }
    }

    /// Replace the floating reference of `source` with this locked identity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockKindMismatch`] when the lock entry was recorded
    /// for a different source kind.
    pub fn pin(&self, source: &mut SourceSpec, content_path: &str) -> Result<()> {
        match (self, source) {
            (Self::Git(lock), SourceSpec::Git(git)) => {
                git.git_ref = Some(lock.sha.clone());
                git.ref_selection = None;
            }
            (Self::Hg(lock), SourceSpec::Hg(hg)) => {
                hg.hg_ref = Some(lock.sha.clone());
            }
            (Self::Http(lock), SourceSpec::Http(http)) => {
                http.sha256 = Some(lock.sha256.clone());
            }
            (Self::Image(lock), SourceSpec::Image(image)) => {
                image.url = lock.url.clone();
                image.tag_selection = None;
            }
            (Self::ImgpkgBundle(lock), SourceSpec::ImgpkgBundle(bundle)) => {
                bundle.image = lock.image.clone();
                bundle.tag_selection = None;
            }
            (Self::HelmChart(lock), SourceSpec::HelmChart(chart)) => {
                chart.version = Some(lock.version.clone());
            }
            (Self::Inline(_), SourceSpec::Inline(_))
            | (Self::Directory(_), SourceSpec::Directory(_)) => {}
            (locked, source) => {
                return Err(Error::LockKindMismatch {
                    path: content_path.to_string(),
                    expected: source.kind_name(),
                    found: locked.kind_name(),
                });
            }
        }
        Ok(())
    }
}

impl LockConfig {
    pub fn new(directories: Vec<LockDirectory>) -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: LOCK_KIND.to_string(),
            directories,
        }
    }

    /// Load a lock document from YAML.
    pub fn load(path: &Path) -> Result<Self> {
        let content = vendo_fs::io::read_text(path)?;
        let lock: Self = serde_yaml::from_str(&content).map_err(|e| Error::LockParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        if lock.kind != LOCK_KIND {
            return Err(Error::LockParse {
                path: path.to_path_buf(),
                message: format!("expected kind '{LOCK_KIND}', found '{}'", lock.kind),
            });
        }
        Ok(lock)
    }

    /// Render as YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| Error::InvalidConfig {
            message: format!("Serializing lock document: {e}"),
        })
    }

    /// Save atomically (temp file + rename).
    pub fn save(&self, path: &Path) -> Result<()> {
        vendo_fs::io::write_text(path, &self.to_yaml()?)?;
        Ok(())
    }

    /// Locked source of the content at `directory`/`content`.
    pub fn find(&self, directory: &str, content: &str) -> Option<&LockedSource> {
        let directory = vendo_fs::NormalizedPath::new(directory);
        let content = vendo_fs::NormalizedPath::new(content);
        self.directories
            .iter()
            .filter(|d| vendo_fs::NormalizedPath::new(&d.path) == directory)
            .flat_map(|d| d.contents.iter())
            .find(|c| vendo_fs::NormalizedPath::new(&c.path) == content)
            .map(|c| &c.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::source::GitSource;
    use pretty_assertions::assert_eq;

    fn sample() -> LockConfig {
        LockConfig::new(vec![LockDirectory {
            path: "vendor".to_string(),
            contents: vec![
                LockContent {
                    path: "lib".to_string(),
                    source: LockedSource::Git(GitLock {
                        sha: "3f786850e387550fdab836ed7e6dc881de23001b".to_string(),
                        commit_title: "Release".to_string(),
                        tags: vec!["v1.0.0".to_string()],
                    }),
                },
                LockContent {
                    path: "notes".to_string(),
                    source: LockedSource::Inline(InlineLock {}),
                },
            ],
        }])
    }

    #[test]
    fn yaml_uses_source_key_beside_path() {
        let yaml = sample().to_yaml().unwrap();
        assert!(yaml.contains("kind: LockConfig"));
        assert!(yaml.contains("git:"));
        assert!(yaml.contains("commitTitle: Release"));
        assert!(yaml.contains("inline: {}"));
    }

    #[test]
    fn save_and_load_preserve_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vendo.lock.yml");
        sample().save(&path).unwrap();

        assert_eq!(LockConfig::load(&path).unwrap(), sample());
    }

    #[test]
    fn find_normalizes_paths() {
        let lock = sample();
        assert!(lock.find("./vendor/", "lib").is_some());
        assert!(lock.find("vendor", "missing").is_none());
    }

    #[test]
    fn pin_replaces_git_ref_and_selection() {
        let mut source = SourceSpec::Git(GitSource {
            url: "https://example.com/lib.git".to_string(),
            git_ref: Some("main".to_string()),
            ..Default::default()
        });
        let locked = lock_git();
        locked.pin(&mut source, "lib").unwrap();

        let SourceSpec::Git(git) = source else {
            panic!("expected git source");
        };
        assert_eq!(git.git_ref.as_deref(), Some("abc123"));
    }

    #[test]
    fn pin_rejects_kind_mismatch() {
        let mut source = SourceSpec::Inline(Default::default());
        let err = lock_git().pin(&mut source, "lib").unwrap_err();
        assert!(err.to_string().contains("is a git lock, expected inline"), "{err}");
    }

    fn lock_git() -> LockedSource {
        LockedSource::Git(GitLock {
            sha: "abc123".to_string(),
            commit_title: String::new(),
            tags: Vec::new(),
        })
    }
}
