//! Image references: `[registry/]repository[:tag][@digest]`

use std::fmt;

use crate::{Error, Result};

pub const DOCKER_HUB: &str = "index.docker.io";
const DOCKER_HUB_ALIASES: [&str; 2] = ["docker.io", "registry-1.docker.io"];
const DEFAULT_TAG: &str = "latest";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageRef {
    pub registry: String,
    pub repository: String,
    pub tag: Option<String>,
    pub digest: Option<String>,
}

impl ImageRef {
    /// Parse a reference the way container tooling does: the first path
    /// component is a registry only if it looks like a host (`.`, `:` or
    /// `localhost`); otherwise Docker Hub is implied.
    pub fn parse(reference: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidReference {
            reference: reference.to_string(),
            reason: reason.to_string(),
        };

        let reference_trimmed = reference.trim();
        if reference_trimmed.is_empty() {
            return Err(invalid("empty reference"));
        }

        let (name, digest) = match reference_trimmed.split_once('@') {
            Some((name, digest)) => {
                if !digest.starts_with(vendo_fs::checksum::PREFIX) {
                    return Err(invalid("only sha256 digests are supported"));
                }
                (name, Some(digest.to_string()))
            }
            None => (reference_trimmed, None),
        };

        // A tag colon can only appear after the last slash
        let last_slash = name.rfind('/').map(|i| i + 1).unwrap_or(0);
        let (name, tag) = match name[last_slash..].rfind(':') {
            Some(i) => (&name[..last_slash + i], Some(name[last_slash + i + 1..].to_string())),
            None => (name, None),
        };
        if tag.as_deref() == Some("") {
            return Err(invalid("empty tag"));
        }

        let (registry, repository) = match name.split_once('/') {
            Some((host, rest))
                if host.contains('.') || host.contains(':') || host == "localhost" =>
            {
                (host.to_string(), rest.to_string())
            }
            _ => (DOCKER_HUB.to_string(), name.to_string()),
        };
        if repository.is_empty() {
            return Err(invalid("missing repository"));
        }

        let registry = if DOCKER_HUB_ALIASES.contains(&registry.as_str()) {
            DOCKER_HUB.to_string()
        } else {
            registry
        };
        let repository = if registry == DOCKER_HUB && !repository.contains('/') {
            format!("library/{repository}")
        } else {
            repository
        };

        Ok(Self {
            registry,
            repository,
            tag,
            digest,
        })
    }

    /// Tag or digest to request the manifest by.
    pub fn manifest_reference(&self) -> &str {
        self.digest
            .as_deref()
            .or(self.tag.as_deref())
            .unwrap_or(DEFAULT_TAG)
    }

    /// `registry/repository` without tag or digest.
    pub fn name(&self) -> String {
        format!("{}/{}", self.registry, self.repository)
    }

    /// Same repository pinned to `digest`.
    pub fn pinned(&self, digest: &str) -> Self {
        Self {
            registry: self.registry.clone(),
            repository: self.repository.clone(),
            tag: None,
            digest: Some(digest.to_string()),
        }
    }

    pub fn with_tag(&self, tag: &str) -> Self {
        Self {
            tag: Some(tag.to_string()),
            ..self.clone()
        }
    }

    /// Local registries are spoken to over plain HTTP.
    pub fn scheme(&self) -> &'static str {
        let host = self.registry.split(':').next().unwrap_or_default();
        if host == "localhost" || host == "127.0.0.1" {
            "http"
        } else {
            "https"
        }
    }

    /// Base URL of this repository's registry API.
    pub fn api_base(&self) -> String {
        format!("{}://{}/v2/{}", self.scheme(), self.registry, self.repository)
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.registry, self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{tag}")?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("nginx", DOCKER_HUB, "library/nginx", None, None)]
    #[case("docker.io/org/app:1.2", DOCKER_HUB, "org/app", Some("1.2"), None)]
    #[case("ghcr.io/org/app", "ghcr.io", "org/app", None, None)]
    #[case("localhost:5000/app:v1", "localhost:5000", "app", Some("v1"), None)]
    #[case("reg.io/a/b/c@sha256:abc", "reg.io", "a/b/c", None, Some("sha256:abc"))]
    #[case("reg.io/app:v1@sha256:abc", "reg.io", "app", Some("v1"), Some("sha256:abc"))]
    fn parses(
        #[case] input: &str,
        #[case] registry: &str,
        #[case] repository: &str,
        #[case] tag: Option<&str>,
        #[case] digest: Option<&str>,
    ) {
        let parsed = ImageRef::parse(input).unwrap();
        assert_eq!(parsed.registry, registry);
        assert_eq!(parsed.repository, repository);
        assert_eq!(parsed.tag.as_deref(), tag);
        assert_eq!(parsed.digest.as_deref(), digest);
    }

    #[rstest]
    #[case("")]
    #[case("app:")]
    #[case("app@md5:abc")]
    fn rejects(#[case] input: &str) {
        assert!(ImageRef::parse(input).is_err());
    }

    #[test]
    fn localhost_uses_http() {
        assert_eq!(ImageRef::parse("localhost:5000/app").unwrap().scheme(), "http");
        assert_eq!(ImageRef::parse("reg.io/app").unwrap().scheme(), "https");
    }

    #[test]
    fn pinned_display() {
        let image = ImageRef::parse("reg.io/app:v1").unwrap();
        assert_eq!(image.pinned("sha256:abc").to_string(), "reg.io/app@sha256:abc");
        assert_eq!(image.manifest_reference(), "v1");
    }
}
