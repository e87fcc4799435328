//! Registry access
//!
//! [`Registry`] is the seam between the fetchers and the network.
//! [`HttpRegistry`] speaks the distribution API over `ureq`, handling
//! anonymous or credentialed bearer tokens and basic auth challenges.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::path::Path;
use std::sync::{LazyLock, Mutex, OnceLock};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use regex::Regex;
use serde::Deserialize;
use ureq::Body;
use ureq::http::Response;

use crate::manifest::MANIFEST_ACCEPT;
use crate::reference::ImageRef;
use crate::{Error, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(120);
const MAX_TAG_PAGES: usize = 100;

static CHALLENGE_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(\w+)="([^"]*)""#).expect("Invalid challenge regex"));

static NEXT_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<([^>]+)>\s*;\s*rel="?next"?"#).expect("Invalid link header regex")
});

/// A manifest as served by a registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedManifest {
    pub media_type: String,
    pub body: Vec<u8>,
}

/// Read access to OCI registries.
pub trait Registry: Send + Sync {
    /// Manifest or index for `image` (by digest if pinned, else tag).
    fn manifest(&self, image: &ImageRef) -> Result<FetchedManifest>;

    /// Write blob `digest` of `image`'s repository to `dest`. Integrity is
    /// checked by the caller.
    fn blob(&self, image: &ImageRef, digest: &str, dest: &Path) -> Result<()>;

    /// All tags of `image`'s repository.
    fn tags(&self, image: &ImageRef) -> Result<Vec<String>>;
}

/// Username and password taken from a Secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryCredentials {
    pub username: String,
    pub password: String,
}

impl RegistryCredentials {
    /// `username` and `password` entries of a Secret, if both are present.
    pub fn from_entries(entries: &BTreeMap<String, Vec<u8>>) -> Option<Self> {
        let text = |key: &str| entries.get(key).map(|v| String::from_utf8_lossy(v).into_owned());
        Some(Self {
            username: text("username")?,
            password: text("password")?,
        })
    }

    fn basic(&self) -> String {
        let encoded = STANDARD.encode(format!("{}:{}", self.username, self.password));
        format!("Basic {encoded}")
    }
}

#[derive(Debug, Clone, Default)]
pub struct RegistryOptions {
    pub credentials: Option<RegistryCredentials>,
    pub insecure_skip_tls_verify: bool,
}

/// Distribution API client.
pub struct HttpRegistry {
    agent: &'static ureq::Agent,
    credentials: Option<RegistryCredentials>,
    /// `Authorization` header values per `registry/repository`
    authorizations: Mutex<HashMap<String, String>>,
}

impl HttpRegistry {
    pub fn new(options: RegistryOptions) -> Self {
        if options.insecure_skip_tls_verify {
            tracing::warn!("TLS verification disabled for registry access");
        }
        Self {
            agent: http_agent(options.insecure_skip_tls_verify),
            credentials: options.credentials,
            authorizations: Mutex::new(HashMap::new()),
        }
    }

    fn cached_authorization(&self, key: &str) -> Option<String> {
        self.authorizations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
    }

    fn remember_authorization(&self, key: String, value: String) {
        self.authorizations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key, value);
    }

    /// GET `url`, answering one authentication challenge if needed.
    fn get(&self, image: &ImageRef, url: &str, accept: Option<&str>) -> Result<Response<Body>> {
        let key = image.name();
        let mut challenged = false;
        loop {
            let mut request = self.agent.get(url);
            if let Some(accept) = accept {
                request = request.header("Accept", accept);
            }
            if let Some(authorization) = self.cached_authorization(&key) {
                request = request.header("Authorization", authorization);
            }
            let response = request.call().map_err(|e| map_ureq_error(url, &e))?;

            match response.status().as_u16() {
                200..=299 => return Ok(response),
                401 if !challenged => {
                    challenged = true;
                    let challenge = response
                        .headers()
                        .get("www-authenticate")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    let authorization = self.authorize(image, url, &challenge)?;
                    self.remember_authorization(key.clone(), authorization);
                }
                401 | 403 => {
                    return Err(Error::Unauthorized {
                        url: url.to_string(),
                    });
                }
                404 => {
                    return Err(Error::NotFound {
                        url: url.to_string(),
                    });
                }
                status => {
                    return Err(Error::Http {
                        url: url.to_string(),
                        reason: format!("HTTP {status}"),
                    });
                }
            }
        }
    }

    fn authorize(&self, image: &ImageRef, url: &str, challenge: &str) -> Result<String> {
        let unauthorized = || Error::Unauthorized {
            url: url.to_string(),
        };
        let (scheme, params) = parse_challenge(challenge);

        match scheme.to_ascii_lowercase().as_str() {
            "basic" => self
                .credentials
                .as_ref()
                .map(RegistryCredentials::basic)
                .ok_or_else(unauthorized),
            "bearer" => {
                let realm = params.get("realm").ok_or_else(unauthorized)?;
                let scope = params
                    .get("scope")
                    .cloned()
                    .unwrap_or_else(|| format!("repository:{}:pull", image.repository));

                let mut request = self.agent.get(realm.as_str()).query("scope", &scope);
                if let Some(service) = params.get("service") {
                    request = request.query("service", service);
                }
                if let Some(credentials) = &self.credentials {
                    request = request.header("Authorization", credentials.basic());
                }
                let response = request.call().map_err(|e| map_ureq_error(realm, &e))?;
                if !response.status().is_success() {
                    return Err(unauthorized());
                }
                let body = response
                    .into_body()
                    .read_to_string()
                    .map_err(|e| map_ureq_error(realm, &e))?;
                let token: TokenResponse =
                    serde_json::from_str(&body).map_err(|e| Error::decode("token response", e))?;
                token
                    .token
                    .or(token.access_token)
                    .map(|t| format!("Bearer {t}"))
                    .ok_or_else(unauthorized)
            }
            _ => Err(unauthorized()),
        }
    }
}

impl Registry for HttpRegistry {
    fn manifest(&self, image: &ImageRef) -> Result<FetchedManifest> {
        let url = format!("{}/manifests/{}", image.api_base(), image.manifest_reference());
        let accept = MANIFEST_ACCEPT.join(", ");
        let response = self.get(image, &url, Some(&accept))?;
        let media_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response
            .into_body()
            .read_to_vec()
            .map_err(|e| map_ureq_error(&url, &e))?;
        Ok(FetchedManifest { media_type, body })
    }

    fn blob(&self, image: &ImageRef, digest: &str, dest: &Path) -> Result<()> {
        let url = format!("{}/blobs/{}", image.api_base(), digest);
        let response = self.get(image, &url, None)?;
        let mut file = File::create(dest).map_err(|e| vendo_fs::Error::io(dest, e))?;
        std::io::copy(&mut response.into_body().into_reader(), &mut file)
            .map_err(|e| vendo_fs::Error::io(dest, e))?;
        Ok(())
    }

    fn tags(&self, image: &ImageRef) -> Result<Vec<String>> {
        let mut tags = Vec::new();
        let mut url = format!("{}/tags/list", image.api_base());
        for _ in 0..MAX_TAG_PAGES {
            let response = self.get(image, &url, None)?;
            let next = response
                .headers()
                .get("link")
                .and_then(|v| v.to_str().ok())
                .and_then(next_link);
            let body = response
                .into_body()
                .read_to_string()
                .map_err(|e| map_ureq_error(&url, &e))?;
            let page: TagList =
                serde_json::from_str(&body).map_err(|e| Error::decode(format!("tags of {image}"), e))?;
            tags.extend(page.tags.unwrap_or_default());

            match next {
                Some(next) if next.starts_with('/') => {
                    url = format!("{}://{}{}", image.scheme(), image.registry, next);
                }
                Some(next) => url = next,
                None => break,
            }
        }
        tracing::debug!(image = %image.name(), count = tags.len(), "Listed tags");
        Ok(tags)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagList {
    tags: Option<Vec<String>>,
}

/// Split a `WWW-Authenticate` header into its scheme and parameters.
fn parse_challenge(header: &str) -> (String, HashMap<String, String>) {
    let header = header.trim();
    let (scheme, rest) = header.split_once(' ').unwrap_or((header, ""));
    let params = CHALLENGE_PARAM
        .captures_iter(rest)
        .map(|c| (c[1].to_ascii_lowercase(), c[2].to_string()))
        .collect();
    (scheme.to_string(), params)
}

/// Target of a `Link: <...>; rel="next"` header.
fn next_link(header: &str) -> Option<String> {
    NEXT_LINK
        .captures(header).map(|c| c[1].to_string())
}

/// Shared `ureq` agents; non-2xx statuses are returned, not raised, so
/// authentication challenges can be read.
fn http_agent(insecure: bool) -> &'static ureq::Agent {
    static SECURE: OnceLock<ureq::Agent> = OnceLock::new();
    static INSECURE: OnceLock<ureq::Agent> = OnceLock::new();
    let cell = if insecure { &INSECURE } else { &SECURE };
    cell.get_or_init(|| {
        let mut builder = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_connect(Some(CONNECT_TIMEOUT))
            .timeout_recv_response(Some(RESPONSE_TIMEOUT));
        if insecure {
            builder = builder.tls_config(
                ureq::tls::TlsConfig::builder()
                    .disable_verification(true)
                    .build(),
            );
        }
        ureq::Agent::new_with_config(builder.build())
    })
}

fn map_ureq_error(url: &str, err: &ureq::Error) -> Error {
    match err {
        ureq::Error::StatusCode(404) => Error::NotFound {
            url: url.to_owned(),
        },
        other => Error::Http {
            url: url.to_owned(),
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_bearer_challenge() {
        let (scheme, params) = parse_challenge(
            r#"Bearer realm="https://auth.docker.io/token",service="registry.docker.io",scope="repository:library/nginx:pull""#,
        );
        assert_eq!(scheme, "Bearer");
        assert_eq!(params["realm"], "https://auth.docker.io/token");
        assert_eq!(params["service"], "registry.docker.io");
        assert_eq!(params["scope"], "repository:library/nginx:pull");
    }

    #[test]
    fn parses_basic_challenge() {
        let (scheme, params) = parse_challenge(r#"Basic realm="Registry""#);
        assert_eq!(scheme, "Basic");
        assert_eq!(params["realm"], "Registry");
    }

    #[test]
    fn finds_next_link() {
        assert_eq!(
            next_link(r#"</v2/app/tags/list?n=100&last=v9>; rel="next""#).as_deref(),
            Some("/v2/app/tags/list?n=100&last=v9")
        );
        assert_eq!(next_link(""), None);
    }

    #[test]
    fn credentials_from_secret_entries() {
        let mut entries = BTreeMap::new();
        entries.insert("username".to_string(), b"user".to_vec());
        assert!(RegistryCredentials::from_entries(&entries).is_none());
        entries.insert("password".to_string(), b"pass".to_vec());
        let credentials = RegistryCredentials::from_entries(&entries).unwrap();
        assert_eq!(credentials.basic(), "Basic dXNlcjpwYXNz");
    }

    #[test]
    fn map_ureq_error_maps_404_to_not_found() {
        let mapped = map_ureq_error("https://reg.test/v2/x", &ureq::Error::StatusCode(404));
        assert!(matches!(mapped, Error::NotFound { .. }));
    }
}
