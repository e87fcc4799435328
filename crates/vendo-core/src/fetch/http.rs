//! HTTP(S) downloads, optionally unpacked

use std::fs::{self, File};
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use vendo_fs::ArchiveKind;
use vendo_meta::schema::HttpLock;
use vendo_meta::{HttpSource, LockedSource};

use super::{FetchContext, FetchResult};
use crate::{Error, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(300);
const FALLBACK_FILE_NAME: &str = "download";

pub(super) fn fetch(ctx: &FetchContext<'_>, http: &HttpSource, work: &Path, dest: &Path) -> Result<FetchResult> {
    fs::create_dir_all(work).map_err(|e| vendo_fs::Error::io(work, e))?;
    let file_name = file_name(&http.url);
    let download = work.join(&file_name);

    let authorization = match &http.secret_ref {
        Some(secret) => {
            let entries = ctx.secret_entries(&secret.name)?;
            let text = |key: &str| entries.get(key).map(|v| String::from_utf8_lossy(v).into_owned());
            match (text("username"), text("password")) {
                (Some(username), Some(password)) => {
                    Some(format!("Basic {}", STANDARD.encode(format!("{username}:{password}"))))
                }
                _ => None,
            }
        }
        None => None,
    };

    download_to(&http.url, authorization.as_deref(), &download)?;

    let sha256 = vendo_fs::checksum::file_sha256_hex(&download)?;
    if let Some(expected) = &http.sha256 {
        vendo_fs::checksum::verify_file(&download, expected)?;
    }
    tracing::info!(url = %http.url, sha256 = %sha256, "Downloaded");

    let kind = if http.disable_unpack {
        None
    } else {
        match ArchiveKind::from_name(&file_name) {
            Some(kind) => Some(kind),
            None => ArchiveKind::sniff(&download)?,
        }
    };

    match kind {
        Some(kind) => vendo_fs::archive::unpack(&download, kind, dest)?,
        None => {
            fs::create_dir_all(dest).map_err(|e| vendo_fs::Error::io(dest, e))?;
            let target = dest.join(&file_name);
            fs::copy(&download, &target).map_err(|e| vendo_fs::Error::io(&target, e))?;
        }
    }

    Ok(FetchResult::remote(LockedSource::Http(HttpLock { sha256 }), Vec::new()))
}

fn download_to(url: &str, authorization: Option<&str>, dest: &Path) -> Result<()> {
    let failed = |reason: String| Error::Http {
        url: url.to_string(),
        reason,
    };

    let mut request = agent().get(url);
    if let Some(authorization) = authorization {
        request = request.header("Authorization", authorization);
    }
    let response = request.call().map_err(|e| failed(e.to_string()))?;

    let mut file = File::create(dest).map_err(|e| vendo_fs::Error::io(dest, e))?;
    std::io::copy(&mut response.into_body().into_reader(), &mut file)
        .map_err(|e| failed(e.to_string()))?;
    Ok(())
}

fn agent() -> &'static ureq::Agent {
    static AGENT: OnceLock<ureq::Agent> = OnceLock::new();
    AGENT.get_or_init(|| {
        let config = ureq::Agent::config_builder()
            .timeout_connect(Some(CONNECT_TIMEOUT))
            .timeout_recv_response(Some(RESPONSE_TIMEOUT))
            .build();
        ureq::Agent::new_with_config(config)
    })
}

/// Last path segment of `url`, without query or fragment.
fn file_name(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let path = path.split_once("://").map_or(path, |(_, rest)| rest);
    match path.split_once('/') {
        Some((_, path)) => path
            .rsplit('/')
            .find(|s| !s.is_empty())
            .unwrap_or(FALLBACK_FILE_NAME)
            .to_string(),
        None => FALLBACK_FILE_NAME.to_string(),
    }
}
