//! Packaged Helm charts, pulled with the `helm` tool

use std::ffi::OsString;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use vendo_meta::schema::HelmChartLock;
use vendo_meta::{HelmChartSource, LockedSource};

use super::tool::run;
use super::{FetchContext, FetchResult};
use crate::{Error, Result};

const OCI_SCHEME: &str = "oci://";

/// The fields of `Chart.yaml` recorded in the lock.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMetadata {
    version: String,
    #[serde(default)]
    app_version: Option<String>,
}

pub(super) fn fetch(
    ctx: &FetchContext<'_>,
    chart: &HelmChartSource,
    work: &Path,
    dest: &Path,
) -> Result<FetchResult> {
    let untar = work.join("charts");
    let home = work.join("helm-home");
    for dir in [&untar, &home] {
        fs::create_dir_all(dir).map_err(|e| vendo_fs::Error::io(dir, e))?;
    }

    let mut args: Vec<OsString> = vec!["pull".into()];
    let repository = chart.repository.as_ref();
    match repository {
        Some(repo) if repo.url.starts_with(OCI_SCHEME) => {
            args.push(format!("{}/{}", repo.url.trim_end_matches('/'), chart.name).into());
        }
        Some(repo) => {
            args.push(chart.name.clone().into());
            args.push("--repo".into());
            args.push(repo.url.clone().into());
        }
        None => args.push(chart.name.clone().into()),
    }
    if let Some(version) = &chart.version {
        args.push("--version".into());
        args.push(version.into());
    }
    if let Some(secret) = repository.and_then(|r| r.secret_ref.as_ref()) {
        let entries = ctx.secret_entries(&secret.name)?;
        for key in ["username", "password"] {
            if let Some(value) = entries.get(key) {
                args.push(format!("--{key}").into());
                args.push(String::from_utf8_lossy(value).into_owned().into());
            }
        }
    }
    args.push("--untar".into());
    args.push("--untardir".into());
    args.push(untar.clone().into_os_string());

    // Keep repository caches and credentials out of the user's helm home
    let envs = [
        ("HELM_CACHE_HOME", home.join("cache").into_os_string()),
        ("HELM_CONFIG_HOME", home.join("config").into_os_string()),
        ("HELM_DATA_HOME", home.join("data").into_os_string()),
    ];
    let envs: Vec<(&str, &std::ffi::OsStr)> = envs.iter().map(|(k, v)| (*k, v.as_os_str())).collect();

    run(&ctx.tools.helm, &args, work, &envs)?;

    let chart_name = chart.name.rsplit('/').next().unwrap_or(&chart.name);
    let chart_dir = untar.join(chart_name);
    if !chart_dir.is_dir() {
        return Err(Error::Tool {
            tool: ctx.tools.helm.display().to_string(),
            message: format!("expected chart directory '{chart_name}' after pull"),
        });
    }

    let chart_yaml = chart_dir.join("Chart.yaml");
    let metadata: ChartMetadata = serde_yaml::from_str(&vendo_fs::io::read_text(&chart_yaml)?)
        .map_err(|e| Error::InvalidSource {
            message: format!("reading {}: {e}", chart_yaml.display()),
        })?;
    tracing::info!(chart = %chart.name, version = %metadata.version, "Fetched helm chart");

    vendo_fs::copy::copy_dir(&chart_dir, dest)?;

    Ok(FetchResult::remote(
        LockedSource::HelmChart(HelmChartLock {
            version: metadata.version,
            app_version: metadata.app_version,
        }),
        Vec::new(),
    ))
}
