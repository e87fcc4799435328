//! Mercurial sources, fetched with the `hg` tool

use std::ffi::OsStr;
use std::fs;
use std::path::Path;

use vendo_meta::schema::HgLock;
use vendo_meta::{HgSource, LockedSource};

use super::tool::run;
use super::{FetchContext, FetchResult};
use crate::Result;

const DEFAULT_REF: &str = "default";

pub(super) fn fetch(ctx: &FetchContext<'_>, hg: &HgSource, work: &Path, dest: &Path) -> Result<FetchResult> {
    let repo = work.join("repo");
    fs::create_dir_all(&repo).map_err(|e| vendo_fs::Error::io(&repo, e))?;

    // Ignore user and system hgrc files
    let envs: [(&str, &OsStr); 2] = [("HGPLAIN", OsStr::new("1")), ("HGRCPATH", OsStr::new(""))];
    let hg_bin = ctx.tools.hg.as_path();

    run(hg_bin, ["init", "."], &repo, &envs)?;

    let mut hgrc = format!("[paths]\ndefault = {}\n", hg.url);
    if let Some(secret) = &hg.secret_ref {
        let entries = ctx.secret_entries(&secret.name)?;
        let text = |key: &str| entries.get(key).map(|v| String::from_utf8_lossy(v).into_owned());
        if let (Some(username), Some(password)) = (text("username"), text("password")) {
            hgrc.push_str(&format!(
                "\n[auth]\nvendo.prefix = {}\nvendo.username = {username}\nvendo.password = {password}\n",
                hg.url
            ));
        }
    }
    vendo_fs::io::write_text(&repo.join(".hg").join("hgrc"), &hgrc)?;

    run(hg_bin, ["pull"], &repo, &envs)?;
    let reference = hg.hg_ref.as_deref().unwrap_or(DEFAULT_REF);
    run(hg_bin, ["update", "--clean", "--rev", reference], &repo, &envs)?;
    let sha = run(hg_bin, ["log", "--rev", ".", "--template", "{node}"], &repo, &envs)?;
    tracing::info!(url = %hg.url, reference, sha = %sha, "Fetched hg repository");

    vendo_fs::copy::copy_dir_filtered(&repo, dest, |relative| {
        relative == Path::new(".hg") || relative == Path::new(".hg_archival.txt")
    })?;

    Ok(FetchResult::remote(LockedSource::Hg(HgLock { sha }), Vec::new()))
}
