use std::path::Path;

use vendo_git::{Credentials, GitFetch, Verifier};
use vendo_meta::schema::GitLock;
use vendo_meta::{GitSource, LockedSource};

use super::{CacheEvent, FetchContext, FetchResult};
use crate::Result;

pub(super) fn fetch(ctx: &FetchContext<'_>, git: &GitSource, work: &Path, dest: &Path) -> Result<FetchResult> {
    let credentials = git
        .secret_ref
        .as_ref()
        .map(|r| ctx.secret_entries(&r.name))
        .transpose()?
        .map(|entries| Credentials::from_entries(&entries));

    let verifier = match &git.verification {
        Some(verification) => {
            let entries = ctx.secret_entries(&verification.public_keys_secret_ref.name)?;
            let texts: Vec<(&str, String)> = entries
                .iter()
                .map(|(name, value)| (name.as_str(), String::from_utf8_lossy(value).into_owned()))
                .collect();
            let verifier = Verifier::from_armored(texts.iter().map(|(n, t)| (*n, t.as_str())))?;
            tracing::debug!(keys = verifier.len(), "Loaded trusted keys");
            Some(verifier)
        }
        None => None,
    };

    let mut request = GitFetch::new(&git.url);
    request.reference = git.git_ref.as_deref();
    request.selection = git.ref_selection.as_ref();
    request.credentials = credentials.as_ref();
    request.verifier = verifier.as_ref();
    request.init_submodules = !git.skip_init_submodules;
    request.cache = ctx.cache;

    let outcome = request.run(work, dest)?;
    tracing::info!(url = %git.url, sha = %outcome.sha, reference = %outcome.reference, "Fetched git repository");

    Ok(FetchResult::remote(
        LockedSource::Git(GitLock {
            sha: outcome.sha,
            commit_title: outcome.commit_title,
            tags: outcome.tags,
        }),
        vec![CacheEvent {
            subject: format!("git {}", git.url),
            status: outcome.cache,
        }],
    ))
}
