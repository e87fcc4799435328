//! Fetching a git source into a staging directory

use std::cell::Cell;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use git2::build::CheckoutBuilder;
use git2::{
    AutotagOption, Cred, CredentialType, FetchOptions, RemoteCallbacks, Repository,
    SubmoduleUpdateOptions,
};
use vendo_cache::{CacheStatus, ContentCache};
use vendo_fs::ArchiveKind;
use vendo_meta::VersionSelection;

use crate::resolve::{self, Resolved};
use crate::signature::{ObjectKind, SignedObject};
use crate::verify::Verifier;
use crate::{Error, Result};

const FETCH_REFSPECS: [&str; 2] = [
    "+refs/heads/*:refs/remotes/origin/*",
    "+refs/tags/*:refs/tags/*",
];
const MAX_AUTH_ATTEMPTS: usize = 3;

/// Credentials taken from a Secret: `username` + `password` for HTTPS or
/// `ssh-privatekey` for SSH remotes.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
    pub ssh_private_key: Option<String>,
}

impl Credentials {
    pub fn from_entries(entries: &BTreeMap<String, Vec<u8>>) -> Self {
        let text = |key: &str| {
            entries
                .get(key)
                .map(|v| String::from_utf8_lossy(v).into_owned())
        };
        Self {
            username: text("username"),
            password: text("password"),
            ssh_private_key: text("ssh-privatekey"),
        }
    }
}

pub(crate) fn remote_callbacks(credentials: Option<&Credentials>) -> RemoteCallbacks<'_> {
    let mut callbacks = RemoteCallbacks::new();
    if let Some(credentials) = credentials {
        let attempts = Cell::new(0);
        callbacks.credentials(move |_url, username_from_url, allowed| {
            attempts.set(attempts.get() + 1);
            if attempts.get() > MAX_AUTH_ATTEMPTS {
                return Err(git2::Error::from_str("authentication failed"));
            }
            if allowed.contains(CredentialType::SSH_KEY)
                && let Some(key) = &credentials.ssh_private_key
            {
                let user = username_from_url
                    .or(credentials.username.as_deref())
                    .unwrap_or("git");
                return Cred::ssh_key_from_memory(user, None, key, None);
            }
            if allowed.contains(CredentialType::USER_PASS_PLAINTEXT)
                && let (Some(user), Some(password)) =
                    (&credentials.username, &credentials.password)
            {
                return Cred::userpass_plaintext(user, password);
            }
            Err(git2::Error::from_str("no usable credentials in secret"))
        });
    }
    callbacks
}

/// What a git fetch resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitOutcome {
    pub sha: String,
    pub commit_title: String,
    pub tags: Vec<String>,
    /// The reference that was resolved (after tag selection)
    pub reference: String,
    pub cache: CacheStatus,
}

/// A single git fetch.
#[derive(Debug, Clone, Copy)]
pub struct GitFetch<'a> {
    pub url: &'a str,
    pub reference: Option<&'a str>,
    pub selection: Option<&'a VersionSelection>,
    pub credentials: Option<&'a Credentials>,
    pub verifier: Option<&'a Verifier>,
    pub init_submodules: bool,
    pub cache: Option<&'a ContentCache>,
}

impl<'a> GitFetch<'a> {
    pub fn new(url: &'a str) -> Self {
        Self {
            url,
            reference: None,
            selection: None,
            credentials: None,
            verifier: None,
            init_submodules: true,
            cache: None,
        }
    }

    /// Fetch into `work` (scratch, owned by this call) and copy the checked
    /// out tree, without `.git` metadata, into `dest`.
    pub fn run(&self, work: &Path, dest: &Path) -> Result<GitOutcome> {
        fs::create_dir_all(work).map_err(|e| vendo_fs::Error::io(work, e))?;
        let repo_dir = work.join("repo");

        let refs = resolve::list_remote(self.url, self.credentials)?;
        let reference = match (self.reference, self.selection) {
            (Some(reference), _) => reference.to_string(),
            (None, Some(selection)) => selection.select(&resolve::remote_tags(&refs))?.to_string(),
            (None, None) => resolve::remote_identity(&refs, "HEAD")
                .map(|oid| oid.to_string())
                .ok_or_else(|| Error::RefNotFound {
                    reference: "HEAD".to_string(),
                    url: self.url.to_string(),
                })?,
        };
        tracing::debug!(url = %self.url, %reference, "Resolving git reference");

        let cache_key = self
            .cache
            .and(resolve::remote_identity(&refs, &reference))
            .map(|oid| format!("git:{}@{}", self.url, oid));

        let (repo, cache) = match (self.cache, cache_key.as_deref()) {
            (Some(cache), Some(key)) if restore_snapshot(cache, key, &repo_dir) => {
                tracing::info!(url = %self.url, key, "Using cached repository (unbundle)");
                (Repository::open(&repo_dir)?, CacheStatus::Hit)
            }
            (Some(cache), Some(key)) => {
                let repo = self.fetch_into(&repo_dir)?;
                let status = store_snapshot(cache, key, &repo_dir, work);
                (repo, status)
            }
            _ => (self.fetch_into(&repo_dir)?, CacheStatus::Disabled),
        };

        let resolved = resolve::resolve_local(&repo, &reference, self.url)?;
        if let Some(verifier) = self.verifier {
            verify_resolved(&repo, resolved, verifier)?;
        }

        let commit = repo.find_commit(resolved.commit)?;
        repo.set_head_detached(commit.id())?;
        repo.checkout_head(Some(CheckoutBuilder::new().force()))?;

        if self.init_submodules {
            update_submodules(&repo, self.credentials)?;
        }

        vendo_fs::copy::copy_dir_filtered(&repo_dir, dest, |relative| {
            relative.file_name().is_some_and(|name| name == ".git")
        })?;

        let outcome = GitOutcome {
            sha: commit.id().to_string(),
            commit_title: commit.summary().unwrap_or_default().to_string(),
            tags: resolve::tags_pointing_at(&repo, commit.id())?,
            reference,
            cache,
        };
        tracing::info!(url = %self.url, sha = %outcome.sha, "Fetched git repository");
        Ok(outcome)
    }

    fn fetch_into(&self, repo_dir: &Path) -> Result<Repository> {
        let repo = Repository::init(repo_dir)?;
        {
            let mut remote = repo.remote("origin", self.url)?;
            let mut options = FetchOptions::new();
            options.remote_callbacks(remote_callbacks(self.credentials));
            options.download_tags(AutotagOption::All);
            remote
                .fetch(&FETCH_REFSPECS, Some(&mut options), None)
                .map_err(|e| Error::FetchFailed {
                    url: self.url.to_string(),
                    message: e.message().to_string(),
                })?;
        }
        Ok(repo)
    }
}

/// Verify the annotated tag the reference named, or else the commit.
fn verify_resolved(repo: &Repository, resolved: Resolved, verifier: &Verifier) -> Result<()> {
    let (kind, oid) = match resolved.tag {
        Some(tag) => (ObjectKind::Tag, tag),
        None => (ObjectKind::Commit, resolved.commit),
    };
    let odb = repo.odb()?;
    let raw = odb.read(oid)?;
    let object = SignedObject::extract(kind, raw.data())?;
    verifier.verify(&object)
}

fn update_submodules(repo: &Repository, credentials: Option<&Credentials>) -> Result<()> {
    for mut submodule in repo.submodules()? {
        tracing::debug!(path = %submodule.path().display(), "Updating submodule");
        let mut fetch_options = FetchOptions::new();
        fetch_options.remote_callbacks(remote_callbacks(credentials));
        let mut options = SubmoduleUpdateOptions::new();
        options.fetch(fetch_options);
        submodule.update(true, Some(&mut options))?;

        let nested = submodule.open()?;
        update_submodules(&nested, credentials)?;
    }
    Ok(())
}

/// Unpack a cached snapshot into `repo_dir`. Any failure counts as a miss.
fn restore_snapshot(cache: &ContentCache, key: &str, repo_dir: &Path) -> bool {
    let artifact = match cache.get(key) {
        Ok(Some(artifact)) => artifact,
        Ok(None) => return false,
        Err(e) => {
            tracing::warn!(key, error = %e, "Cache lookup failed; fetching instead");
            return false;
        }
    };
    match vendo_fs::archive::unpack_reader(artifact.file, ArchiveKind::TarGz, Path::new(key), repo_dir) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(key, error = %e, "Cached repository unusable; fetching instead");
            vendo_fs::io::remove_dir_best_effort(repo_dir);
            false
        }
    }
}

fn store_snapshot(cache: &ContentCache, key: &str, repo_dir: &Path, work: &Path) -> CacheStatus {
    let archive = work.join("snapshot.tar.gz");
    if let Err(e) = vendo_fs::archive::pack_tar_gz(repo_dir, &archive) {
        tracing::warn!(key, error = %e, "Failed to snapshot repository for cache");
        return CacheStatus::Skipped {
            reason: e.to_string(),
        };
    }
    let status = cache.store_file(key, &archive).into();
    if let Err(e) = fs::remove_file(&archive) {
        tracing::debug!(error = %e, "Failed to remove snapshot archive");
    }
    status
}
