//! Reference resolution, remotely (before fetching) and locally (after)

use git2::{Direction, ObjectType, Oid, Remote, Repository};

use crate::fetch::Credentials;
use crate::{Error, Result};

const TAGS_PREFIX: &str = "refs/tags/";
const HEADS_PREFIX: &str = "refs/heads/";
const PEELED_SUFFIX: &str = "^{}";

/// A ref advertised by a remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRef {
    pub name: String,
    pub oid: Oid,
}

/// A reference resolved in a fetched repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    pub commit: Oid,
    /// Annotated tag object the reference named, if any
    pub tag: Option<Oid>,
}

/// List the refs a remote advertises, without fetching objects.
pub fn list_remote(url: &str, credentials: Option<&Credentials>) -> Result<Vec<RemoteRef>> {
    let mut remote = Remote::create_detached(url)?;
    let callbacks = crate::fetch::remote_callbacks(credentials);
    let connection = remote
        .connect_auth(Direction::Fetch, Some(callbacks), None)
        .map_err(|e| Error::FetchFailed {
            url: url.to_string(),
            message: e.message().to_string(),
        })?;

    let refs = connection
        .list()?
        .iter()
        .map(|head| RemoteRef {
            name: head.name().to_string(),
            oid: head.oid(),
        })
        .collect();
    Ok(refs)
}

/// Tag names a remote advertises.
pub fn remote_tags(refs: &[RemoteRef]) -> Vec<String> {
    refs.iter()
        .filter_map(|r| r.name.strip_prefix(TAGS_PREFIX))
        .filter(|name| !name.ends_with(PEELED_SUFFIX))
        .map(str::to_string)
        .collect()
}

/// The object id a reference currently points at on the remote.
///
/// For annotated tags this is the tag object, so a re-pointed or re-signed
/// tag changes identity. Abbreviated SHAs cannot be resolved remotely.
pub fn remote_identity(refs: &[RemoteRef], reference: &str) -> Option<Oid> {
    if is_full_sha(reference) {
        return Oid::from_str(reference).ok();
    }
    let branch = reference.strip_prefix("origin/").unwrap_or(reference);
    let candidates = [
        format!("{TAGS_PREFIX}{reference}"),
        format!("{HEADS_PREFIX}{branch}"),
        reference.to_string(),
    ];
    candidates
        .iter()
        .find_map(|name| refs.iter().find(|r| &r.name == name))
        .map(|r| r.oid)
}

/// Resolve `reference` in a fetched repository.
///
/// Tried in order: commit SHA (full or abbreviated), tag, `origin/<branch>`
/// or bare branch name, then any other revision expression.
pub fn resolve_local(repo: &Repository, reference: &str, url: &str) -> Result<Resolved> {
    let not_found = || Error::RefNotFound {
        reference: reference.to_string(),
        url: url.to_string(),
    };

    if looks_like_sha(reference)
        && let Ok(object) = repo.revparse_single(reference)
        && let Ok(commit) = object.peel_to_commit()
    {
        return Ok(Resolved {
            commit: commit.id(),
            tag: None,
        });
    }

    if let Ok(tag_ref) = repo.find_reference(&format!("{TAGS_PREFIX}{reference}"))
        && let Some(target) = tag_ref.target()
    {
        let object = repo.find_object(target, None)?;
        let tag = (object.kind() == Some(ObjectType::Tag)).then_some(target);
        let commit = object.peel_to_commit()?;
        return Ok(Resolved {
            commit: commit.id(),
            tag,
        });
    }

    let branch = reference.strip_prefix("origin/").unwrap_or(reference);
    if let Ok(branch_ref) = repo.find_reference(&format!("refs/remotes/origin/{branch}")) {
        let commit = branch_ref.peel_to_commit()?;
        return Ok(Resolved {
            commit: commit.id(),
            tag: None,
        });
    }

    let object = repo.revparse_single(reference).map_err(|_| not_found())?;
    let commit = object.peel_to_commit().map_err(|_| not_found())?;
    Ok(Resolved {
        commit: commit.id(),
        tag: None,
    })
}

/// Names of the local tags that point (after peeling) at `commit`.
pub fn tags_pointing_at(repo: &Repository, commit: Oid) -> Result<Vec<String>> {
    let names = repo.tag_names(None)?;
    let mut tags: Vec<String> = names
        .iter()
        .flatten()
        .filter(|name| {
            repo.revparse_single(&format!("{TAGS_PREFIX}{name}"))
                .and_then(|object| object.peel_to_commit())
                .is_ok_and(|c| c.id() == commit)
        })
        .map(str::to_string)
        .collect();
    tags.sort();
    Ok(tags)
}

fn is_full_sha(reference: &str) -> bool {
    reference.len() == 40 && reference.chars().all(|c| c.is_ascii_hexdigit())
}

fn looks_like_sha(reference: &str) -> bool {
    (7..=40).contains(&reference.len()) && reference.chars().all(|c| c.is_ascii_hexdigit())
}
