//! End-to-end git fetches against local upstream repositories

use std::fs;

use pretty_assertions::assert_eq;
use tempfile::TempDir;
use vendo_cache::{CacheConfig, CacheStatus, ContentCache};
use vendo_git::{Error, GitFetch};
use vendo_meta::version::{SemverSelection, VersionSelection};
use vendo_test_utils::git::Upstream;

struct Fixture {
    root: TempDir,
    upstream: Upstream,
}

impl Fixture {
    fn new() -> Self {
        let root = TempDir::new().unwrap();
        let upstream = Upstream::init(&root.path().join("upstream"));
        Self { root, upstream }
    }

    fn run(&self, name: &str, fetch: GitFetch<'_>) -> (std::path::PathBuf, vendo_git::Result<vendo_git::GitOutcome>) {
        let work = self.root.path().join(format!("work-{name}"));
        let dest = self.root.path().join(format!("dest-{name}"));
        let result = fetch.run(&work, &dest);
        (dest, result)
    }
}

#[test]
fn fetches_branch_without_git_metadata() {
    let fx = Fixture::new();
    let sha = fx.upstream.commit(&[("README.md", "hello"), ("src/lib.rs", "fn x() {}")], "Initial");

    let url = fx.upstream.url();
    let mut fetch = GitFetch::new(&url);
    fetch.reference = Some("origin/main");
    let (dest, result) = fx.run("branch", fetch);
    let outcome = result.unwrap();

    assert_eq!(outcome.sha, sha);
    assert_eq!(outcome.commit_title, "Initial");
    assert_eq!(fs::read_to_string(dest.join("README.md")).unwrap(), "hello");
    assert!(dest.join("src/lib.rs").exists());
    assert!(!dest.join(".git").exists());
}

#[test]
fn fetches_tag_and_sha() {
    let fx = Fixture::new();
    let first = fx.upstream.commit(&[("v.txt", "1")], "First");
    fx.upstream.annotated_tag("v1.0.0", "Release 1");
    fx.upstream.commit(&[("v.txt", "2")], "Second");

    let url = fx.upstream.url();
    let mut by_tag = GitFetch::new(&url);
    by_tag.reference = Some("v1.0.0");
    let (dest, result) = fx.run("tag", by_tag);
    let outcome = result.unwrap();
    assert_eq!(outcome.sha, first);
    assert_eq!(outcome.tags, vec!["v1.0.0".to_string()]);
    assert_eq!(fs::read_to_string(dest.join("v.txt")).unwrap(), "1");

    let mut by_sha = GitFetch::new(&url);
    by_sha.reference = Some(&first[..10]);
    let (_, result) = fx.run("sha", by_sha);
    assert_eq!(result.unwrap().sha, first);
}

#[test]
fn ref_selection_picks_highest_matching_tag() {
    let fx = Fixture::new();
    for version in ["v1.0.0", "v1.2.0", "v2.0.0"] {
        fx.upstream.commit(&[("version", version)], version);
        fx.upstream.tag(version);
    }

    let selection = VersionSelection {
        semver: Some(SemverSelection {
            constraints: "<2.0.0".to_string(),
            prereleases: None,
        }),
    };
    let url = fx.upstream.url();
    let mut fetch = GitFetch::new(&url);
    fetch.selection = Some(&selection);
    let (dest, result) = fx.run("select", fetch);

    let outcome = result.unwrap();
    assert_eq!(outcome.reference, "v1.2.0");
    assert_eq!(fs::read_to_string(dest.join("version")).unwrap(), "v1.2.0");
}

#[test]
fn unknown_ref_fails() {
    let fx = Fixture::new();
    fx.upstream.commit(&[("a", "a")], "A");
    let url = fx.upstream.url();
    let mut fetch = GitFetch::new(&url);
    fetch.reference = Some("does-not-exist");
    let (dest, result) = fx.run("missing", fetch);
    assert!(matches!(result, Err(Error::RefNotFound { .. })));
    assert!(!dest.exists());
}

#[test]
fn submodules_are_initialized_unless_skipped() {
    let fx = Fixture::new();
    let library = Upstream::init(&fx.root.path().join("carvel-vendir-src"));
    library.commit(&[("go.mod", "module example")], "Library");
    fx.upstream.commit(&[("README.md", "main")], "Main");
    fx.upstream.add_submodule(&library, "carvel-vendir");

    let url = fx.upstream.url();
    let mut fetch = GitFetch::new(&url);
    fetch.reference = Some("main");
    let (dest, result) = fx.run("with", fetch);
    result.unwrap();
    assert!(dest.join("carvel-vendir/go.mod").exists());

    fetch.init_submodules = false;
    let (dest, result) = fx.run("without", fetch);
    result.unwrap();
    assert!(!dest.join("carvel-vendir/go.mod").exists());
}

#[test]
fn second_fetch_is_served_from_cache() {
    let fx = Fixture::new();
    let sha = fx.upstream.commit(&[("a.txt", "cached")], "Cached");
    fx.upstream.tag("v0.1.0");

    let cache = ContentCache::open(CacheConfig::new(fx.root.path().join("cache"), 10_000_000)).unwrap();
    let url = fx.upstream.url();
    let mut fetch = GitFetch::new(&url);
    fetch.reference = Some("v0.1.0");
    fetch.cache = Some(&cache);

    let (_, first) = fx.run("first", fetch);
    let first = first.unwrap();
    assert_eq!(first.cache, CacheStatus::Stored);

    let (dest, second) = fx.run("second", fetch);
    let second = second.unwrap();
    assert_eq!(second.cache, CacheStatus::Hit);
    assert_eq!(second.sha, sha);
    assert_eq!(fs::read_to_string(dest.join("a.txt")).unwrap(), "cached");
}

#[test]
fn tiny_cache_skips_storing() {
    let fx = Fixture::new();
    fx.upstream.commit(&[("a.txt", "a")], "A");

    let cache = ContentCache::open(CacheConfig::new(fx.root.path().join("cache"), 10)).unwrap();
    let url = fx.upstream.url();
    let mut fetch = GitFetch::new(&url);
    fetch.reference = Some("main");
    fetch.cache = Some(&cache);

    let (_, result) = fx.run("tiny", fetch);
    assert!(matches!(result.unwrap().cache, CacheStatus::Skipped { .. }));
}
