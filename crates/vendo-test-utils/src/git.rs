//! Upstream git repositories for fetch tests.
//!
//! Every helper shells out to the `git` CLI with commit signing disabled
//! unless a [`crate::gpg::GpgHome`] is passed explicitly.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::gpg::GpgHome;

/// Runs `git` in `dir`, panicking with stderr on failure. Returns stdout.
pub fn git(dir: &Path, args: &[&str]) -> String {
    git_with(dir, args, None)
}

fn git_with(dir: &Path, args: &[&str], gpg: Option<&GpgHome>) -> String {
    let mut command = Command::new("git");
    command
        .args(["-c", "protocol.file.allow=always"])
        .args(args)
        .current_dir(dir)
        .env("GIT_AUTHOR_DATE", "2024-01-01T00:00:00Z")
        .env("GIT_COMMITTER_DATE", "2024-01-01T00:00:00Z");
    if let Some(gpg) = gpg {
        command.env("GNUPGHOME", gpg.home());
    }
    let output = command
        .output()
        .unwrap_or_else(|e| panic!("failed to run `git {args:?}`: {e}"));
    if !output.status.success() {
        panic!(
            "`git {args:?}` failed in {}:\n{}",
            dir.display(),
            String::from_utf8_lossy(&output.stderr)
        );
    }
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// A repository acting as the remote a source points at.
#[derive(Debug)]
pub struct Upstream {
    path: PathBuf,
}

impl Upstream {
    /// Initialise an empty repository on branch `main` at `path`.
    ///
    /// # Panics
    /// Panics if any git operation fails.
    pub fn init(path: &Path) -> Self {
        fs::create_dir_all(path)
            .unwrap_or_else(|e| panic!("Upstream::init: failed to create {}: {e}", path.display()));
        git(path, &["init", "--initial-branch=main"]);
        git(path, &["config", "user.email", "test@test.com"]);
        git(path, &["config", "user.name", "Test User"]);
        git(path, &["config", "commit.gpgsign", "false"]);
        git(path, &["config", "tag.gpgsign", "false"]);
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// URL usable as a git source (a plain local path).
    pub fn url(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    /// Write `files` and commit them. Returns the new commit SHA.
    pub fn commit(&self, files: &[(&str, &str)], message: &str) -> String {
        self.write_and_add(files);
        git(&self.path, &["commit", "--allow-empty", "-m", message]);
        self.head()
    }

    /// Like [`commit`](Self::commit) but signed with `key` from `gpg`.
    pub fn signed_commit(&self, files: &[(&str, &str)], message: &str, gpg: &GpgHome, key: &str) -> String {
        self.write_and_add(files);
        let signing = format!("-S{key}");
        git_with(
            &self.path,
            &["commit", "--allow-empty", &signing, "-m", message],
            Some(gpg),
        );
        self.head()
    }

    /// Lightweight tag at HEAD.
    pub fn tag(&self, name: &str) {
        git(&self.path, &["tag", name]);
    }

    /// Unsigned annotated tag at HEAD.
    pub fn annotated_tag(&self, name: &str, message: &str) {
        git(&self.path, &["tag", "-a", name, "-m", message]);
    }

    /// Annotated tag at HEAD signed with `key` from `gpg`.
    pub fn signed_tag(&self, name: &str, message: &str, gpg: &GpgHome, key: &str) {
        git_with(
            &self.path,
            &["tag", "-u", key, "-s", name, "-m", message],
            Some(gpg),
        );
    }

    /// Register `other` as a submodule at `at` and commit.
    pub fn add_submodule(&self, other: &Upstream, at: &str) -> String {
        git(&self.path, &["submodule", "add", &other.url(), at]);
        git(&self.path, &["commit", "-m", &format!("Add submodule {at}")]);
        self.head()
    }

    pub fn checkout_new_branch(&self, name: &str) {
        git(&self.path, &["checkout", "-b", name]);
    }

    pub fn head(&self) -> String {
        git(&self.path, &["rev-parse", "HEAD"])
    }

    fn write_and_add(&self, files: &[(&str, &str)]) {
        for (name, content) in files {
            let target = self.path.join(name);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).unwrap_or_else(|e| {
                    panic!("Upstream: failed to create {}: {e}", parent.display())
                });
            }
            fs::write(&target, content)
                .unwrap_or_else(|e| panic!("Upstream: failed to write {name}: {e}"));
        }
        git(&self.path, &["add", "-A"]);
    }
}
