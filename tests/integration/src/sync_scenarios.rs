//! End-to-end sync scenarios across source kinds
//!
//! One manifest mixes git, inline, local directory and image contents over
//! two directories; the scenarios check placement, idempotence, locked
//! replay and partial failure.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use tempfile::TempDir;
use vendo_cache::CacheConfig;
use vendo_core::{ActionKind, SyncEngine, SyncOptions};
use vendo_meta::{LockConfig, LockedSource, Manifest};
use vendo_oci::layer::tar_layer;
use vendo_oci::{MemoryRegistry, Registry};
use vendo_test_utils::git::Upstream;

// =============================================================================
// Test Infrastructure
// =============================================================================

/// A root directory with a git upstream, a local source tree and a registry
struct Scenario {
    tmp: TempDir,
    upstream: Upstream,
    registry: Arc<MemoryRegistry>,
}

impl Scenario {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let upstream = Upstream::init(&tmp.path().join("upstream"));
        upstream.commit(
            &[("LICENSE", "MIT"), ("src/lib.rs", "pub fn v() -> u32 { 1 }"), ("docs/guide.md", "guide")],
            "Initial",
        );

        let root = tmp.path().join("work");
        fs::create_dir_all(root.join("local-src/nested")).unwrap();
        fs::write(root.join("local-src/nested/data.txt"), "local").unwrap();
        fs::write(root.join("unmanaged.txt"), "keep me").unwrap();

        let registry = Arc::new(MemoryRegistry::new());
        registry
            .push_image("localhost:5000/tool:stable", &[], &[tar_layer(&[("bin/tool", b"v1")]).unwrap()])
            .unwrap();

        Self { tmp, upstream, registry }
    }

    fn root(&self) -> std::path::PathBuf {
        self.tmp.path().join("work")
    }

    fn manifest(&self) -> Manifest {
        Manifest::from_yaml_str(&format!(
            r#"
apiVersion: v1
kind: ConfigMap
metadata:
  name: settings
data:
  app.conf: "mode=prod"
---
apiVersion: vendo.dev/v1alpha1
kind: Config
directories:
- path: vendor
  contents:
  - path: lib
    git:
      url: "{url}"
      ref: origin/main
    includePaths: ["src/**/*"]
  - path: notes
    inline:
      paths:
        README.md: hello
      pathsFrom:
      - configMapRef:
          name: settings
          directoryPath: conf
  - path: local
    directory:
      path: local-src
- path: images
  contents:
  - path: tool
    image:
      url: localhost:5000/tool:stable
"#,
            url = self.upstream.url()
        ))
        .unwrap()
    }

    fn options(&self, locked: bool) -> SyncOptions {
        let registry: Arc<dyn Registry> = self.registry.clone();
        SyncOptions {
            locked,
            registry: Some(registry),
            cache: Some(CacheConfig::new(self.tmp.path().join("cache"), 64 << 20)),
            ..SyncOptions::default()
        }
    }

    fn sync(&self, locked: bool) -> vendo_core::Result<vendo_core::SyncReport> {
        SyncEngine::new(self.root(), self.options(locked)).sync(&self.manifest())
    }

    fn lock(&self) -> LockConfig {
        LockConfig::load(&self.root().join("vendo.lock.yml")).unwrap()
    }

    fn read(&self, relative: &str) -> String {
        fs::read_to_string(self.root().join(relative)).unwrap()
    }
}

/// Every file under `dir` with its content, keyed by relative path
fn snapshot(dir: &Path) -> BTreeMap<String, Vec<u8>> {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .map(|e| e.unwrap())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let relative = e.path().strip_prefix(dir).unwrap().to_string_lossy().replace('\\', "/");
            (relative, fs::read(e.path()).unwrap())
        })
        .collect()
}

fn git_sha(lock: &LockConfig) -> String {
    match lock.find("vendor", "lib") {
        Some(LockedSource::Git(git)) => git.sha.clone(),
        other => panic!("unexpected lock entry: {other:?}"),
    }
}

fn image_url(lock: &LockConfig) -> String {
    match lock.find("images", "tool") {
        Some(LockedSource::Image(image)) => image.url.clone(),
        other => panic!("unexpected lock entry: {other:?}"),
    }
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn test_mixed_manifest_places_every_directory() {
    let scenario = Scenario::new();
    let report = scenario.sync(false).unwrap();

    // includePaths keeps legal files by default
    assert_eq!(scenario.read("vendor/lib/src/lib.rs"), "pub fn v() -> u32 { 1 }");
    assert_eq!(scenario.read("vendor/lib/LICENSE"), "MIT");
    assert!(!scenario.root().join("vendor/lib/docs").exists());

    assert_eq!(scenario.read("vendor/notes/README.md"), "hello");
    assert_eq!(scenario.read("vendor/notes/conf/app.conf"), "mode=prod");
    assert_eq!(scenario.read("vendor/local/nested/data.txt"), "local");
    assert_eq!(scenario.read("images/tool/bin/tool"), "v1");
    assert_eq!(scenario.read("unmanaged.txt"), "keep me");

    assert_eq!(report.of_kind(ActionKind::Place).count(), 2);
    assert!(report.has(ActionKind::Lock));

    let lock = scenario.lock();
    assert_eq!(git_sha(&lock), scenario.upstream.head());
    assert!(image_url(&lock).starts_with("localhost:5000/tool@sha256:"));
    let paths: Vec<_> = lock.directories[0].contents.iter().map(|c| c.path.as_str()).collect();
    assert_eq!(paths, ["lib", "notes", "local"]);
}

#[test]
fn test_resync_is_idempotent() {
    let scenario = Scenario::new();
    scenario.sync(false).unwrap();
    let tree = snapshot(&scenario.root().join("vendor"));
    let images = snapshot(&scenario.root().join("images"));
    let lock = fs::read_to_string(scenario.root().join("vendo.lock.yml")).unwrap();

    let report = scenario.sync(false).unwrap();

    assert_eq!(snapshot(&scenario.root().join("vendor")), tree);
    assert_eq!(snapshot(&scenario.root().join("images")), images);
    assert_eq!(fs::read_to_string(scenario.root().join("vendo.lock.yml")).unwrap(), lock);
    // The git snapshot and the image layer come from the cache the second time
    assert!(report.has(ActionKind::Unbundle));
}

#[test]
fn test_locked_replay_ignores_upstream_movement() {
    let scenario = Scenario::new();
    scenario.sync(false).unwrap();
    let first = scenario.lock();

    scenario.upstream.commit(&[("src/lib.rs", "pub fn v() -> u32 { 2 }")], "Bump");
    scenario
        .registry
        .push_image("localhost:5000/tool:stable", &[], &[tar_layer(&[("bin/tool", b"v2")]).unwrap()])
        .unwrap();

    scenario.sync(true).unwrap();
    let replayed = scenario.lock();
    assert_eq!(git_sha(&replayed), git_sha(&first));
    assert_eq!(image_url(&replayed), image_url(&first));
    assert_eq!(scenario.read("vendor/lib/src/lib.rs"), "pub fn v() -> u32 { 1 }");
    assert_eq!(scenario.read("images/tool/bin/tool"), "v1");

    scenario.sync(false).unwrap();
    let updated = scenario.lock();
    assert_eq!(git_sha(&updated), scenario.upstream.head());
    assert_ne!(image_url(&updated), image_url(&first));
    assert_eq!(scenario.read("vendor/lib/src/lib.rs"), "pub fn v() -> u32 { 2 }");
    assert_eq!(scenario.read("images/tool/bin/tool"), "v2");
}

#[test]
fn test_failure_in_later_directory_keeps_earlier_directories() {
    let scenario = Scenario::new();
    scenario.sync(false).unwrap();
    let lock = fs::read_to_string(scenario.root().join("vendo.lock.yml")).unwrap();

    // Update the first directory's source, then break the second directory
    fs::write(scenario.root().join("local-src/nested/data.txt"), "changed").unwrap();
    let missing = Arc::new(MemoryRegistry::new());
    let registry: Arc<dyn Registry> = missing;
    let options = SyncOptions {
        registry: Some(registry),
        ..SyncOptions::default()
    };

    let result = SyncEngine::new(scenario.root(), options).sync(&scenario.manifest());
    assert!(result.is_err());

    assert_eq!(scenario.read("vendor/local/nested/data.txt"), "changed");
    assert_eq!(scenario.read("images/tool/bin/tool"), "v1");
    assert_eq!(fs::read_to_string(scenario.root().join("vendo.lock.yml")).unwrap(), lock);
    assert!(!scenario.root().join(".vendo-tmp").exists());
}
